pub mod idempotency_keys;

pub use idempotency_keys::Entity as IdempotencyKeys;
