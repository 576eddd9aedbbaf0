//! Idempotency records keyed by `(scope, key)`.
//!
//! A record is either in flight (claimed, no response yet) or completed (response stored).
//! An in-flight claim holds a short lease; completing it extends the record to the full TTL.
//! Records past their expiry are treated as absent, so an abandoned claim frees its key once
//! the lease runs out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryIdempotencyStore;
pub use postgres::PgIdempotencyStore;

pub const STATE_IN_FLIGHT: &str = "in_flight";
pub const STATE_COMPLETED: &str = "completed";

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// The caller now owns the key and must `complete` or `release` it.
    Started,
    /// Another request with the same fingerprint holds the key.
    InFlight,
    /// A request with the same fingerprint already finished; replay its response.
    Completed(Value),
    /// The key was used for a different request.
    Mismatch,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claims `(scope, key)` for `lease` or reports why it cannot.
    async fn begin(
        &self,
        scope: &str,
        key: &str,
        fingerprint: &str,
        lease: Duration,
    ) -> AppResult<BeginOutcome>;

    /// Stores the response and keeps the record for `ttl` from now.
    async fn complete(
        &self,
        scope: &str,
        key: &str,
        response: &Value,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Drops an in-flight claim. Completed records are left alone.
    async fn release(&self, scope: &str, key: &str) -> AppResult<()>;

    /// Stored response of a live completed record.
    async fn lookup(&self, scope: &str, key: &str) -> AppResult<Option<Value>>;

    /// Writes a completed record, replacing whatever was there.
    async fn record(&self, scope: &str, key: &str, response: &Value, ttl: Duration)
    -> AppResult<()>;
}

/// SHA-256 hex over the JSON encoding of `value`.
pub fn fingerprint<T: Serialize>(value: &T) -> AppResult<String> {
    let bytes = serde_json::to_vec(value).map_err(anyhow::Error::from)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
