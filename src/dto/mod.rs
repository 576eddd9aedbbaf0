pub mod cart;
pub mod checkout;
pub mod normalize;
pub mod orders;
pub mod payment;
