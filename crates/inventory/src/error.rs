use thiserror::Error;

/// Deterministic failures of stock arithmetic.
///
/// These carry no item identity; the ledger attaches it when surfacing them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StockError {
    /// Zero delta, non-positive quantity, or a magnitude outside the storable range.
    #[error("invalid quantity: {delta}")]
    InvalidQuantity { delta: i64 },

    /// Applying the change would drive the quantity below zero.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: u64, requested: u64 },

    /// Applying the change would exceed the storable quantity range.
    #[error("quantity overflow: current {current}, adding {added}")]
    Overflow { current: u64, added: u64 },
}
