//! Inventory stock rules.
//!
//! This crate contains the arithmetic and invariants of the stock ledger,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod error;
pub mod movement;
pub mod quantity;
pub mod stock;

pub use error::StockError;
pub use movement::{Movement, NewMovement};
pub use quantity::{Direction, Quantity, StockChange};
pub use stock::{AdjustStock, StockSnapshot};
