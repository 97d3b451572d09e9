//! Durable storage for quantity snapshots and the movement log.
//!
//! The two are separate tables but are only ever written together, through
//! [`StockStore::commit`], which is the ledger's atomic unit of work.

pub mod in_memory;
mod movement_log;
pub mod postgres;
pub mod query;
mod snapshot_table;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use query::{MovementPage, Pagination};
pub use r#trait::{CommitOutcome, CommittedAdjustment, Decide, StockStore, StoreError};
