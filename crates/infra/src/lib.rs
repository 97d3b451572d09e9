//! Infrastructure layer: stock stores, item directory, ledger, config.

pub mod config;
pub mod db;
pub mod item_directory;
pub mod ledger;
pub mod stock_store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, LedgerConfig, PoolConfig};
pub use item_directory::{InMemoryItemDirectory, ItemDirectory, PostgresItemDirectory};
pub use ledger::{
    History, LedgerError, LedgerErrorKind, Reconciliation, RetryPolicy, StockLedger,
};
pub use stock_store::{
    CommitOutcome, CommittedAdjustment, Decide, InMemoryStockStore, MovementPage, Pagination,
    PostgresStockStore, StockStore, StoreError,
};
