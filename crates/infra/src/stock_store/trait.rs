use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::ItemId;
use stockledger_inventory::{Movement, NewMovement, StockError, StockSnapshot};

use super::query::{MovementPage, Pagination};

/// Validation run by the store against the item's current snapshot while the
/// item is locked for writing. Returns the snapshot to persist, or the
/// business rejection.
///
/// An item without a stored snapshot is passed as [`StockSnapshot::empty`].
pub type Decide<'a> =
    dyn Fn(&StockSnapshot) -> Result<StockSnapshot, StockError> + Send + Sync + 'a;

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedAdjustment {
    pub snapshot: StockSnapshot,
    pub movement: Movement,
}

/// What a commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Snapshot and movement were written together.
    Committed(CommittedAdjustment),
    /// `decide` rejected the change; nothing was written.
    Rejected(StockError),
}

/// Storage operation error.
///
/// These are **infrastructure errors**; business rejections travel as
/// [`CommitOutcome::Rejected`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend aborted the transaction (serialization failure, deadlock).
    /// Retry the whole commit.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The store could not be reached (pool exhausted or closed, IO error).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The referenced item no longer exists in the item master data.
    #[error("item missing: {0}")]
    MissingItem(String),

    /// Stored data violates a ledger invariant (e.g. negative quantity).
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether re-running the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

/// Snapshot store + movement log, composed for the ledger.
///
/// Only the ledger writes through this trait. Implementations must:
/// - make `commit` all-or-nothing
/// - hold the item's write lock from reading the current snapshot until the
///   writes land, so no other commit for that item runs between `decide`
///   and the write
/// - assign movement ids and timestamps at commit, increasing in commit order
/// - never update or delete a committed movement
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Current snapshot, `None` if the item never moved.
    async fn load_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError>;

    /// Lock the item, run `decide` on its current snapshot and, if accepted,
    /// persist the decided snapshot and append `movement` atomically.
    async fn commit(
        &self,
        movement: NewMovement,
        decide: &Decide<'_>,
    ) -> Result<CommitOutcome, StoreError>;

    /// All movements for an item, newest first.
    async fn load_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError>;

    /// One page of an item's movements, newest first.
    async fn query_movements(
        &self,
        item_id: ItemId,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn load_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        (**self).load_snapshot(item_id).await
    }

    async fn commit(
        &self,
        movement: NewMovement,
        decide: &Decide<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit(movement, decide).await
    }

    async fn load_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        (**self).load_movements(item_id).await
    }

    async fn query_movements(
        &self,
        item_id: ItemId,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query_movements(item_id, pagination).await
    }
}
