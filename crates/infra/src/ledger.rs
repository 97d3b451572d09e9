//! Stock ledger: the only write path for quantities and movements.
//!
//! ## Adjustment flow
//!
//! ```text
//! adjust(item, delta, reason)
//!   ↓
//! 1. Validate delta (pure)                      → InvalidQuantity
//!   ↓
//! 2. Resolve item via ItemDirectory             → ItemNotFound
//!   ↓
//! 3. StockStore::commit locks the item's snapshot (absent = 0 @ version 0)
//!   ↓
//! 4.   decide new quantity under that lock      → InsufficientStock
//!   ↓
//! 5.   write snapshot + movement, release lock
//!   ↓ Conflict (backend abort): back to 3 (bounded by RetryPolicy)
//! 6. Return the committed snapshot
//! ```
//!
//! Steps 3 to 5 are one critical section in the store, so concurrent
//! adjustments of the same item queue behind each other instead of racing.
//! Waiting for the lock never consumes a retry.

use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use stockledger_core::ItemId;
use stockledger_inventory::{Movement, NewMovement, Quantity, StockChange, StockError, StockSnapshot};

use crate::item_directory::ItemDirectory;
use crate::stock_store::{CommitOutcome, MovementPage, Pagination, StockStore, StoreError};

/// How often an adjustment is re-attempted after the backend aborts its
/// transaction (serialization failure, deadlock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Treated as at least 1.
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `backoff * n` before retrying.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(5);

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Fail on the first abort.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF)
    }
}

/// Kind of a [`LedgerError`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerErrorKind {
    ItemNotFound,
    InvalidQuantity,
    InsufficientStock,
    PersistenceFailure,
    Inconsistent,
}

/// Ledger operation error.
///
/// Every variant except `Persistence` is raised before anything is written.
/// `Persistence` is raised only after the commit was rolled back (or never
/// started), so no variant leaves a partial write behind.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("item {item_id} not found")]
    ItemNotFound { item_id: ItemId },

    #[error("invalid quantity {delta} for item {item_id}")]
    InvalidQuantity { item_id: ItemId, delta: i64 },

    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: ItemId,
        available: u64,
        requested: u64,
    },

    #[error("persistence failure for item {item_id}: {source}")]
    Persistence {
        item_id: ItemId,
        #[source]
        source: StoreError,
    },

    /// Stored state breaks a ledger invariant (negative quantity, a movement
    /// log that does not replay). Not caused by the caller's input.
    #[error("stock state of item {item_id} is inconsistent: {detail}")]
    Inconsistent { item_id: ItemId, detail: String },
}

impl LedgerError {
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            LedgerError::ItemNotFound { .. } => LedgerErrorKind::ItemNotFound,
            LedgerError::InvalidQuantity { .. } => LedgerErrorKind::InvalidQuantity,
            LedgerError::InsufficientStock { .. } => LedgerErrorKind::InsufficientStock,
            LedgerError::Persistence { .. } => LedgerErrorKind::PersistenceFailure,
            LedgerError::Inconsistent { .. } => LedgerErrorKind::Inconsistent,
        }
    }

    /// Whether re-running the same call (from a fresh read) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Persistence { source, .. } if source.is_transient())
    }

    pub fn item_id(&self) -> ItemId {
        match self {
            LedgerError::ItemNotFound { item_id }
            | LedgerError::InvalidQuantity { item_id, .. }
            | LedgerError::InsufficientStock { item_id, .. }
            | LedgerError::Persistence { item_id, .. }
            | LedgerError::Inconsistent { item_id, .. } => *item_id,
        }
    }

    fn from_stock(item_id: ItemId, err: StockError) -> Self {
        match err {
            StockError::InvalidQuantity { delta } => LedgerError::InvalidQuantity { item_id, delta },
            StockError::InsufficientStock {
                available,
                requested,
            } => LedgerError::InsufficientStock {
                item_id,
                available,
                requested,
            },
            // Only inbound changes overflow, and their magnitude fits `i64`.
            StockError::Overflow { added, .. } => LedgerError::InvalidQuantity {
                item_id,
                delta: i64::try_from(added).unwrap_or(i64::MAX),
            },
        }
    }

    fn from_store(item_id: ItemId, err: StoreError) -> Self {
        match err {
            StoreError::MissingItem(_) => LedgerError::ItemNotFound { item_id },
            StoreError::Corrupt(detail) => LedgerError::Inconsistent { item_id, detail },
            source => LedgerError::Persistence { item_id, source },
        }
    }
}

/// Snapshot vs. replayed movement log for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Materialized snapshot (empty if the item never moved).
    pub snapshot: StockSnapshot,
    /// Snapshot rebuilt by replaying the movement log oldest first.
    pub replayed: StockSnapshot,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.snapshot == self.replayed
    }
}

/// Lazy, restartable view of an item's movement history.
///
/// Nothing is read until `load`/`page` is called, and every call queries the
/// store again. It is not a live subscription.
#[derive(Debug)]
pub struct History<'a, S> {
    store: &'a S,
    item_id: ItemId,
}

impl<S> History<'_, S>
where
    S: StockStore,
{
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// All movements, newest first.
    pub async fn load(&self) -> Result<Vec<Movement>, LedgerError> {
        self.store
            .load_movements(self.item_id)
            .await
            .map_err(|e| LedgerError::from_store(self.item_id, e))
    }

    /// One page of movements, newest first.
    pub async fn page(&self, pagination: Pagination) -> Result<MovementPage, LedgerError> {
        self.store
            .query_movements(self.item_id, pagination)
            .await
            .map_err(|e| LedgerError::from_store(self.item_id, e))
    }
}

/// Stock ledger over a store and an item directory.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may be
/// called concurrently for the same item.
#[derive(Debug)]
pub struct StockLedger<S, D> {
    store: S,
    directory: D,
    retry: RetryPolicy,
}

impl<S, D> StockLedger<S, D> {
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn into_parts(self) -> (S, D) {
        (self.store, self.directory)
    }
}

impl<S, D> StockLedger<S, D>
where
    S: StockStore,
    D: ItemDirectory,
{
    /// Apply a signed delta (`> 0` in, `< 0` out) and record why.
    #[instrument(skip(self, reason), fields(item_id = %item_id), err)]
    pub async fn adjust(
        &self,
        item_id: ItemId,
        delta: i64,
        reason: impl Into<String>,
    ) -> Result<StockSnapshot, LedgerError> {
        let change = StockChange::from_delta(delta).map_err(|e| LedgerError::from_stock(item_id, e))?;
        self.commit_change(item_id, change, reason.into()).await
    }

    /// Receive `qty > 0` units.
    #[instrument(skip(self, reason), fields(item_id = %item_id), err)]
    pub async fn increase(
        &self,
        item_id: ItemId,
        qty: i64,
        reason: impl Into<String>,
    ) -> Result<StockSnapshot, LedgerError> {
        let change = StockChange::inbound(qty).map_err(|e| LedgerError::from_stock(item_id, e))?;
        self.commit_change(item_id, change, reason.into()).await
    }

    /// Issue `qty > 0` units.
    #[instrument(skip(self, reason), fields(item_id = %item_id), err)]
    pub async fn decrease(
        &self,
        item_id: ItemId,
        qty: i64,
        reason: impl Into<String>,
    ) -> Result<StockSnapshot, LedgerError> {
        let change = StockChange::outbound(qty).map_err(|e| LedgerError::from_stock(item_id, e))?;
        self.commit_change(item_id, change, reason.into()).await
    }

    /// Materialized quantity on hand; 0 if the item never moved.
    pub async fn current_quantity(&self, item_id: ItemId) -> Result<Quantity, LedgerError> {
        Ok(self
            .snapshot(item_id)
            .await?
            .map_or(Quantity::ZERO, |s| s.quantity()))
    }

    /// Materialized snapshot, `None` if the item never moved.
    pub async fn snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, LedgerError> {
        self.store.load_snapshot(item_id).await.map_err(|e| {
            if matches!(e, StoreError::Corrupt(_)) {
                tracing::warn!(%item_id, error = %e, "stored snapshot violates stock invariants");
            }
            LedgerError::from_store(item_id, e)
        })
    }

    /// Movement history of an item, newest first.
    pub fn history(&self, item_id: ItemId) -> History<'_, S> {
        History {
            store: &self.store,
            item_id,
        }
    }

    /// Shorthand for `history(item_id).page(pagination)`.
    pub async fn history_page(
        &self,
        item_id: ItemId,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        self.history(item_id).page(pagination).await
    }

    /// Compare the snapshot against a replay of the movement log.
    ///
    /// Both reads are unlocked, so an adjustment landing between them can
    /// produce a transient mismatch; re-run before acting on one.
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn reconcile(&self, item_id: ItemId) -> Result<Reconciliation, LedgerError> {
        let snapshot = self
            .snapshot(item_id)
            .await?
            .unwrap_or_else(|| StockSnapshot::empty(item_id));

        let mut movements = self.history(item_id).load().await?;
        movements.reverse();

        let replayed = StockSnapshot::replay(item_id, movements.iter().map(Movement::change))
            .map_err(|e| LedgerError::Inconsistent {
                item_id,
                detail: format!("movement log does not replay: {e}"),
            })?;

        let reconciliation = Reconciliation { snapshot, replayed };
        if !reconciliation.is_consistent() {
            tracing::warn!(
                %item_id,
                snapshot_quantity = snapshot.quantity().get(),
                replayed_quantity = replayed.quantity().get(),
                "snapshot diverges from movement log"
            );
        }
        Ok(reconciliation)
    }

    async fn ensure_item_exists(&self, item_id: ItemId) -> Result<(), LedgerError> {
        match self.directory.exists(item_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(LedgerError::ItemNotFound { item_id }),
            Err(e) => Err(LedgerError::from_store(item_id, e)),
        }
    }

    async fn commit_change(
        &self,
        item_id: ItemId,
        change: StockChange,
        reason: String,
    ) -> Result<StockSnapshot, LedgerError> {
        self.ensure_item_exists(item_id).await?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        let decide = |current: &StockSnapshot| current.decide(change);

        loop {
            let movement = NewMovement::new(item_id, change, reason.clone());
            match self.store.commit(movement, &decide).await {
                Ok(CommitOutcome::Committed(committed)) => {
                    tracing::info!(
                        %item_id,
                        movement_id = %committed.movement.movement_id(),
                        delta = change.signed_delta(),
                        quantity = committed.snapshot.quantity().get(),
                        attempt,
                        "stock adjusted"
                    );
                    return Ok(committed.snapshot);
                }
                Ok(CommitOutcome::Rejected(rejection)) => {
                    return Err(LedgerError::from_stock(item_id, rejection));
                }
                Err(StoreError::Conflict(msg)) if attempt < max_attempts => {
                    tracing::debug!(%item_id, attempt, conflict = %msg, "transaction aborted; retrying");
                    let delay = self.retry.delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    match &err {
                        StoreError::Conflict(_) => {
                            tracing::warn!(%item_id, attempts = attempt, "retry budget exhausted");
                        }
                        StoreError::Corrupt(_) => {
                            tracing::warn!(%item_id, error = %err, "stored snapshot violates stock invariants");
                        }
                        _ => {}
                    }
                    return Err(LedgerError::from_store(item_id, err));
                }
            }
        }
    }
}
