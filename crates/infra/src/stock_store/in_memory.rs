use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use stockledger_core::ItemId;
use stockledger_inventory::{Movement, NewMovement, StockSnapshot};

use super::movement_log::MovementLog;
use super::query::{MovementPage, Pagination};
use super::r#trait::{CommitOutcome, CommittedAdjustment, Decide, StockStore, StoreError};
use super::snapshot_table::SnapshotTable;

#[derive(Debug, Default)]
struct State {
    snapshots: SnapshotTable,
    log: MovementLog,
}

/// In-memory stock store.
///
/// Snapshot table and movement log live behind one lock; a commit holds the
/// write guard from reading the current snapshot through both writes, which
/// makes decide-and-write atomic and linearizable.
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn load_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.snapshots.get(item_id))
    }

    async fn commit(
        &self,
        movement: NewMovement,
        decide: &Decide<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let item_id = movement.item_id;
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let current = state
            .snapshots
            .get(item_id)
            .unwrap_or_else(|| StockSnapshot::empty(item_id));
        let snapshot = match decide(&current) {
            Ok(next) => next,
            Err(rejection) => return Ok(CommitOutcome::Rejected(rejection)),
        };

        // Nothing below can fail, so both writes land or neither does.
        let movement = state.log.append(movement, Utc::now());
        state.snapshots.upsert(snapshot);

        Ok(CommitOutcome::Committed(CommittedAdjustment { snapshot, movement }))
    }

    async fn load_movements(&self, item_id: ItemId) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.log.newest_first(item_id).cloned().collect())
    }

    async fn query_movements(
        &self,
        item_id: ItemId,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let total = state.log.count(item_id) as u64;
        let movements = state
            .log
            .newest_first(item_id)
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();
        Ok(MovementPage::new(movements, total, pagination))
    }
}
