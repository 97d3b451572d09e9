use std::collections::HashMap;

use chrono::{DateTime, Utc};

use stockledger_core::{ItemId, MovementId};
use stockledger_inventory::{Movement, NewMovement};

/// Append-only in-memory movement log.
///
/// Exposes no update or delete: once appended, a movement is only ever read.
#[derive(Debug, Default)]
pub(crate) struct MovementLog {
    by_item: HashMap<ItemId, Vec<Movement>>,
    last_id: u64,
}

impl MovementLog {
    /// Append a movement, assigning the next id.
    pub(crate) fn append(&mut self, movement: NewMovement, occurred_at: DateTime<Utc>) -> Movement {
        self.last_id += 1;
        let committed = movement.committed(MovementId::new(self.last_id), occurred_at);
        self.by_item
            .entry(committed.item_id())
            .or_default()
            .push(committed.clone());
        committed
    }

    /// Movements for an item, newest first.
    pub(crate) fn newest_first(&self, item_id: ItemId) -> impl Iterator<Item = &Movement> {
        self.by_item
            .get(&item_id)
            .map(|v| v.as_slice())
            .unwrap_or_default()
            .iter()
            .rev()
    }

    pub(crate) fn count(&self, item_id: ItemId) -> usize {
        self.by_item.get(&item_id).map_or(0, Vec::len)
    }
}
