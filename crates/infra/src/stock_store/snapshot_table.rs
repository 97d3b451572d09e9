use std::collections::HashMap;

use stockledger_core::ItemId;
use stockledger_inventory::StockSnapshot;

/// In-memory key/value table of current snapshots.
///
/// Does not validate quantities; the ledger decides before it writes.
#[derive(Debug, Default)]
pub(crate) struct SnapshotTable {
    rows: HashMap<ItemId, StockSnapshot>,
}

impl SnapshotTable {
    pub(crate) fn get(&self, item_id: ItemId) -> Option<StockSnapshot> {
        self.rows.get(&item_id).copied()
    }

    /// Insert if absent, otherwise overwrite.
    pub(crate) fn upsert(&mut self, snapshot: StockSnapshot) {
        self.rows.insert(snapshot.item_id(), snapshot);
    }
}
