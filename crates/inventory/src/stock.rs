use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, AggregateRoot, ItemId};

use crate::error::StockError;
use crate::quantity::{Quantity, StockChange};

/// Materialized stock level for one item.
///
/// `version` counts the movements folded into `quantity`, so a snapshot at
/// version `n` equals the replay of the item's first `n` movements. An item
/// that never moved is the empty snapshot (quantity 0, version 0).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    item_id: ItemId,
    quantity: Quantity,
    version: u64,
}

impl StockSnapshot {
    /// The implicit snapshot of an item with no movements.
    pub fn empty(item_id: ItemId) -> Self {
        Self {
            item_id,
            quantity: Quantity::ZERO,
            version: 0,
        }
    }

    /// Rebuild a snapshot from stored fields.
    pub fn from_stored(item_id: ItemId, quantity: Quantity, version: u64) -> Self {
        Self {
            item_id,
            quantity,
            version,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Number of movements folded into this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.version == 0
    }

    /// Validate `change` and return the snapshot it would produce.
    ///
    /// Pure: `self` is left untouched, so a rejected change has no effect.
    pub fn decide(&self, change: StockChange) -> Result<StockSnapshot, StockError> {
        let command = AdjustStock {
            item_id: self.item_id,
            change,
        };
        let mut next = *self;
        for event in self.handle(&command)? {
            next.apply(&event);
        }
        Ok(next)
    }

    /// Fold committed changes (oldest first) into a snapshot.
    ///
    /// Every prefix is validated, so a history that dips below zero at any
    /// point is rejected even if it ends non-negative.
    pub fn replay(
        item_id: ItemId,
        changes: impl IntoIterator<Item = StockChange>,
    ) -> Result<StockSnapshot, StockError> {
        changes
            .into_iter()
            .try_fold(Self::empty(item_id), |snapshot, change| snapshot.decide(change))
    }
}

impl AggregateRoot for StockSnapshot {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.item_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: apply one change to an item's stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustStock {
    pub item_id: ItemId,
    pub change: StockChange,
}

impl Aggregate for StockSnapshot {
    type Command = AdjustStock;
    type Event = StockChange;
    type Error = StockError;

    fn apply(&mut self, event: &Self::Event) {
        // `handle` has already validated the change; saturate rather than panic
        // if a caller skips it.
        self.quantity = event.apply_to(self.quantity).unwrap_or_else(|err| match err {
            StockError::InsufficientStock { .. } => Quantity::ZERO,
            _ => Quantity::MAX,
        });
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        debug_assert_eq!(command.item_id, self.item_id, "command routed to wrong item");
        command.change.apply_to(self.quantity)?;
        Ok(vec![command.change])
    }
}
