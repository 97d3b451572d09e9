use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, ItemId, MovementId};

use crate::quantity::{Direction, StockChange};

/// A movement that has been validated but not yet committed.
///
/// It has neither an id nor a timestamp: both are assigned by the store when
/// the movement commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub item_id: ItemId,
    pub change: StockChange,
    pub reason: String,
}

impl NewMovement {
    pub fn new(item_id: ItemId, change: StockChange, reason: impl Into<String>) -> Self {
        Self {
            item_id,
            change,
            reason: reason.into(),
        }
    }

    /// Attach the store-assigned identity, producing the immutable record.
    pub fn committed(self, id: MovementId, occurred_at: DateTime<Utc>) -> Movement {
        Movement {
            id,
            item_id: self.item_id,
            change: self.change,
            reason: self.reason,
            occurred_at,
        }
    }
}

/// An immutable, committed record of one quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    id: MovementId,
    item_id: ItemId,
    #[serde(flatten)]
    change: StockChange,
    reason: String,
    occurred_at: DateTime<Utc>,
}

impl Movement {
    /// Rebuild a movement from its stored fields.
    pub fn from_stored(
        id: MovementId,
        item_id: ItemId,
        change: StockChange,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            item_id,
            change,
            reason: reason.unwrap_or_default(),
            occurred_at,
        }
    }

    pub fn movement_id(&self) -> MovementId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn change(&self) -> StockChange {
        self.change
    }

    pub fn direction(&self) -> Direction {
        self.change.direction()
    }

    pub fn quantity(&self) -> u64 {
        self.change.magnitude()
    }

    pub fn signed_delta(&self) -> i64 {
        self.change.signed_delta()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
