//! Quantities and signed stock changes.
//!
//! A change is a tagged value (direction + strictly positive magnitude) consumed
//! by a single arithmetic function, `StockChange::apply_to`.

use core::num::NonZeroU64;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ValueObject};

use crate::error::StockError;

/// Quantity on hand. Never negative by construction.
///
/// Bounded by `i64::MAX` so every quantity (and every signed delta) fits a
/// 64-bit signed database column.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);
    pub const MAX: Quantity = Quantity(i64::MAX as u64);

    /// Returns `None` when `value` exceeds [`Quantity::MAX`].
    pub fn new(value: u64) -> Option<Self> {
        (value <= Self::MAX.0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn as_i64(self) -> i64 {
        // Lossless: bounded by `Quantity::MAX`.
        self.0 as i64
    }
}

impl ValueObject for Quantity {}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    /// Decode a stored quantity. A negative value means the store was written
    /// outside the ledger and is reported as an invariant violation.
    fn try_from(value: i64) -> DomainResult<Self> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| DomainError::invariant(format!("stored quantity is negative: {value}")))
    }
}

/// Direction of a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(DomainError::validation(format!("unknown movement direction '{other}'"))),
        }
    }
}

/// A signed change to an item's quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockChange {
    direction: Direction,
    #[serde(rename = "quantity")]
    magnitude: NonZeroU64,
}

impl ValueObject for StockChange {}

impl StockChange {
    /// Build a change from a signed delta (`> 0` is inbound, `< 0` outbound).
    pub fn from_delta(delta: i64) -> Result<Self, StockError> {
        if delta >= 0 {
            Self::inbound(delta)
        } else {
            // `i64::MIN` has no positive counterpart.
            let qty = delta.checked_neg().ok_or(StockError::InvalidQuantity { delta })?;
            Self::new(Direction::Out, qty).map_err(|_| StockError::InvalidQuantity { delta })
        }
    }

    /// Inbound change of `qty` units. `qty` must be strictly positive.
    pub fn inbound(qty: i64) -> Result<Self, StockError> {
        Self::new(Direction::In, qty)
    }

    /// Outbound change of `qty` units. `qty` must be strictly positive.
    pub fn outbound(qty: i64) -> Result<Self, StockError> {
        Self::new(Direction::Out, qty)
    }

    /// Build a change from an explicit direction and magnitude.
    pub fn new(direction: Direction, qty: i64) -> Result<Self, StockError> {
        let magnitude = u64::try_from(qty)
            .ok()
            .and_then(NonZeroU64::new)
            .ok_or(StockError::InvalidQuantity { delta: qty })?;
        Ok(Self { direction, magnitude })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn magnitude(&self) -> u64 {
        self.magnitude.get()
    }

    /// Signed form of the change (`+qty` for `In`, `-qty` for `Out`).
    pub fn signed_delta(&self) -> i64 {
        // Lossless: constructors only accept positive `i64` magnitudes.
        let m = self.magnitude.get() as i64;
        match self.direction {
            Direction::In => m,
            Direction::Out => -m,
        }
    }

    /// Apply this change to `current`, enforcing `0 <= result <= Quantity::MAX`.
    pub fn apply_to(&self, current: Quantity) -> Result<Quantity, StockError> {
        let m = self.magnitude.get();
        match self.direction {
            Direction::In => current
                .0
                .checked_add(m)
                .and_then(Quantity::new)
                .ok_or(StockError::Overflow {
                    current: current.0,
                    added: m,
                }),
            Direction::Out => current
                .0
                .checked_sub(m)
                .map(Quantity)
                .ok_or(StockError::InsufficientStock {
                    available: current.0,
                    requested: m,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(v: u64) -> Quantity {
        Quantity::new(v).unwrap()
    }

    #[test]
    fn zero_delta_is_invalid() {
        assert_eq!(
            StockChange::from_delta(0),
            Err(StockError::InvalidQuantity { delta: 0 })
        );
    }

    #[test]
    fn non_positive_quantities_are_invalid() {
        assert!(StockChange::inbound(0).is_err());
        assert!(StockChange::outbound(-3).is_err());
        assert_eq!(
            StockChange::outbound(-3),
            Err(StockError::InvalidQuantity { delta: -3 })
        );
    }

    #[test]
    fn sign_selects_direction() {
        let inbound = StockChange::from_delta(7).unwrap();
        assert_eq!(inbound.direction(), Direction::In);
        assert_eq!(inbound.magnitude(), 7);
        assert_eq!(inbound.signed_delta(), 7);

        let outbound = StockChange::from_delta(-4).unwrap();
        assert_eq!(outbound.direction(), Direction::Out);
        assert_eq!(outbound.magnitude(), 4);
        assert_eq!(outbound.signed_delta(), -4);
    }

    #[test]
    fn i64_min_is_rejected() {
        assert_eq!(
            StockChange::from_delta(i64::MIN),
            Err(StockError::InvalidQuantity { delta: i64::MIN })
        );
    }

    #[test]
    fn outbound_beyond_available_is_insufficient() {
        let change = StockChange::outbound(10).unwrap();
        assert_eq!(
            change.apply_to(qty(6)),
            Err(StockError::InsufficientStock {
                available: 6,
                requested: 10
            })
        );
        assert_eq!(change.apply_to(qty(10)), Ok(Quantity::ZERO));
    }

    #[test]
    fn inbound_past_max_overflows() {
        let change = StockChange::inbound(2).unwrap();
        assert!(matches!(
            change.apply_to(Quantity::MAX),
            Err(StockError::Overflow { .. })
        ));
    }

    #[test]
    fn negative_stored_quantity_is_an_invariant_violation() {
        let err = Quantity::try_from(-1i64).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(Quantity::try_from(12i64).unwrap(), qty(12));
    }

    #[test]
    fn direction_parses_stored_labels() {
        assert_eq!("IN".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Out);
        assert!("SIDEWAYS".parse::<Direction>().is_err());
    }

    #[test]
    fn change_serializes_with_explicit_direction() {
        let change = StockChange::outbound(3).unwrap();
        let json = serde_json::to_value(change).unwrap();
        assert_eq!(json, serde_json::json!({ "direction": "OUT", "quantity": 3 }));
    }
}
