//! Entity trait: identity that survives state changes.
//!
//! A stock movement is an entity: two movements with the same quantity and
//! reason are still different events if their ids differ.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
