//! Generational identifiers for facts and tuples.
//!
//! Both fact handles and tuples live in slot arenas that reuse indices after
//! removal. The generation counter increments on every reuse, so a stale id
//! is always rejected rather than silently dereferenced.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monotonic fact recency counter.
///
/// `-1` is reserved as the "never" sentinel by agenda bookkeeping.
pub type Recency = i64;

/// Identity of an inserted fact.
///
/// # Layout
/// - `index`: slot index into the fact store
/// - `generation`: generation counter for stale reference detection
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactId {
    /// Index into fact storage.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl FactId {
    /// Creates a new fact ID with the given index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact({})", self.index)
    }
}

/// Identity of a tuple in the tuple arena.
///
/// Every structural link between tuples (parent, siblings, staging,
/// memory buckets) is stored as a `TupleId`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TupleId {
    /// Index into the tuple arena.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl TupleId {
    /// Creates a new tuple ID with the given index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TupleId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple({})", self.index)
    }
}

/// Index of an agenda group within a session's agenda.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AgendaGroupId(pub u32);

impl AgendaGroupId {
    /// The `MAIN` group, always at the bottom of the focus stack.
    pub const MAIN: AgendaGroupId = AgendaGroupId(0);
}
