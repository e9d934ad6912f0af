//! Propagation contexts: where a change came from.
//!
//! Every insert, update or delete that enters the network is described by a
//! `PropagationContext`. Tuples keep the most recent context that touched
//! them as their lineage; no-loop compares the lineage's terminal origin to
//! the node about to fire, and lock-on-active compares contexts by identity
//! (`Arc::ptr_eq`), never by value.

use std::fmt;
use std::sync::Arc;

use rulenet_foundation::{FactId, Recency, TupleId};

/// Kind of change a context describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropagationType {
    /// A fact was inserted.
    Insertion,
    /// A fact was updated.
    Modification,
    /// A fact was deleted.
    Deletion,
    /// A rule was added to a running session and is being seeded.
    RuleAddition,
}

/// Identity of a terminal node: rule, package and consequence.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TerminalIdentity {
    /// Rule name.
    pub rule: Arc<str>,
    /// Package the rule belongs to.
    pub package: Arc<str>,
    /// Consequence name (`default` for the main consequence).
    pub consequence: Arc<str>,
}

impl TerminalIdentity {
    /// Creates a terminal identity.
    #[must_use]
    pub fn new(
        rule: impl Into<Arc<str>>,
        package: impl Into<Arc<str>>,
        consequence: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            rule: rule.into(),
            package: package.into(),
            consequence: consequence.into(),
        }
    }
}

impl fmt::Display for TerminalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}#{}", self.package, self.rule, self.consequence)
    }
}

/// Origin and type of one change.
#[derive(Clone, Debug)]
pub struct PropagationContext {
    /// Session-unique sequence number.
    pub number: u64,
    /// What kind of change this is.
    pub kind: PropagationType,
    /// Fact that changed, if any.
    pub fact: Option<FactId>,
    /// Recency of that fact as of this change.
    pub recency: Recency,
    /// Terminal node whose consequence made the change.
    pub origin: Option<TerminalIdentity>,
    /// Match whose consequence made the change.
    pub origin_tuple: Option<TupleId>,
}

impl PropagationContext {
    /// Creates a context with no terminal origin.
    #[must_use]
    pub fn new(number: u64, kind: PropagationType, fact: Option<FactId>, recency: Recency) -> Self {
        Self {
            number,
            kind,
            fact,
            recency,
            origin: None,
            origin_tuple: None,
        }
    }

    /// Records the terminal node and match that caused this change.
    #[must_use]
    pub fn with_origin(mut self, origin: TerminalIdentity, tuple: TupleId) -> Self {
        self.origin = Some(origin);
        self.origin_tuple = Some(tuple);
        self
    }

    /// Returns true if this change was caused by `node`'s own consequence.
    #[must_use]
    pub fn originates_from(&self, node: &TerminalIdentity) -> bool {
        self.origin.as_ref() == Some(node)
    }
}
