//! Partial-match tuples.
//!
//! A tuple is one path through the network: an indexed chain of fact
//! handles, one per matched pattern position. The shared record holds the
//! structural links; the [`TupleKind`] payload holds what only some kinds
//! carry (activation metadata for terminal tuples).

use std::sync::Arc;

use rulenet_foundation::{AgendaGroupId, Error, FactId, Result, TupleId};

use crate::context::PropagationContext;
use crate::memory::MemoryId;
use crate::network::Owner;
use crate::staging::Stage;

/// Identity of the node a tuple is waiting to be processed by.
///
/// Assigned by whoever builds the node topology; opaque to this crate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

// =============================================================================
// Links
// =============================================================================

/// Membership in one sibling chain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SiblingLinks {
    /// Who owns the chain, `None` when detached.
    pub(crate) owner: Option<Owner>,
    pub(crate) prev: Option<TupleId>,
    pub(crate) next: Option<TupleId>,
}

/// Head and tail of a chain owned by a tuple or fact handle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ChainEnds {
    pub(crate) first: Option<TupleId>,
    pub(crate) last: Option<TupleId>,
}

/// Membership in a staging list.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StageLinks {
    pub(crate) stage: Option<Stage>,
    pub(crate) prev: Option<TupleId>,
    pub(crate) next: Option<TupleId>,
}

/// Membership in an indexed tuple memory bucket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct MemoryLink {
    pub(crate) memory: MemoryId,
    pub(crate) bucket: usize,
    pub(crate) hash: u64,
    pub(crate) prev: Option<TupleId>,
    pub(crate) next: Option<TupleId>,
}

// =============================================================================
// Activation
// =============================================================================

/// Rule-firing metadata carried by a terminal tuple.
#[derive(Clone, Debug, Default)]
pub struct Activation {
    /// Resolved firing priority.
    pub salience: i32,
    /// Global sequence number assigned when queued; breaks salience ties.
    pub activation_number: u64,
    /// Whether the activation currently sits in an agenda group.
    pub queued: bool,
    /// Whether the activation's consequence is executing right now.
    pub active: bool,
    /// False once the underlying match has been deleted.
    pub match_valid: bool,
    /// Agenda group the rule schedules into.
    pub agenda_group: AgendaGroupId,
    /// Facts bound by the match, in pattern order.
    pub facts: Vec<FactId>,
    /// Meta-rule matches currently blocking this one.
    pub blockers: Vec<TupleId>,
    /// Scheduling is pending but held back by blockers.
    pub held: bool,
    /// Matches this one blocks (when acting as a meta-rule match).
    pub blocked: Vec<TupleId>,
    /// Fact under which the match was materialised for the declarative agenda.
    pub fact: Option<FactId>,
}

impl Activation {
    /// Creates activation metadata for a fresh match in `agenda_group`.
    #[must_use]
    pub fn new(agenda_group: AgendaGroupId) -> Self {
        Self {
            agenda_group,
            match_valid: true,
            ..Self::default()
        }
    }
}

// =============================================================================
// Tuple Kind
// =============================================================================

/// Kind-specific tuple payload.
#[derive(Clone, Debug)]
pub enum TupleKind {
    /// Partial match flowing into a join's left input.
    Left,
    /// Fact flowing into a join's right input.
    Right,
    /// Complete match at a rule terminal node.
    Terminal(Box<Activation>),
    /// Complete match at a query sink; never scheduled.
    Query,
}

impl TupleKind {
    /// Human-readable kind name, used in fault messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Left => "left tuple",
            Self::Right => "right tuple",
            Self::Terminal(_) => "terminal tuple",
            Self::Query => "query tuple",
        }
    }
}

// =============================================================================
// Tuple
// =============================================================================

/// A partial match record.
#[derive(Clone, Debug)]
pub struct Tuple {
    /// Position in the pattern chain, `0..N-1`.
    pub(crate) index: usize,
    /// Fact handle matched at this position.
    pub(crate) fact: FactId,
    /// Previous-pattern tuple, `None` for roots.
    pub(crate) parent: Option<TupleId>,
    /// Node this tuple feeds.
    pub(crate) sink: NodeId,
    pub(crate) left: SiblingLinks,
    pub(crate) right: SiblingLinks,
    /// Children created through this tuple's left input.
    pub(crate) children: ChainEnds,
    /// Children created through this tuple's right input.
    pub(crate) right_children: ChainEnds,
    pub(crate) staging: StageLinks,
    pub(crate) memory: Option<MemoryLink>,
    /// Most recent propagation context that touched this tuple.
    pub(crate) context: Option<Arc<PropagationContext>>,
    pub(crate) kind: TupleKind,
}

impl Tuple {
    /// Creates a root tuple (no parent) for `fact`.
    #[must_use]
    pub fn root(fact: FactId, sink: NodeId, kind: TupleKind) -> Self {
        Self {
            index: 0,
            fact,
            parent: None,
            sink,
            left: SiblingLinks::default(),
            right: SiblingLinks::default(),
            children: ChainEnds::default(),
            right_children: ChainEnds::default(),
            staging: StageLinks::default(),
            memory: None,
            context: None,
            kind,
        }
    }

    /// Creates a tuple extending `parent` (at `parent_index`) with `fact`.
    #[must_use]
    pub fn child(
        parent: TupleId,
        parent_index: usize,
        fact: FactId,
        sink: NodeId,
        kind: TupleKind,
    ) -> Self {
        Self {
            index: parent_index + 1,
            parent: Some(parent),
            ..Self::root(fact, sink, kind)
        }
    }

    /// Sets the propagation context (builder style).
    #[must_use]
    pub fn with_context(mut self, context: Option<Arc<PropagationContext>>) -> Self {
        self.context = context;
        self
    }

    /// Position in the pattern chain.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of facts in the chain ending at this tuple.
    #[must_use]
    pub fn size(&self) -> usize {
        self.index + 1
    }

    /// Fact handle matched at this position.
    #[must_use]
    pub fn fact(&self) -> FactId {
        self.fact
    }

    /// Previous-pattern tuple.
    #[must_use]
    pub fn parent(&self) -> Option<TupleId> {
        self.parent
    }

    /// Node this tuple feeds.
    #[must_use]
    pub fn sink(&self) -> NodeId {
        self.sink
    }

    /// Structural owner in the left chain, if linked.
    #[must_use]
    pub fn left_owner(&self) -> Option<Owner> {
        self.left.owner
    }

    /// Structural owner in the right chain, if linked.
    #[must_use]
    pub fn right_owner(&self) -> Option<Owner> {
        self.right.owner
    }

    /// Left-input parent tuple.
    #[must_use]
    pub fn left_parent(&self) -> Option<TupleId> {
        match self.left.owner {
            Some(Owner::Tuple(id)) => Some(id),
            _ => None,
        }
    }

    /// Right-input parent tuple.
    #[must_use]
    pub fn right_parent(&self) -> Option<TupleId> {
        match self.right.owner {
            Some(Owner::Tuple(id)) => Some(id),
            _ => None,
        }
    }

    /// First child created through the left input.
    #[must_use]
    pub fn first_child(&self) -> Option<TupleId> {
        self.children.first
    }

    /// Last child created through the left input.
    #[must_use]
    pub fn last_child(&self) -> Option<TupleId> {
        self.children.last
    }

    /// Staging list the tuple currently sits in.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        self.staging.stage
    }

    /// Memory the tuple is currently indexed in.
    #[must_use]
    pub fn memory(&self) -> Option<MemoryId> {
        self.memory.map(|link| link.memory)
    }

    /// Join-key hash the tuple was indexed under.
    #[must_use]
    pub fn memory_hash(&self) -> Option<u64> {
        self.memory.map(|link| link.hash)
    }

    /// Propagation context lineage.
    #[must_use]
    pub fn context(&self) -> Option<&Arc<PropagationContext>> {
        self.context.as_ref()
    }

    /// Replaces the propagation context lineage.
    pub fn set_context(&mut self, context: Option<Arc<PropagationContext>>) {
        self.context = context;
    }

    /// Kind payload.
    #[must_use]
    pub fn kind(&self) -> &TupleKind {
        &self.kind
    }

    /// Returns true for terminal (activation) tuples.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, TupleKind::Terminal(_))
    }

    /// Activation metadata.
    ///
    /// # Errors
    /// Returns `Unsupported` for tuple kinds that never carry an activation.
    pub fn activation(&self) -> Result<&Activation> {
        match &self.kind {
            TupleKind::Terminal(activation) => Ok(activation),
            other => Err(Error::unsupported("activation", other.name())),
        }
    }

    /// Mutable activation metadata.
    ///
    /// # Errors
    /// Returns `Unsupported` for tuple kinds that never carry an activation.
    pub fn activation_mut(&mut self) -> Result<&mut Activation> {
        match &mut self.kind {
            TupleKind::Terminal(activation) => Ok(activation),
            other => Err(Error::unsupported("activation", other.name())),
        }
    }

    /// Declarative-agenda blockers of this match.
    ///
    /// # Errors
    /// Returns `Unsupported` for tuple kinds that never support blocking.
    pub fn blockers(&self) -> Result<&[TupleId]> {
        match &self.kind {
            TupleKind::Terminal(activation) => Ok(&activation.blockers),
            other => Err(Error::unsupported("blockers", other.name())),
        }
    }
}
