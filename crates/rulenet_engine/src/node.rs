//! Per-rule network segments: join nodes and the terminal executor.
//!
//! A rule with patterns `p0..pN-1` compiles to `N-1` join nodes followed by
//! a terminal node. Join `j` pairs left tuples of index `j` with right
//! tuples of pattern `j+1` and emits children of index `j+1`; the last
//! join (or, for single-pattern rules, the root tuples themselves) feeds
//! the terminal node.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use rulenet_foundation::{Error, Result, TupleId, Value};
use rulenet_network::{Activation, MemoryId, NodeId, StagedTuples, TupleKind, TupleMemory};

use crate::executor::RuleExecutor;
use crate::rule::CompiledRule;

/// Bucket hash of a join key.
///
/// Uses a fixed-key hasher so the same key lands in the same bucket in
/// every session.
#[must_use]
pub fn key_hash(key: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// What a [`NodeId`] refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeSlot {
    /// Join `join` of rule `rule`.
    Join {
        /// Index of the rule in the session.
        rule: usize,
        /// Index of the join within the rule.
        join: usize,
    },
    /// Terminal node of rule `rule`.
    Terminal {
        /// Index of the rule in the session.
        rule: usize,
    },
}

impl NodeSlot {
    /// Rule the node belongs to.
    #[must_use]
    pub fn rule(self) -> usize {
        match self {
            Self::Join { rule, .. } | Self::Terminal { rule } => rule,
        }
    }
}

// =============================================================================
// Join Node
// =============================================================================

/// Two-input node with indexed left and right memories.
#[derive(Clone, Debug)]
pub struct JoinNode {
    id: NodeId,
    pub(crate) left_memory: TupleMemory,
    pub(crate) right_memory: TupleMemory,
    pub(crate) left_staged: StagedTuples,
    pub(crate) right_staged: StagedTuples,
    /// Join key of every left tuple in `left_memory`.
    pub(crate) left_keys: HashMap<TupleId, Value>,
    /// Join key of every right tuple in `right_memory`.
    pub(crate) right_keys: HashMap<TupleId, Value>,
}

impl JoinNode {
    /// Creates a join node whose memories start with `capacity` buckets.
    #[must_use]
    pub fn new(id: NodeId, capacity: usize) -> Self {
        Self {
            id,
            left_memory: TupleMemory::with_capacity(MemoryId(id.0 * 2), capacity),
            right_memory: TupleMemory::with_capacity(MemoryId(id.0 * 2 + 1), capacity),
            left_staged: StagedTuples::new(),
            right_staged: StagedTuples::new(),
            left_keys: HashMap::new(),
            right_keys: HashMap::new(),
        }
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Partial matches waiting on the right input.
    #[must_use]
    pub fn left_memory(&self) -> &TupleMemory {
        &self.left_memory
    }

    /// Facts waiting on the left input.
    #[must_use]
    pub fn right_memory(&self) -> &TupleMemory {
        &self.right_memory
    }

    /// Returns true if either input has staged work.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        !self.left_staged.is_empty() || !self.right_staged.is_empty()
    }
}

// =============================================================================
// Rule Node
// =============================================================================

/// The network segment of one rule within a session.
#[derive(Clone, Debug)]
pub struct RuleNode {
    rule: Arc<CompiledRule>,
    pub(crate) joins: Vec<JoinNode>,
    pub(crate) executor: RuleExecutor,
}

impl RuleNode {
    /// Assembles a segment from its nodes.
    ///
    /// # Errors
    /// Returns `Build` if the number of joins does not match the rule.
    pub fn new(
        rule: Arc<CompiledRule>,
        joins: Vec<JoinNode>,
        executor: RuleExecutor,
    ) -> Result<Self> {
        if joins.len() + 1 != rule.arity() {
            return Err(Error::build(format!(
                "rule {} needs {} joins, got {}",
                rule.identity(),
                rule.arity().saturating_sub(1),
                joins.len()
            )));
        }
        Ok(Self {
            rule,
            joins,
            executor,
        })
    }

    /// The compiled rule.
    #[must_use]
    pub fn rule(&self) -> &Arc<CompiledRule> {
        &self.rule
    }

    /// Join nodes in chain order.
    #[must_use]
    pub fn joins(&self) -> &[JoinNode] {
        &self.joins
    }

    /// The terminal executor.
    #[must_use]
    pub fn executor(&self) -> &RuleExecutor {
        &self.executor
    }

    /// Node fed by left tuples of `index`.
    #[must_use]
    pub fn left_sink(&self, index: usize) -> NodeId {
        self.joins
            .get(index)
            .map_or(self.executor.node(), JoinNode::id)
    }

    /// Node whose right input receives facts matching pattern `position`.
    ///
    /// `position` must be at least one.
    #[must_use]
    pub fn right_sink(&self, position: usize) -> Option<NodeId> {
        position
            .checked_sub(1)
            .and_then(|join| self.joins.get(join))
            .map(JoinNode::id)
    }

    /// Staging lists for left tuples of `index`.
    pub(crate) fn left_input(&mut self, index: usize) -> &mut StagedTuples {
        match self.joins.get_mut(index) {
            Some(join) => &mut join.left_staged,
            None => self.executor.staged_mut(),
        }
    }

    /// Staging lists for right tuples of pattern `position`.
    pub(crate) fn right_input(&mut self, position: usize) -> Option<&mut StagedTuples> {
        let join = position.checked_sub(1)?;
        self.joins.get_mut(join).map(|join| &mut join.right_staged)
    }

    /// Payload for a new left tuple of `index`.
    pub(crate) fn left_kind(&self, index: usize) -> TupleKind {
        if index + 1 >= self.rule.arity() {
            TupleKind::Terminal(Box::new(Activation::new(self.executor.agenda_group())))
        } else {
            TupleKind::Left
        }
    }

    /// Returns true if any node of this rule has staged work.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        self.joins.iter().any(JoinNode::has_staged) || !self.executor.staged().is_empty()
    }
}
