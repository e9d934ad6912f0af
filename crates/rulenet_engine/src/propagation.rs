//! Node propagation: fact staging, join evaluation, and the flush loop.
//!
//! Fact changes never touch memories directly. They create, restage, or
//! unlink the root and right tuples hanging off the fact handle; a flush
//! then drains every node in topological order. Join nodes drain right
//! deletes, left deletes, right updates, left updates, right inserts, and
//! left inserts, in that order, so each (left, right) pair yields at most
//! one child per cycle.
//!
//! User closures are evaluated before anything is mutated. When one fails,
//! the tuple being processed goes back onto its staging list and the error
//! is returned, leaving the network consistent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rulenet_foundation::{Error, FactId, Recency, Result, TupleId, Value};
use rulenet_network::{
    Chain, FactStore, Owner, PropagationContext, PropagationType, Stage, StageOutcome,
    StagedTuples, TerminalIdentity, Tuple, TupleKind, TupleNetwork,
};
use tracing::trace;

use crate::node::{NodeSlot, RuleNode, key_hash};
use crate::rule::Pattern;
use crate::session::{Session, rule_error};

/// Values of `ids`, in order.
pub(crate) fn values<'a>(facts: &'a FactStore, ids: &[FactId]) -> Result<Vec<&'a Value>> {
    ids.iter().map(|id| facts.value(*id)).collect()
}

/// Which patterns of one rule a value satisfies.
fn alpha(node: &RuleNode, value: &Value) -> Result<Vec<bool>> {
    node.rule()
        .patterns()
        .iter()
        .map(|pattern| {
            pattern
                .accepts(value)
                .map_err(|err| err.in_rule(node.rule().name()))
        })
        .collect()
}

// =============================================================================
// Join Evaluation
// =============================================================================

/// Outcome of evaluating one input tuple against the opposite memory.
struct JoinPlan {
    key: Value,
    hash: u64,
    /// Existing children and whether each still matches.
    keep: Vec<(TupleId, bool)>,
    /// Opposite tuples that newly match.
    add: Vec<TupleId>,
}

fn beta(pattern: &Pattern, left: &[&Value], right: &Value) -> Result<bool> {
    if pattern.has_test() {
        pattern.beta(left, right)
    } else {
        Ok(true)
    }
}

fn left_values<'a>(network: &'a TupleNetwork, tuple: TupleId) -> Result<Vec<&'a Value>> {
    let facts = network.facts_of(tuple)?;
    values(&network.facts, &facts)
}

fn right_value(network: &TupleNetwork, tuple: TupleId) -> Result<&Value> {
    network.facts.value(network.tuples.get(tuple)?.fact())
}

fn plan_right(
    node: &RuleNode,
    join: usize,
    pattern: &Pattern,
    network: &TupleNetwork,
    right: TupleId,
) -> Result<JoinPlan> {
    let value = right_value(network, right)?;
    let key = pattern
        .join_spec()
        .map_or(Value::Nil, |spec| spec.right_key(value));
    let hash = key_hash(&key);
    let state = &node.joins[join];

    let mut keep = Vec::new();
    let mut paired = HashSet::new();
    for child in network.children(Owner::Tuple(right), Chain::Right)? {
        let left = network.tuples.get(child)?.left_parent().ok_or_else(|| {
            Error::structural(child, "right update", "child has no left parent")
        })?;
        paired.insert(left);
        let matched = state.left_keys.get(&left) == Some(&key)
            && beta(pattern, &left_values(network, left)?, value)?;
        keep.push((child, matched));
    }

    let mut add = Vec::new();
    for left in state.left_memory.bucket(&network.tuples, hash) {
        if paired.contains(&left) || state.left_keys.get(&left) != Some(&key) {
            continue;
        }
        if beta(pattern, &left_values(network, left)?, value)? {
            add.push(left);
        }
    }
    Ok(JoinPlan {
        key,
        hash,
        keep,
        add,
    })
}

fn plan_left(
    node: &RuleNode,
    join: usize,
    pattern: &Pattern,
    network: &TupleNetwork,
    left: TupleId,
) -> Result<JoinPlan> {
    let lefts = left_values(network, left)?;
    let key = pattern
        .join_spec()
        .map_or(Value::Nil, |spec| spec.left_key(&lefts));
    let hash = key_hash(&key);
    let state = &node.joins[join];

    let mut keep = Vec::new();
    let mut paired = HashSet::new();
    for child in network.children(Owner::Tuple(left), Chain::Left)? {
        let right = network.tuples.get(child)?.right_parent().ok_or_else(|| {
            Error::structural(child, "left update", "child has no right parent")
        })?;
        paired.insert(right);
        let matched = state.right_keys.get(&right) == Some(&key)
            && beta(pattern, &lefts, right_value(network, right)?)?;
        keep.push((child, matched));
    }

    let mut add = Vec::new();
    for right in state.right_memory.bucket(&network.tuples, hash) {
        if paired.contains(&right) || state.right_keys.get(&right) != Some(&key) {
            continue;
        }
        if beta(pattern, &lefts, right_value(network, right)?)? {
            add.push(right);
        }
    }
    Ok(JoinPlan {
        key,
        hash,
        keep,
        add,
    })
}

/// Unlinks a child and stages its deletion downstream.
///
/// A child still pending insertion was never seen downstream and is freed
/// on the spot.
fn retract_child(
    node: &mut RuleNode,
    network: &mut TupleNetwork,
    child: TupleId,
    index: usize,
) -> Result<()> {
    network.unlink(child)?;
    let outcome = node.left_input(index).stage_delete(&mut network.tuples, child)?;
    if outcome == StageOutcome::Discarded {
        network.tuples.free(child)?;
    }
    Ok(())
}

/// Creates the child of `left` (index `index`) and `right`, staged for
/// insertion downstream.
fn create_child(
    node: &mut RuleNode,
    network: &mut TupleNetwork,
    left: TupleId,
    right: TupleId,
    index: usize,
    context: Option<Arc<PropagationContext>>,
) -> Result<TupleId> {
    let fact = network.tuples.get(right)?.fact();
    let child_index = index + 1;
    let tuple = Tuple::child(
        left,
        index,
        fact,
        node.left_sink(child_index),
        node.left_kind(child_index),
    )
    .with_context(context);
    let id = network.alloc_attached(tuple, Owner::Tuple(left), Chain::Left)?;
    network.attach(id, Owner::Tuple(right), Chain::Right, None)?;
    node.left_input(child_index)
        .stage_insert(&mut network.tuples, id)?;
    Ok(id)
}

/// Applies the kept/retracted half of a plan.
///
/// Kept children move to the tail of their other parent's chain, so a
/// parent's children stay in the order they were last touched.
fn apply_keep(
    node: &mut RuleNode,
    network: &mut TupleNetwork,
    keep: Vec<(TupleId, bool)>,
    index: usize,
    other: Chain,
    context: Option<&Arc<PropagationContext>>,
) -> Result<()> {
    for (child, matched) in keep {
        if matched {
            network.tuples.get_mut(child)?.set_context(context.cloned());
            node.left_input(index + 1)
                .stage_update(&mut network.tuples, child)?;
            network.move_to_end(child, other)?;
        } else {
            retract_child(node, network, child, index + 1)?;
        }
    }
    Ok(())
}

/// Drains every staged list of join `join` of `node`.
///
/// # Errors
/// Returns `Evaluation` if a join test fails; the offending tuple is
/// restaged. Structural faults abort immediately.
pub(crate) fn evaluate_join(
    node: &mut RuleNode,
    join: usize,
    network: &mut TupleNetwork,
) -> Result<()> {
    let rule = Arc::clone(node.rule());
    let pattern = &rule.patterns()[join + 1];

    while let Some(right) = node.joins[join]
        .right_staged
        .pop(&mut network.tuples, Stage::Delete)?
    {
        let state = &mut node.joins[join];
        if network.tuples.get(right)?.memory().is_some() {
            state.right_memory.remove(&mut network.tuples, right)?;
        }
        state.right_keys.remove(&right);
        for child in network.children(Owner::Tuple(right), Chain::Right)? {
            retract_child(node, network, child, join + 1)?;
        }
        network.tuples.free(right)?;
        trace!(rule = rule.name(), join, ?right, "right delete");
    }

    while let Some(left) = node.joins[join]
        .left_staged
        .pop(&mut network.tuples, Stage::Delete)?
    {
        let state = &mut node.joins[join];
        if network.tuples.get(left)?.memory().is_some() {
            state.left_memory.remove(&mut network.tuples, left)?;
        }
        state.left_keys.remove(&left);
        for child in network.children(Owner::Tuple(left), Chain::Left)? {
            retract_child(node, network, child, join + 1)?;
        }
        network.tuples.free(left)?;
        trace!(rule = rule.name(), join, ?left, "left delete");
    }

    while let Some(right) = node.joins[join]
        .right_staged
        .pop(&mut network.tuples, Stage::Update)?
    {
        let plan = match plan_right(node, join, pattern, network, right) {
            Ok(plan) => plan,
            Err(err) => {
                node.joins[join]
                    .right_staged
                    .stage_update(&mut network.tuples, right)?;
                return Err(rule_error(err, rule.name(), right));
            }
        };
        let state = &mut node.joins[join];
        state.right_memory.remove(&mut network.tuples, right)?;
        state.right_memory.add(&mut network.tuples, right, plan.hash)?;
        state.right_keys.insert(right, plan.key);
        let context = network.tuples.get(right)?.context().cloned();
        apply_keep(node, network, plan.keep, join, Chain::Left, context.as_ref())?;
        for left in plan.add {
            create_child(node, network, left, right, join, context.clone())?;
        }
        trace!(rule = rule.name(), join, ?right, "right update");
    }

    while let Some(left) = node.joins[join]
        .left_staged
        .pop(&mut network.tuples, Stage::Update)?
    {
        let plan = match plan_left(node, join, pattern, network, left) {
            Ok(plan) => plan,
            Err(err) => {
                node.joins[join]
                    .left_staged
                    .stage_update(&mut network.tuples, left)?;
                return Err(rule_error(err, rule.name(), left));
            }
        };
        let state = &mut node.joins[join];
        state.left_memory.remove(&mut network.tuples, left)?;
        state.left_memory.add(&mut network.tuples, left, plan.hash)?;
        state.left_keys.insert(left, plan.key);
        let context = network.tuples.get(left)?.context().cloned();
        apply_keep(node, network, plan.keep, join, Chain::Right, context.as_ref())?;
        for right in plan.add {
            create_child(node, network, left, right, join, context.clone())?;
        }
        trace!(rule = rule.name(), join, ?left, "left update");
    }

    while let Some(right) = node.joins[join]
        .right_staged
        .pop(&mut network.tuples, Stage::Insert)?
    {
        let plan = match plan_right(node, join, pattern, network, right) {
            Ok(plan) => plan,
            Err(err) => {
                node.joins[join]
                    .right_staged
                    .stage_insert(&mut network.tuples, right)?;
                return Err(rule_error(err, rule.name(), right));
            }
        };
        let state = &mut node.joins[join];
        state.right_memory.add(&mut network.tuples, right, plan.hash)?;
        state.right_keys.insert(right, plan.key);
        let context = network.tuples.get(right)?.context().cloned();
        for left in plan.add {
            create_child(node, network, left, right, join, context.clone())?;
        }
        trace!(rule = rule.name(), join, ?right, "right insert");
    }

    while let Some(left) = node.joins[join]
        .left_staged
        .pop(&mut network.tuples, Stage::Insert)?
    {
        let plan = match plan_left(node, join, pattern, network, left) {
            Ok(plan) => plan,
            Err(err) => {
                node.joins[join]
                    .left_staged
                    .stage_insert(&mut network.tuples, left)?;
                return Err(rule_error(err, rule.name(), left));
            }
        };
        let state = &mut node.joins[join];
        state.left_memory.add(&mut network.tuples, left, plan.hash)?;
        state.left_keys.insert(left, plan.key);
        let context = network.tuples.get(left)?.context().cloned();
        for right in plan.add {
            create_child(node, network, left, right, join, context.clone())?;
        }
        trace!(rule = rule.name(), join, ?left, "left insert");
    }

    Ok(())
}

/// Staging lists a fact-level tuple feeds.
fn staging_for<'a>(
    rules: &'a mut [RuleNode],
    slot: NodeSlot,
    right: bool,
    tuple: TupleId,
) -> Result<&'a mut StagedTuples> {
    let missing = || Error::structural(tuple, "staging lookup", "tuple feeds a missing node");
    let node = rules.get_mut(slot.rule()).ok_or_else(missing)?;
    match slot {
        NodeSlot::Join { join, .. } => {
            let state = node.joins.get_mut(join).ok_or_else(missing)?;
            Ok(if right {
                &mut state.right_staged
            } else {
                &mut state.left_staged
            })
        }
        NodeSlot::Terminal { .. } => Ok(node.executor.staged_mut()),
    }
}

// =============================================================================
// Fact Propagation
// =============================================================================

impl Session {
    pub(crate) fn new_context(
        &mut self,
        kind: PropagationType,
        fact: Option<FactId>,
        recency: Recency,
        origin: Option<(TerminalIdentity, TupleId)>,
    ) -> Arc<PropagationContext> {
        self.next_context += 1;
        let context = PropagationContext::new(self.next_context, kind, fact, recency);
        Arc::new(match origin {
            Some((identity, tuple)) => context.with_origin(identity, tuple),
            None => context,
        })
    }

    fn alpha_all(&self, value: &Value) -> Result<Vec<Vec<bool>>> {
        self.rules.iter().map(|node| alpha(node, value)).collect()
    }

    /// Creates the root (position 0) or right tuple of `fact` for one
    /// pattern of one rule and stages its insertion.
    fn create_fact_tuple(
        &mut self,
        rule: usize,
        position: usize,
        fact: FactId,
        context: &Arc<PropagationContext>,
    ) -> Result<TupleId> {
        let node = &mut self.rules[rule];
        let missing = || Error::build(format!("rule #{rule} has no pattern {position}"));
        let (tuple, chain) = if position == 0 {
            let tuple = Tuple::root(fact, node.left_sink(0), node.left_kind(0));
            (tuple, Chain::Left)
        } else {
            let sink = node.right_sink(position).ok_or_else(missing)?;
            (Tuple::root(fact, sink, TupleKind::Right), Chain::Right)
        };
        let tuple = tuple.with_context(Some(Arc::clone(context)));
        let id = self.network.alloc_attached(tuple, Owner::Fact(fact), chain)?;
        let staged = if position == 0 {
            node.left_input(0)
        } else {
            node.right_input(position).ok_or_else(missing)?
        };
        staged.stage_insert(&mut self.network.tuples, id)?;
        Ok(id)
    }

    fn fact_tuple_target(&self, id: TupleId) -> Result<(NodeSlot, bool)> {
        let tuple = self.network.tuples.get(id)?;
        let right = matches!(tuple.kind(), TupleKind::Right);
        Ok((self.slot(id, tuple.sink())?, right))
    }

    /// Unlinks a root or right tuple from its fact and stages its deletion.
    fn retract_fact_tuple(&mut self, id: TupleId, context: &Arc<PropagationContext>) -> Result<()> {
        let (slot, right) = self.fact_tuple_target(id)?;
        self.network
            .tuples
            .get_mut(id)?
            .set_context(Some(Arc::clone(context)));
        self.network.unlink(id)?;
        let staged = staging_for(&mut self.rules, slot, right, id)?;
        if staged.stage_delete(&mut self.network.tuples, id)? == StageOutcome::Discarded {
            self.network.tuples.free(id)?;
        }
        Ok(())
    }

    pub(crate) fn insert_fact(
        &mut self,
        value: Value,
        origin: Option<(TerminalIdentity, TupleId)>,
    ) -> Result<FactId> {
        let matches = self.alpha_all(&value)?;
        let fact = self.network.facts.insert(value);
        let recency = self.network.facts.current_recency();
        let context = self.new_context(PropagationType::Insertion, Some(fact), recency, origin);
        for (rule, positions) in matches.iter().enumerate() {
            for (position, matched) in positions.iter().enumerate() {
                if *matched {
                    self.create_fact_tuple(rule, position, fact, &context)?;
                }
            }
        }
        trace!(?fact, recency, "fact inserted");
        Ok(fact)
    }

    pub(crate) fn update_fact(
        &mut self,
        fact: FactId,
        value: Value,
        origin: Option<(TerminalIdentity, TupleId)>,
    ) -> Result<()> {
        self.network.facts.validate(fact)?;
        let matches = self.alpha_all(&value)?;
        let recency = self.network.facts.update(fact, value)?;
        let context = self.new_context(PropagationType::Modification, Some(fact), recency, origin);

        let mut existing = HashMap::new();
        for chain in [Chain::Left, Chain::Right] {
            for id in self.network.children(Owner::Fact(fact), chain)? {
                let (slot, _) = self.fact_tuple_target(id)?;
                let position = match (chain, slot) {
                    (Chain::Left, _) => 0,
                    (Chain::Right, NodeSlot::Join { join, .. }) => join + 1,
                    (Chain::Right, NodeSlot::Terminal { .. }) => {
                        return Err(Error::structural(
                            id,
                            "update fact",
                            "right tuple feeds a terminal node",
                        ));
                    }
                };
                existing.insert((slot.rule(), position), id);
            }
        }

        for (rule, positions) in matches.iter().enumerate() {
            for (position, matched) in positions.iter().enumerate() {
                match (existing.get(&(rule, position)).copied(), *matched) {
                    (Some(id), true) => {
                        let (slot, right) = self.fact_tuple_target(id)?;
                        self.network
                            .tuples
                            .get_mut(id)?
                            .set_context(Some(Arc::clone(&context)));
                        staging_for(&mut self.rules, slot, right, id)?
                            .stage_update(&mut self.network.tuples, id)?;
                    }
                    (Some(id), false) => self.retract_fact_tuple(id, &context)?,
                    (None, true) => {
                        self.create_fact_tuple(rule, position, fact, &context)?;
                    }
                    (None, false) => {}
                }
            }
        }
        trace!(?fact, recency, "fact updated");
        Ok(())
    }

    pub(crate) fn delete_fact(
        &mut self,
        fact: FactId,
        origin: Option<(TerminalIdentity, TupleId)>,
    ) -> Result<()> {
        let recency = self.network.facts.get(fact)?.recency();
        let context = self.new_context(PropagationType::Deletion, Some(fact), recency, origin);
        for chain in [Chain::Left, Chain::Right] {
            for id in self.network.children(Owner::Fact(fact), chain)? {
                self.retract_fact_tuple(id, &context)?;
            }
        }
        self.network.facts.remove(fact)?;
        trace!(?fact, recency, "fact deleted");
        Ok(())
    }

    /// Propagates every live fact into rule `rule`.
    pub(crate) fn seed_rule(&mut self, rule: usize) -> Result<()> {
        let mut seeds = Vec::new();
        for handle in self.network.facts.iter() {
            let matched = alpha(&self.rules[rule], handle.value())?;
            if matched.iter().any(|m| *m) {
                seeds.push((handle.id(), handle.recency(), matched));
            }
        }
        let seeded = seeds.len();
        for (fact, recency, matched) in seeds {
            let context =
                self.new_context(PropagationType::RuleAddition, Some(fact), recency, None);
            for (position, hit) in matched.into_iter().enumerate() {
                if hit {
                    self.create_fact_tuple(rule, position, fact, &context)?;
                }
            }
        }
        trace!(rule, seeded, "rule seeded");
        Ok(())
    }

    /// Drains all staged work, repeating until no node has any left.
    ///
    /// Terminal handling can insert or delete facts (materialised matches),
    /// so one pass is not always enough.
    ///
    /// # Errors
    /// Returns `Evaluation` if a join test or salience expression fails.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;
            for index in 0..self.rules.len() {
                for join in 0..self.rules[index].joins.len() {
                    if self.rules[index].joins[join].has_staged() {
                        evaluate_join(&mut self.rules[index], join, &mut self.network)?;
                        progressed = true;
                    }
                }
                if !self.rules[index].executor.staged().is_empty() {
                    self.evaluate_terminal(index)?;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }
}
