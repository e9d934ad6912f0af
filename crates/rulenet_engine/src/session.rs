//! Sessions: working memory, the tuple network, and the fire loop.
//!
//! A `Session` is single-threaded: every operation takes `&mut self` and
//! drains whatever it starts before returning. Independent sessions share
//! only the immutable compiled rules and may run on different threads.

use std::collections::HashSet;
use std::sync::Arc;

use rulenet_foundation::{Error, FactId, Result, SemanticLimit, TupleId, Value};
use rulenet_network::{NodeId, TerminalIdentity, TupleNetwork};
use tracing::{debug, warn};

use crate::agenda::Agenda;
use crate::config::SessionConfig;
use crate::event::{AgendaEventListener, CancelReason, EventSupport};
use crate::executor::RuleExecutor;
use crate::node::{JoinNode, NodeSlot, RuleNode};
use crate::rule::CompiledRule;

/// Attaches rule and tuple context to an error raised while handling a match.
pub(crate) fn rule_error(err: Error, rule: &str, tuple: TupleId) -> Error {
    let mut err = err.in_rule(rule);
    if let Some(context) = err.context.as_mut() {
        context.tuple.get_or_insert(tuple);
    }
    err
}

/// A running rule session.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) network: TupleNetwork,
    pub(crate) rules: Vec<RuleNode>,
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) agenda: Agenda,
    pub(crate) events: EventSupport,
    pub(crate) next_context: u64,
    pub(crate) halted: bool,
}

impl Session {
    /// Creates a session over `rules`, in order.
    ///
    /// # Errors
    /// Returns `Build` if two rules share a terminal identity.
    pub fn new(rules: &[Arc<CompiledRule>], config: SessionConfig) -> Result<Self> {
        let mut session = Self {
            config,
            network: TupleNetwork::new(),
            rules: Vec::with_capacity(rules.len()),
            nodes: Vec::new(),
            agenda: Agenda::new(),
            events: EventSupport::default(),
            next_context: 0,
            halted: false,
        };
        for rule in rules {
            session.install(Arc::clone(rule))?;
        }
        Ok(session)
    }

    fn alloc_node(&mut self, slot: NodeSlot) -> Result<NodeId> {
        let id = u32::try_from(self.nodes.len())
            .map_err(|_| Error::build("node id space exhausted"))?;
        self.nodes.push(slot);
        Ok(NodeId(id))
    }

    /// Builds the network segment for `rule` and returns its index.
    fn install(&mut self, rule: Arc<CompiledRule>) -> Result<usize> {
        if self
            .rules
            .iter()
            .any(|node| node.rule().identity() == rule.identity())
        {
            return Err(Error::build(format!("duplicate rule {}", rule.identity())));
        }
        let index = self.rules.len();
        let mut joins = Vec::with_capacity(rule.arity().saturating_sub(1));
        for join in 0..rule.arity().saturating_sub(1) {
            let id = self.alloc_node(NodeSlot::Join { rule: index, join })?;
            joins.push(JoinNode::new(id, self.config.memory_capacity));
        }
        let terminal = self.alloc_node(NodeSlot::Terminal { rule: index })?;
        let group = self.agenda.group_id(rule.agenda_group());
        let executor = RuleExecutor::new(terminal, group, self.config.declarative_agenda);
        debug!(rule = %rule.identity(), joins = joins.len(), "rule installed");
        self.rules.push(RuleNode::new(rule, joins, executor)?);
        Ok(index)
    }

    /// Index of the rule that owns the node `tuple` feeds.
    pub(crate) fn rule_of(&self, tuple: TupleId) -> Result<usize> {
        let sink = self.network.tuples.get(tuple)?.sink();
        self.slot(tuple, sink).map(NodeSlot::rule)
    }

    pub(crate) fn slot(&self, tuple: TupleId, sink: NodeId) -> Result<NodeSlot> {
        self.nodes.get(sink.0 as usize).copied().ok_or_else(|| {
            Error::structural(tuple, "node lookup", format!("unknown sink {sink:?}"))
        })
    }

    // =========================================================================
    // Working Memory
    // =========================================================================

    /// Inserts a fact.
    ///
    /// # Errors
    /// Returns `Evaluation` if a pattern condition fails on the value; the
    /// fact is not inserted.
    pub fn insert(&mut self, value: impl Into<Value>) -> Result<FactId> {
        self.insert_fact(value.into(), None)
    }

    /// Replaces a fact's value.
    ///
    /// # Errors
    /// Returns an error for stale or unknown facts, or `Evaluation` if a
    /// pattern condition fails on the new value; the fact is left unchanged.
    pub fn update(&mut self, fact: FactId, value: impl Into<Value>) -> Result<()> {
        self.update_fact(fact, value.into(), None)
    }

    /// Deletes a fact.
    ///
    /// # Errors
    /// Returns an error for stale or unknown facts.
    pub fn delete(&mut self, fact: FactId) -> Result<()> {
        self.delete_fact(fact, None)
    }

    /// Borrows a fact's value.
    ///
    /// # Errors
    /// Returns an error for stale or unknown facts.
    pub fn fact(&self, fact: FactId) -> Result<&Value> {
        self.network.facts.value(fact)
    }

    /// Number of live facts, including materialised matches.
    #[must_use]
    pub fn fact_count(&self) -> usize {
        self.network.facts.len()
    }

    /// Live facts in slot order.
    pub fn facts(&self) -> impl Iterator<Item = (FactId, &Value)> + '_ {
        self.network
            .facts
            .iter()
            .map(|handle| (handle.id(), handle.value()))
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Adds a rule to the running session.
    ///
    /// Every live fact is propagated into the new rule with a
    /// rule-addition context, which lock-on-active never suppresses.
    ///
    /// # Errors
    /// Returns `Build` if the rule's identity is already present, or
    /// `Evaluation` if a pattern condition fails on an existing fact.
    pub fn add_rule(&mut self, rule: impl Into<Arc<CompiledRule>>) -> Result<()> {
        let index = self.install(rule.into())?;
        if let Err(err) = self.seed_rule(index) {
            self.uninstall_last();
            return Err(err);
        }
        Ok(())
    }

    /// Removes the most recently installed rule before it saw any facts.
    fn uninstall_last(&mut self) {
        if self.rules.pop().is_some() {
            let index = self.rules.len();
            self.nodes.retain(|slot| slot.rule() != index);
        }
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Compiled rules in installation order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<CompiledRule>> + '_ {
        self.rules.iter().map(RuleNode::rule)
    }

    /// Network segments in installation order.
    #[must_use]
    pub fn rule_nodes(&self) -> &[RuleNode] {
        &self.rules
    }

    // =========================================================================
    // Agenda
    // =========================================================================

    /// Registers an event listener.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: AgendaEventListener + 'static,
    {
        self.events.add(Box::new(listener));
    }

    /// Pushes the named agenda group onto the focus stack.
    pub fn set_focus(&mut self, group: &str) {
        let id = self.agenda.group_id(group);
        let recency = self.network.facts.current_recency();
        if self.agenda.set_focus(id, recency) {
            self.events.pushed(group);
        }
    }

    /// Cancels every queued activation in the named group.
    ///
    /// Returns how many were cancelled.
    ///
    /// # Errors
    /// Propagates network faults.
    pub fn clear_agenda_group(&mut self, group: &str) -> Result<usize> {
        let Some(id) = self.agenda.lookup(group) else {
            return Ok(0);
        };
        let recency = self.network.facts.current_recency();
        let drained = self.agenda.clear_group(id, recency);
        for &tuple in &drained {
            self.network.tuples.get_mut(tuple)?.activation_mut()?.queued = false;
            self.notify_cancelled(tuple, CancelReason::Clear)?;
            self.retract_match_fact(tuple)?;
        }
        debug!(group, cleared = drained.len(), recency, "agenda group cleared");
        Ok(drained.len())
    }

    /// Group names on the focus stack, bottom to top.
    #[must_use]
    pub fn focus_stack(&self) -> Vec<String> {
        self.agenda
            .focus_stack_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Number of queued activations.
    #[must_use]
    pub fn agenda_size(&self) -> usize {
        self.agenda.len()
    }

    /// The agenda.
    #[must_use]
    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    /// Number of live tuples in the network.
    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.network.tuples.len()
    }

    /// The tuple network.
    #[must_use]
    pub fn network(&self) -> &TupleNetwork {
        &self.network
    }

    /// Configuration this session was created with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Fires activations until the agenda is empty or a consequence halts.
    ///
    /// Returns the number of activations fired.
    ///
    /// # Errors
    /// Returns `LimitExceeded` once more than `max_activations` would fire,
    /// `Evaluation` if a condition, salience, or consequence fails.
    pub fn fire_all_rules(&mut self) -> Result<usize> {
        self.fire_loop(None)
    }

    /// Like [`fire_all_rules`](Self::fire_all_rules) but stops after
    /// `limit` activations.
    ///
    /// # Errors
    /// As [`fire_all_rules`](Self::fire_all_rules).
    pub fn fire_until_limit(&mut self, limit: usize) -> Result<usize> {
        self.fire_loop(Some(limit))
    }

    fn fire_loop(&mut self, limit: Option<usize>) -> Result<usize> {
        self.halted = false;
        let mut fired = 0;
        loop {
            self.flush()?;
            if self.halted || limit.is_some_and(|limit| fired >= limit) {
                break;
            }
            let Some((_, next)) = self.agenda.peek() else {
                self.select_next();
                break;
            };
            if fired >= self.config.max_activations {
                let rule = self
                    .rule_of(next)
                    .ok()
                    .map(|index| self.rules[index].rule().identity().to_string());
                warn!(limit = self.config.max_activations, ?rule, "activation limit reached");
                return Err(Error::limit_exceeded(SemanticLimit::MaxActivations {
                    limit: self.config.max_activations,
                    context: rule,
                }));
            }

            let Some(tuple) = self.select_next() else {
                break;
            };
            self.fire(tuple)?;
            fired += 1;
        }
        debug!(fired, halted = self.halted, "fire loop finished");
        Ok(fired)
    }

    /// Dequeues the next activation, popping exhausted groups on the way.
    fn select_next(&mut self) -> Option<TupleId> {
        let recency = self.network.facts.current_recency();
        let selection = self.agenda.select(recency);
        for group in selection.popped {
            let name = self
                .agenda
                .group(group)
                .map(|g| g.name().to_string())
                .unwrap_or_default();
            self.events.popped(&name);
        }
        selection.next.map(|(_, tuple)| tuple)
    }

    fn fire(&mut self, tuple: TupleId) -> Result<()> {
        let index = self.rule_of(tuple)?;
        let rule = Arc::clone(self.rules[index].rule());
        let facts = {
            let activation = self.network.tuples.get_mut(tuple)?.activation_mut()?;
            activation.queued = false;
            activation.active = true;
            activation.facts.clone()
        };
        let event = self.match_event(tuple)?;
        self.events.before_fired(&event);
        debug!(
            rule = %rule.identity(),
            ?tuple,
            salience = event.salience,
            number = event.activation_number,
            "firing"
        );

        let result = {
            let mut context = RuleContext {
                session: self,
                rule: Arc::clone(&rule),
                tuple,
                facts,
            };
            (rule.consequence)(&mut context)
        };
        if let Ok(activation) = self
            .network
            .tuples
            .get_mut(tuple)
            .and_then(|t| t.activation_mut())
        {
            activation.active = false;
        }
        result.map_err(|err| rule_error(err, rule.name(), tuple))?;

        self.events.after_fired(&event);
        self.retract_match_fact(tuple)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("rules", &self.rules.len())
            .field("facts", &self.network.facts.len())
            .field("tuples", &self.network.tuples.len())
            .field("agenda", &self.agenda.len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Rule Context
// =============================================================================

/// What a consequence sees while it runs.
///
/// Changes made through the context carry the firing rule as their origin,
/// which is what no-loop checks against.
pub struct RuleContext<'a> {
    session: &'a mut Session,
    rule: Arc<CompiledRule>,
    tuple: TupleId,
    facts: Vec<FactId>,
}

impl RuleContext<'_> {
    fn origin(&self) -> Option<(TerminalIdentity, TupleId)> {
        Some((self.rule.identity().clone(), self.tuple))
    }

    /// Name of the firing rule.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    /// Terminal tuple of the firing match.
    #[must_use]
    pub fn tuple(&self) -> TupleId {
        self.tuple
    }

    /// Facts bound by the match, in pattern order.
    #[must_use]
    pub fn facts(&self) -> &[FactId] {
        &self.facts
    }

    /// Fact bound by pattern `position`.
    ///
    /// # Errors
    /// Returns `Evaluation` if the rule has no such pattern.
    pub fn fact_id(&self, position: usize) -> Result<FactId> {
        self.facts.get(position).copied().ok_or_else(|| {
            Error::evaluation(
                self.rule.name(),
                format!("no pattern at position {position}"),
            )
        })
    }

    /// Value of the fact bound by pattern `position`.
    ///
    /// # Errors
    /// Returns `Evaluation` if the rule has no such pattern, or an error if
    /// the fact has been deleted by this consequence.
    pub fn fact(&self, position: usize) -> Result<&Value> {
        let id = self.fact_id(position)?;
        self.session.fact(id)
    }

    /// Value of any live fact.
    ///
    /// # Errors
    /// Returns an error for stale or unknown facts.
    pub fn value(&self, fact: FactId) -> Result<&Value> {
        self.session.fact(fact)
    }

    /// Inserts a fact.
    ///
    /// # Errors
    /// As [`Session::insert`].
    pub fn insert(&mut self, value: impl Into<Value>) -> Result<FactId> {
        let origin = self.origin();
        self.session.insert_fact(value.into(), origin)
    }

    /// Replaces a fact's value.
    ///
    /// # Errors
    /// As [`Session::update`].
    pub fn update(&mut self, fact: FactId, value: impl Into<Value>) -> Result<()> {
        let origin = self.origin();
        self.session.update_fact(fact, value.into(), origin)
    }

    /// Rewrites the fact bound by pattern `position`.
    ///
    /// # Errors
    /// As [`fact`](Self::fact) and [`update`](Self::update).
    pub fn modify<F>(&mut self, position: usize, change: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        let id = self.fact_id(position)?;
        let value = change(self.session.fact(id)?);
        self.update(id, value)
    }

    /// Deletes a fact.
    ///
    /// # Errors
    /// As [`Session::delete`].
    pub fn delete(&mut self, fact: FactId) -> Result<()> {
        let origin = self.origin();
        self.session.delete_fact(fact, origin)
    }

    /// Pushes the named agenda group onto the focus stack.
    pub fn set_focus(&mut self, group: &str) {
        self.session.set_focus(group);
    }

    /// Stops the fire loop once this consequence returns.
    pub fn halt(&mut self) {
        debug!(rule = %self.rule.identity(), "halt requested");
        self.session.halted = true;
    }

    /// Blocks the match materialised as `fact`.
    ///
    /// The blocked match leaves the agenda until every blocker is gone.
    ///
    /// # Errors
    /// Returns `Unsupported` without the declarative agenda or if `fact` is
    /// not a materialised match.
    pub fn block_match(&mut self, fact: FactId) -> Result<()> {
        self.session.block_match(self.tuple, fact)
    }

    /// Removes every blocker from the match materialised as `fact`.
    ///
    /// # Errors
    /// As [`block_match`](Self::block_match).
    pub fn unblock_all(&mut self, fact: FactId) -> Result<()> {
        self.session.unblock_all(fact)
    }

    /// Rule names of the matches currently blocking the match materialised
    /// as `fact`.
    ///
    /// # Errors
    /// As [`block_match`](Self::block_match).
    pub fn blockers_of(&self, fact: FactId) -> Result<Vec<String>> {
        let target = self.session.match_target(fact, "blockers of")?;
        let blockers = self.session.network.tuples.get(target)?.blockers()?;
        let mut names = Vec::with_capacity(blockers.len());
        let mut seen = HashSet::new();
        for blocker in blockers {
            if let Ok(index) = self.session.rule_of(*blocker) {
                let name = self.session.rules[index].rule().name().to_string();
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}
