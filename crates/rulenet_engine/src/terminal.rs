//! Terminal node handling: turning complete matches into activations.
//!
//! Inserts run auto-focus, no-loop, salience, and lock-on-active before
//! handing the match to the rule's executor. Updates re-check the same
//! policies but never create a second activation for one match. Deletes
//! cancel unconditionally.
//!
//! With the declarative agenda enabled, every queued activation is also
//! inserted as a [`Value::Match`] fact so that meta-rules can block and
//! unblock it.

use std::sync::Arc;

use rulenet_foundation::{Error, FactId, MatchRef, Result, TupleId, Value};
use rulenet_network::{PropagationContext, Stage};
use tracing::{debug, trace};

use crate::event::{CancelReason, MatchEvent};
use crate::propagation::values;
use crate::rule::CompiledRule;
use crate::session::{Session, rule_error};

impl Session {
    /// Drains the terminal staging of rule `index`: deletes, then updates,
    /// then inserts.
    pub(crate) fn evaluate_terminal(&mut self, index: usize) -> Result<()> {
        while let Some(tuple) = self.rules[index]
            .executor
            .staged_mut()
            .pop(&mut self.network.tuples, Stage::Delete)?
        {
            self.terminal_delete(index, tuple)?;
        }
        while let Some(tuple) = self.rules[index]
            .executor
            .staged_mut()
            .pop(&mut self.network.tuples, Stage::Update)?
        {
            self.terminal_update(index, tuple)?;
        }
        while let Some(tuple) = self.rules[index]
            .executor
            .staged_mut()
            .pop(&mut self.network.tuples, Stage::Insert)?
        {
            self.terminal_insert(index, tuple)?;
        }
        Ok(())
    }

    fn salience_of(&self, rule: &CompiledRule, facts: &[FactId]) -> Result<i32> {
        if rule.salience().is_dynamic() {
            rule.salience().evaluate(&values(&self.network.facts, facts)?)
        } else {
            rule.salience().evaluate(&[])
        }
    }

    fn is_looping(rule: &CompiledRule, context: Option<&Arc<PropagationContext>>) -> bool {
        rule.no_loop() && context.is_some_and(|ctx| ctx.originates_from(rule.identity()))
    }

    fn is_locked(&self, index: usize, context: Option<&Arc<PropagationContext>>) -> bool {
        let node = &self.rules[index];
        if !node.rule().lock_on_active() {
            return false;
        }
        let Some(context) = context else {
            return false;
        };
        self.agenda
            .group(node.executor.agenda_group())
            .is_some_and(|group| group.is_suppressed(context))
    }

    fn auto_focus(&mut self, index: usize, context: Option<&Arc<PropagationContext>>) {
        let group = self.rules[index].executor.agenda_group();
        let Some(state) = self.agenda.group_mut(group) else {
            return;
        };
        if state.is_active() {
            return;
        }
        let name = state.name().to_string();
        let recency = self.network.facts.current_recency();
        if !self.agenda.set_focus(group, recency) {
            return;
        }
        if let Some(state) = self.agenda.group_mut(group) {
            state.set_auto_focus_activator(context.cloned());
        }
        debug!(group = %name, recency, "auto-focus");
        self.events.pushed(&name);
    }

    fn terminal_insert(&mut self, index: usize, tuple: TupleId) -> Result<()> {
        let rule = Arc::clone(self.rules[index].rule());
        let context = self.network.tuples.get(tuple)?.context().cloned();
        let facts = self.network.facts_of(tuple)?;
        let looping = Self::is_looping(&rule, context.as_ref());

        let salience = if looping {
            0
        } else {
            match self.salience_of(&rule, &facts) {
                Ok(salience) => salience,
                Err(err) => {
                    self.rules[index]
                        .executor
                        .staged_mut()
                        .stage_insert(&mut self.network.tuples, tuple)?;
                    return Err(rule_error(err, rule.name(), tuple));
                }
            }
        };
        self.network.tuples.get_mut(tuple)?.activation_mut()?.facts = facts;

        if rule.auto_focus() {
            self.auto_focus(index, context.as_ref());
        }
        if looping {
            trace!(rule = rule.name(), ?tuple, "no-loop discarded insert");
            return Ok(());
        }

        let number = self.agenda.next_activation_number();
        {
            let activation = self.network.tuples.get_mut(tuple)?.activation_mut()?;
            activation.salience = salience;
            activation.activation_number = number;
        }
        self.notify_created(tuple)?;
        if self.is_locked(index, context.as_ref()) {
            trace!(rule = rule.name(), ?tuple, "lock-on-active filtered insert");
            return self.notify_cancelled(tuple, CancelReason::Filter);
        }
        self.enqueue(index, tuple)
    }

    fn terminal_update(&mut self, index: usize, tuple: TupleId) -> Result<()> {
        let rule = Arc::clone(self.rules[index].rule());
        let context = self.network.tuples.get(tuple)?.context().cloned();
        let facts = self.network.facts_of(tuple)?;
        let salience = match self.salience_of(&rule, &facts) {
            Ok(salience) => salience,
            Err(err) => {
                self.rules[index]
                    .executor
                    .staged_mut()
                    .stage_update(&mut self.network.tuples, tuple)?;
                return Err(rule_error(err, rule.name(), tuple));
            }
        };

        let (queued, blocked) = {
            let t = self.network.tuples.get_mut(tuple)?;
            let blocked = !t.blockers()?.is_empty();
            let activation = t.activation_mut()?;
            activation.facts = facts;
            if blocked {
                activation.salience = salience;
                activation.held = true;
            }
            (activation.queued, blocked)
        };
        if blocked {
            trace!(rule = rule.name(), ?tuple, "update deferred by blockers");
            return Ok(());
        }
        if Self::is_looping(&rule, context.as_ref()) {
            trace!(rule = rule.name(), ?tuple, "no-loop discarded update");
            return Ok(());
        }

        if queued {
            let current = self.network.tuples.get(tuple)?.activation()?.salience;
            if current != salience {
                self.rules[index].executor.requeue(
                    &mut self.agenda,
                    &mut self.network.tuples,
                    tuple,
                    salience,
                )?;
            }
            return Ok(());
        }

        self.network.tuples.get_mut(tuple)?.activation_mut()?.salience = salience;
        if self.is_locked(index, context.as_ref()) {
            trace!(rule = rule.name(), ?tuple, "lock-on-active held update");
            return Ok(());
        }
        let number = self.agenda.next_activation_number();
        self.network
            .tuples
            .get_mut(tuple)?
            .activation_mut()?
            .activation_number = number;
        self.notify_created(tuple)?;
        self.enqueue(index, tuple)
    }

    fn terminal_delete(&mut self, index: usize, tuple: TupleId) -> Result<()> {
        self.network
            .tuples
            .get_mut(tuple)?
            .activation_mut()?
            .match_valid = false;
        let cancelled = self.rules[index].executor.remove_tuple(
            &mut self.agenda,
            &mut self.network.tuples,
            tuple,
        )?;
        if cancelled {
            self.notify_cancelled(tuple, CancelReason::Retracted)?;
        }
        self.release_blocks(tuple)?;
        self.retract_match_fact(tuple)?;
        self.network.tuples.get_mut(tuple)?.set_context(None);
        self.network.tuples.free(tuple)?;
        trace!(rule = self.rules[index].rule().name(), ?tuple, "match deleted");
        Ok(())
    }

    /// Hands a match to its executor, materialising it as a fact when the
    /// declarative agenda is on and the rule is not itself a meta-rule.
    fn enqueue(&mut self, index: usize, tuple: TupleId) -> Result<()> {
        let node = &self.rules[index];
        node.executor.add_tuple(&mut self.agenda, &mut self.network.tuples, tuple)?;
        if !node.executor.declarative_agenda_enabled()
            || node.rule().reads_matches()
            || self.network.tuples.get(tuple)?.activation()?.fact.is_some()
        {
            return Ok(());
        }
        let rule = Arc::clone(&self.rules[index].rule().identity().rule);
        let fact = self.insert_fact(Value::Match(MatchRef { rule, tuple }), None)?;
        self.network.tuples.get_mut(tuple)?.activation_mut()?.fact = Some(fact);
        Ok(())
    }

    /// Deletes the fact a match was materialised under, if any.
    pub(crate) fn retract_match_fact(&mut self, tuple: TupleId) -> Result<()> {
        let fact = self.network.tuples.get_mut(tuple)?.activation_mut()?.fact.take();
        match fact {
            Some(fact) if self.network.facts.exists(fact) => self.delete_fact(fact, None),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Declarative Agenda
    // =========================================================================

    /// Terminal tuple behind a materialised match fact.
    pub(crate) fn match_target(&self, fact: FactId, operation: &'static str) -> Result<TupleId> {
        if !self.config.declarative_agenda {
            return Err(Error::unsupported(
                operation,
                "session without declarative agenda",
            ));
        }
        let Some(matched) = self.network.facts.value(fact)?.as_match() else {
            return Err(Error::unsupported(operation, "fact that is not a match"));
        };
        let tuple = matched.tuple;
        self.network.tuples.get(tuple)?.activation()?;
        Ok(tuple)
    }

    pub(crate) fn block_match(&mut self, blocker: TupleId, fact: FactId) -> Result<()> {
        let target = self.match_target(fact, "block match")?;
        {
            let activation = self.network.tuples.get_mut(target)?.activation_mut()?;
            if !activation.blockers.contains(&blocker) {
                activation.blockers.push(blocker);
            }
        }
        {
            let activation = self.network.tuples.get_mut(blocker)?.activation_mut()?;
            if !activation.blocked.contains(&target) {
                activation.blocked.push(target);
            }
        }

        let index = self.rule_of(target)?;
        let removed = self.rules[index].executor.remove_tuple(
            &mut self.agenda,
            &mut self.network.tuples,
            target,
        )?;
        if removed {
            self.network.tuples.get_mut(target)?.activation_mut()?.held = true;
            self.notify_cancelled(target, CancelReason::Blocked)?;
        }
        debug!(?blocker, ?target, removed, "match blocked");
        Ok(())
    }

    pub(crate) fn unblock_all(&mut self, fact: FactId) -> Result<()> {
        let target = self.match_target(fact, "unblock all")?;
        let blockers =
            std::mem::take(&mut self.network.tuples.get_mut(target)?.activation_mut()?.blockers);
        for blocker in &blockers {
            if let Ok(t) = self.network.tuples.get_mut(*blocker) {
                t.activation_mut()?.blocked.retain(|b| *b != target);
            }
        }
        debug!(?target, released = blockers.len(), "match unblocked");
        self.resume_if_ready(target)
    }

    /// Detaches a deleted match from both sides of every block it is part of.
    fn release_blocks(&mut self, tuple: TupleId) -> Result<()> {
        let (blockers, blocked) = {
            let activation = self.network.tuples.get_mut(tuple)?.activation_mut()?;
            (
                std::mem::take(&mut activation.blockers),
                std::mem::take(&mut activation.blocked),
            )
        };
        for blocker in blockers {
            if let Ok(t) = self.network.tuples.get_mut(blocker) {
                t.activation_mut()?.blocked.retain(|b| *b != tuple);
            }
        }
        for target in blocked {
            if !self.network.tuples.contains(target) {
                continue;
            }
            self.network
                .tuples
                .get_mut(target)?
                .activation_mut()?
                .blockers
                .retain(|b| *b != tuple);
            self.resume_if_ready(target)?;
        }
        Ok(())
    }

    /// Requeues a held match once nothing blocks it any more.
    fn resume_if_ready(&mut self, target: TupleId) -> Result<()> {
        let ready = {
            let activation = self.network.tuples.get(target)?.activation()?;
            activation.blockers.is_empty()
                && activation.match_valid
                && activation.held
                && !activation.queued
        };
        if !ready {
            return Ok(());
        }
        let index = self.rule_of(target)?;
        let number = self.agenda.next_activation_number();
        {
            let activation = self.network.tuples.get_mut(target)?.activation_mut()?;
            activation.held = false;
            activation.activation_number = number;
        }
        self.notify_created(target)?;
        self.enqueue(index, target)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub(crate) fn match_event(&self, tuple: TupleId) -> Result<MatchEvent> {
        let index = self.rule_of(tuple)?;
        let activation = self.network.tuples.get(tuple)?.activation()?;
        Ok(MatchEvent {
            rule: Arc::clone(&self.rules[index].rule().identity().rule),
            tuple,
            facts: activation.facts.clone(),
            salience: activation.salience,
            activation_number: activation.activation_number,
        })
    }

    fn notify_created(&mut self, tuple: TupleId) -> Result<()> {
        if self.events.is_empty() {
            return Ok(());
        }
        let event = self.match_event(tuple)?;
        self.events.created(&event);
        Ok(())
    }

    pub(crate) fn notify_cancelled(&mut self, tuple: TupleId, reason: CancelReason) -> Result<()> {
        if self.events.is_empty() {
            return Ok(());
        }
        let event = self.match_event(tuple)?;
        self.events.cancelled(&event, reason);
        Ok(())
    }
}
