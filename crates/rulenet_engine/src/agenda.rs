//! Agenda groups, the focus stack, and firing order.
//!
//! Every rule schedules into one agenda group. Groups sit on a focus stack
//! with `MAIN` permanently at the bottom; the topmost group with queued
//! activations fires first. Within a group, activations fire by descending
//! salience, ties broken by ascending activation number.

use std::cmp::Reverse;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rulenet_foundation::{AgendaGroupId, Error, Recency, Result, TupleId};
use rulenet_network::{PropagationContext, PropagationType};
use tracing::trace;

use crate::rule::MAIN_GROUP;

/// Watermark value meaning "never cleared".
pub const NEVER_CLEARED: Recency = -1;

// =============================================================================
// Queue Key
// =============================================================================

/// Ordering key of a queued activation.
///
/// Sorts by descending salience, then ascending activation number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    salience: Reverse<i32>,
    activation_number: u64,
}

impl QueueKey {
    /// Creates a queue key.
    #[must_use]
    pub const fn new(salience: i32, activation_number: u64) -> Self {
        Self {
            salience: Reverse(salience),
            activation_number,
        }
    }

    /// Salience component.
    #[must_use]
    pub const fn salience(&self) -> i32 {
        self.salience.0
    }

    /// Activation number component.
    #[must_use]
    pub const fn activation_number(&self) -> u64 {
        self.activation_number
    }
}

// =============================================================================
// Agenda Group
// =============================================================================

/// A named scheduling partition.
#[derive(Clone, Debug)]
pub struct AgendaGroup {
    id: AgendaGroupId,
    name: Arc<str>,
    queue: BTreeMap<QueueKey, TupleId>,
    active: bool,
    activated_for_recency: Recency,
    cleared_for_recency: Recency,
    auto_focus_activator: Option<Arc<PropagationContext>>,
}

impl AgendaGroup {
    /// Creates an inactive, never-cleared group.
    #[must_use]
    pub fn new(id: AgendaGroupId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            queue: BTreeMap::new(),
            active: false,
            activated_for_recency: 0,
            cleared_for_recency: NEVER_CLEARED,
            auto_focus_activator: None,
        }
    }

    /// Group id.
    #[must_use]
    pub fn id(&self) -> AgendaGroupId {
        self.id
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of queued activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the group currently has focus.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fact recency at the moment the group last took focus.
    #[must_use]
    pub fn activated_for_recency(&self) -> Recency {
        self.activated_for_recency
    }

    /// Fact recency at the moment the group was last cleared, or
    /// [`NEVER_CLEARED`].
    #[must_use]
    pub fn cleared_for_recency(&self) -> Recency {
        self.cleared_for_recency
    }

    /// Context whose auto-focus request last activated this group.
    #[must_use]
    pub fn auto_focus_activator(&self) -> Option<&Arc<PropagationContext>> {
        self.auto_focus_activator.as_ref()
    }

    /// Records the context whose auto-focus request activates this group.
    pub fn set_auto_focus_activator(&mut self, context: Option<Arc<PropagationContext>>) {
        self.auto_focus_activator = context;
    }

    /// Queued activations in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (QueueKey, TupleId)> + '_ {
        self.queue.iter().map(|(key, id)| (*key, *id))
    }

    /// Gives the group focus as of `recency`.
    pub fn activate(&mut self, recency: Recency) {
        self.active = true;
        self.activated_for_recency = recency;
    }

    /// Takes focus away from the group.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Records that the group was cleared at `recency`.
    pub fn mark_cleared(&mut self, recency: Recency) {
        self.cleared_for_recency = recency;
    }

    /// Lock-on-active decision for a match triggered by `context`.
    ///
    /// While the group is active, matches triggered by facts newer than the
    /// activation are suppressed unless they come from the very propagation
    /// that auto-focused the group. Otherwise matches at or below the
    /// cleared watermark are suppressed. Rule addition is never suppressed.
    #[must_use]
    pub fn is_suppressed(&self, context: &Arc<PropagationContext>) -> bool {
        if context.kind == PropagationType::RuleAddition {
            return false;
        }
        let recency = context.recency;
        let activator = self
            .auto_focus_activator
            .as_ref()
            .is_some_and(|activator| Arc::ptr_eq(activator, context));
        if self.active && self.activated_for_recency < recency && !activator {
            return true;
        }
        self.cleared_for_recency != NEVER_CLEARED && self.cleared_for_recency >= recency
    }

    fn insert(&mut self, key: QueueKey, tuple: TupleId) -> Result<()> {
        match self.queue.entry(key) {
            Entry::Occupied(held) => Err(Error::structural(
                tuple,
                "enqueue",
                format!("queue key {key:?} already held by {:?}", held.get()),
            )),
            Entry::Vacant(slot) => {
                slot.insert(tuple);
                Ok(())
            }
        }
    }

    fn remove(&mut self, key: QueueKey, tuple: TupleId) -> bool {
        match self.queue.get(&key) {
            Some(held) if *held == tuple => {
                self.queue.remove(&key);
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Agenda
// =============================================================================

/// Result of one selection step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// Groups popped off the focus stack because they ran empty.
    pub popped: Vec<AgendaGroupId>,
    /// Group that was (re)activated by the selection, if it was inactive.
    pub activated: Option<AgendaGroupId>,
    /// The activation to fire next.
    pub next: Option<(AgendaGroupId, TupleId)>,
}

/// Agenda groups and the focus stack.
#[derive(Clone, Debug)]
pub struct Agenda {
    groups: Vec<AgendaGroup>,
    by_name: HashMap<Arc<str>, AgendaGroupId>,
    focus_stack: Vec<AgendaGroupId>,
    next_activation_number: u64,
}

impl Default for Agenda {
    fn default() -> Self {
        Self::new()
    }
}

impl Agenda {
    /// Creates an agenda holding only `MAIN`, which is on the focus stack.
    #[must_use]
    pub fn new() -> Self {
        let main: Arc<str> = Arc::from(MAIN_GROUP);
        let mut by_name = HashMap::new();
        by_name.insert(main.clone(), AgendaGroupId::MAIN);
        Self {
            groups: vec![AgendaGroup::new(AgendaGroupId::MAIN, main)],
            by_name,
            focus_stack: vec![AgendaGroupId::MAIN],
            next_activation_number: 0,
        }
    }

    /// Id of the group called `name`, creating it if needed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn group_id(&mut self, name: &str) -> AgendaGroupId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = AgendaGroupId(self.groups.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.groups.push(AgendaGroup::new(id, name.clone()));
        self.by_name.insert(name, id);
        id
    }

    /// Id of the group called `name`, if it exists.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<AgendaGroupId> {
        self.by_name.get(name).copied()
    }

    /// Borrows a group.
    #[must_use]
    pub fn group(&self, id: AgendaGroupId) -> Option<&AgendaGroup> {
        self.groups.get(id.0 as usize)
    }

    /// Mutably borrows a group.
    pub fn group_mut(&mut self, id: AgendaGroupId) -> Option<&mut AgendaGroup> {
        self.groups.get_mut(id.0 as usize)
    }

    /// Every group, in creation order.
    pub fn groups(&self) -> impl Iterator<Item = &AgendaGroup> + '_ {
        self.groups.iter()
    }

    /// Group currently on top of the focus stack.
    #[must_use]
    pub fn focus(&self) -> AgendaGroupId {
        self.focus_stack
            .last()
            .copied()
            .unwrap_or(AgendaGroupId::MAIN)
    }

    /// Focus stack, bottom to top.
    #[must_use]
    pub fn focus_stack(&self) -> &[AgendaGroupId] {
        &self.focus_stack
    }

    /// Group names on the focus stack, bottom to top.
    #[must_use]
    pub fn focus_stack_names(&self) -> Vec<&str> {
        self.focus_stack
            .iter()
            .filter_map(|id| self.group(*id).map(AgendaGroup::name))
            .collect()
    }

    /// Pushes `id` onto the focus stack unless it already has focus.
    ///
    /// The previous top loses focus; `id` gains it as of `recency`.
    /// Returns true if the stack changed.
    pub fn set_focus(&mut self, id: AgendaGroupId, recency: Recency) -> bool {
        let top = self.focus();
        if top == id || self.group(id).is_none() {
            return false;
        }
        if let Some(group) = self.group_mut(top) {
            group.deactivate();
        }
        self.focus_stack.push(id);
        if let Some(group) = self.group_mut(id) {
            group.activate(recency);
        }
        trace!(group = ?id, recency, "focus pushed");
        true
    }

    /// Hands out the next activation number.
    pub fn next_activation_number(&mut self) -> u64 {
        self.next_activation_number += 1;
        self.next_activation_number
    }

    /// Queues `tuple` in `group` under `key`.
    ///
    /// # Errors
    /// Returns `Structural` if the group is unknown or the key is taken.
    pub fn enqueue(&mut self, group: AgendaGroupId, key: QueueKey, tuple: TupleId) -> Result<()> {
        self.group_mut(group)
            .ok_or_else(|| Error::structural(tuple, "enqueue", format!("unknown {group:?}")))?
            .insert(key, tuple)
    }

    /// Removes `tuple` queued under `key`. Returns false if it was not there.
    pub fn dequeue(&mut self, group: AgendaGroupId, key: QueueKey, tuple: TupleId) -> bool {
        self.group_mut(group)
            .is_some_and(|g| g.remove(key, tuple))
    }

    /// Empties `group`, recording `recency` as its cleared watermark.
    ///
    /// Returns the removed activations in firing order.
    pub fn clear_group(&mut self, group: AgendaGroupId, recency: Recency) -> Vec<TupleId> {
        let Some(group) = self.group_mut(group) else {
            return Vec::new();
        };
        group.mark_cleared(recency);
        std::mem::take(&mut group.queue).into_values().collect()
    }

    /// Total queued activations across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(AgendaGroup::len).sum()
    }

    /// Returns true if no group holds an activation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(AgendaGroup::is_empty)
    }

    /// The activation `select` would return, without changing anything.
    #[must_use]
    pub fn peek(&self) -> Option<(AgendaGroupId, TupleId)> {
        self.focus_stack.iter().rev().find_map(|id| {
            self.group(*id)
                .and_then(|g| g.queue.values().next().map(|tuple| (*id, *tuple)))
        })
    }

    /// Picks and dequeues the next activation to fire.
    ///
    /// Empty groups above `MAIN` are popped, losing focus and recording
    /// `recency` as their cleared watermark. The group that ends up on top
    /// is activated as of `recency` if it was not already active.
    pub fn select(&mut self, recency: Recency) -> Selection {
        let mut selection = Selection::default();
        loop {
            let top = self.focus();
            let empty = self.group(top).is_none_or(AgendaGroup::is_empty);
            if empty && self.focus_stack.len() > 1 {
                self.focus_stack.pop();
                if let Some(group) = self.group_mut(top) {
                    group.deactivate();
                    group.mark_cleared(recency);
                }
                trace!(group = ?top, recency, "focus popped");
                selection.popped.push(top);
                continue;
            }
            if empty {
                return selection;
            }
            let Some(group) = self.group_mut(top) else {
                return selection;
            };
            if !group.active {
                group.activate(recency);
                selection.activated = Some(top);
            }
            selection.next = group.queue.pop_first().map(|(_, tuple)| (top, tuple));
            return selection;
        }
    }
}
