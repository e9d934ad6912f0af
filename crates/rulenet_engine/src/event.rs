//! Agenda event notifications.
//!
//! Listeners observe the activation lifecycle: creation, cancellation,
//! firing, and focus stack changes. They are called synchronously from the
//! session while it holds `&mut self`, so they see events in exactly the
//! order the engine produced them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rulenet_foundation::{FactId, TupleId};

/// Why an activation left the agenda without firing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// Suppressed by lock-on-active.
    Filter,
    /// The underlying match was deleted.
    Retracted,
    /// Its agenda group was cleared.
    Clear,
    /// A declarative-agenda meta-rule blocked it.
    Blocked,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Filter => "filter",
            Self::Retracted => "retracted",
            Self::Clear => "clear",
            Self::Blocked => "blocked",
        };
        f.write_str(name)
    }
}

/// Snapshot of an activation at the moment of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchEvent {
    /// Name of the rule that matched.
    pub rule: Arc<str>,
    /// Terminal tuple of the match.
    pub tuple: TupleId,
    /// Bound facts, in pattern order.
    pub facts: Vec<FactId>,
    /// Salience at the time of the event.
    pub salience: i32,
    /// Activation number at the time of the event.
    pub activation_number: u64,
}

/// Receives agenda notifications. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait AgendaEventListener: Send {
    /// A match was created or re-queued.
    fn activation_created(&mut self, event: &MatchEvent) {}

    /// A match was removed from the agenda, or suppressed on creation.
    fn activation_cancelled(&mut self, event: &MatchEvent, reason: CancelReason) {}

    /// A consequence is about to run.
    fn before_activation_fired(&mut self, event: &MatchEvent) {}

    /// A consequence finished successfully.
    fn after_activation_fired(&mut self, event: &MatchEvent) {}

    /// An agenda group was pushed onto the focus stack.
    fn agenda_group_pushed(&mut self, group: &str) {}

    /// An agenda group was popped off the focus stack.
    fn agenda_group_popped(&mut self, group: &str) {}
}

// =============================================================================
// Recording
// =============================================================================

/// One recorded notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgendaEvent {
    /// See [`AgendaEventListener::activation_created`].
    Created(MatchEvent),
    /// See [`AgendaEventListener::activation_cancelled`].
    Cancelled(MatchEvent, CancelReason),
    /// See [`AgendaEventListener::before_activation_fired`].
    BeforeFired(MatchEvent),
    /// See [`AgendaEventListener::after_activation_fired`].
    AfterFired(MatchEvent),
    /// See [`AgendaEventListener::agenda_group_pushed`].
    GroupPushed(String),
    /// See [`AgendaEventListener::agenda_group_popped`].
    GroupPopped(String),
}

/// A listener that records every event into a shared log.
///
/// Clones share the same log, so one clone can be handed to a session while
/// another is kept for inspection.
#[derive(Clone, Debug, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<AgendaEvent>>>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: AgendaEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copies out everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<AgendaEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rule names of fired activations, in firing order.
    #[must_use]
    pub fn fired(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AgendaEvent::AfterFired(m) => Some(m.rule.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Cancellations with their reasons, in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<(String, CancelReason)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                AgendaEvent::Cancelled(m, reason) => Some((m.rule.to_string(), reason)),
                _ => None,
            })
            .collect()
    }

    /// Discards everything recorded so far.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AgendaEventListener for EventRecorder {
    fn activation_created(&mut self, event: &MatchEvent) {
        self.push(AgendaEvent::Created(event.clone()));
    }

    fn activation_cancelled(&mut self, event: &MatchEvent, reason: CancelReason) {
        self.push(AgendaEvent::Cancelled(event.clone(), reason));
    }

    fn before_activation_fired(&mut self, event: &MatchEvent) {
        self.push(AgendaEvent::BeforeFired(event.clone()));
    }

    fn after_activation_fired(&mut self, event: &MatchEvent) {
        self.push(AgendaEvent::AfterFired(event.clone()));
    }

    fn agenda_group_pushed(&mut self, group: &str) {
        self.push(AgendaEvent::GroupPushed(group.to_string()));
    }

    fn agenda_group_popped(&mut self, group: &str) {
        self.push(AgendaEvent::GroupPopped(group.to_string()));
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// The session's registered listeners.
#[derive(Default)]
pub(crate) struct EventSupport {
    listeners: Vec<Box<dyn AgendaEventListener>>,
}

impl EventSupport {
    pub(crate) fn add(&mut self, listener: Box<dyn AgendaEventListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub(crate) fn created(&mut self, event: &MatchEvent) {
        for listener in &mut self.listeners {
            listener.activation_created(event);
        }
    }

    pub(crate) fn cancelled(&mut self, event: &MatchEvent, reason: CancelReason) {
        for listener in &mut self.listeners {
            listener.activation_cancelled(event, reason);
        }
    }

    pub(crate) fn before_fired(&mut self, event: &MatchEvent) {
        for listener in &mut self.listeners {
            listener.before_activation_fired(event);
        }
    }

    pub(crate) fn after_fired(&mut self, event: &MatchEvent) {
        for listener in &mut self.listeners {
            listener.after_activation_fired(event);
        }
    }

    pub(crate) fn pushed(&mut self, group: &str) {
        for listener in &mut self.listeners {
            listener.agenda_group_pushed(group);
        }
    }

    pub(crate) fn popped(&mut self, group: &str) {
        for listener in &mut self.listeners {
            listener.agenda_group_popped(group);
        }
    }
}

impl fmt::Debug for EventSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSupport")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
