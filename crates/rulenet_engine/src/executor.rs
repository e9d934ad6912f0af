//! Per-rule terminal staging and agenda hand-off.

use rulenet_foundation::{AgendaGroupId, Error, Result, TupleId};
use rulenet_network::{NodeId, StagedTuples, TupleArena};

use crate::agenda::{Agenda, QueueKey};

/// Terminal side of one rule: staged matches and where they get queued.
#[derive(Clone, Debug)]
pub struct RuleExecutor {
    node: NodeId,
    agenda_group: AgendaGroupId,
    declarative_agenda: bool,
    staged: StagedTuples,
}

impl RuleExecutor {
    /// Creates an executor for the terminal node `node`.
    #[must_use]
    pub fn new(node: NodeId, agenda_group: AgendaGroupId, declarative_agenda: bool) -> Self {
        Self {
            node,
            agenda_group,
            declarative_agenda,
            staged: StagedTuples::new(),
        }
    }

    /// Terminal node id.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Agenda group the rule schedules into.
    #[must_use]
    pub fn agenda_group(&self) -> AgendaGroupId {
        self.agenda_group
    }

    /// Whether matches are materialised as facts.
    #[must_use]
    pub fn declarative_agenda_enabled(&self) -> bool {
        self.declarative_agenda
    }

    /// Terminal tuples awaiting insert/update/delete handling.
    #[must_use]
    pub fn staged(&self) -> &StagedTuples {
        &self.staged
    }

    /// Mutable staging lists.
    pub fn staged_mut(&mut self) -> &mut StagedTuples {
        &mut self.staged
    }

    /// Queues a terminal tuple under its current salience and number.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is already queued, `Unsupported` if
    /// it is not a terminal tuple.
    pub fn add_tuple(
        &self,
        agenda: &mut Agenda,
        tuples: &mut TupleArena,
        id: TupleId,
    ) -> Result<()> {
        let activation = tuples.get_mut(id)?.activation_mut()?;
        if activation.queued {
            return Err(Error::structural(id, "add tuple", "activation already queued"));
        }
        let key = QueueKey::new(activation.salience, activation.activation_number);
        agenda.enqueue(self.agenda_group, key, id)?;
        activation.queued = true;
        Ok(())
    }

    /// Dequeues a terminal tuple. Returns false if it was not queued.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple claims to be queued but the agenda
    /// does not hold it.
    pub fn remove_tuple(
        &self,
        agenda: &mut Agenda,
        tuples: &mut TupleArena,
        id: TupleId,
    ) -> Result<bool> {
        let activation = tuples.get_mut(id)?.activation_mut()?;
        if !activation.queued {
            return Ok(false);
        }
        let key = QueueKey::new(activation.salience, activation.activation_number);
        if !agenda.dequeue(self.agenda_group, key, id) {
            return Err(Error::structural(
                id,
                "remove tuple",
                "queued activation missing from agenda",
            ));
        }
        activation.queued = false;
        Ok(true)
    }

    /// Re-keys a queued tuple after its salience changed, keeping its number.
    ///
    /// # Errors
    /// Propagates [`remove_tuple`](Self::remove_tuple) and
    /// [`add_tuple`](Self::add_tuple) faults.
    pub fn requeue(
        &self,
        agenda: &mut Agenda,
        tuples: &mut TupleArena,
        id: TupleId,
        salience: i32,
    ) -> Result<()> {
        self.remove_tuple(agenda, tuples, id)?;
        tuples.get_mut(id)?.activation_mut()?.salience = salience;
        self.add_tuple(agenda, tuples, id)
    }
}
