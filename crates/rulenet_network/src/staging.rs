//! Pending insert/update/delete lists.
//!
//! Changes to a node's input are not applied immediately: they are staged in
//! one of three intrusive lists and drained later, deletes first, then
//! updates, then inserts. A tuple sits in at most one staging list at a time,
//! and re-staging collapses to the tuple's net change.

use rulenet_foundation::{Error, Result, TupleId};

use crate::arena::TupleArena;

/// Which staging list a tuple sits in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// New match, not yet seen downstream.
    Insert,
    /// Existing match whose facts changed.
    Update,
    /// Match that is no longer valid.
    Delete,
}

/// Result of staging a change on a tuple.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The tuple was added to (or moved into) the requested list.
    Staged,
    /// The tuple already carries an equivalent pending change.
    AlreadyStaged,
    /// The tuple was a pending insert and has been dropped; the caller owns
    /// it and must free it.
    Discarded,
}

#[derive(Copy, Clone, Debug, Default)]
struct StageList {
    first: Option<TupleId>,
    last: Option<TupleId>,
    len: usize,
}

/// The three staging lists of one node input.
#[derive(Clone, Debug, Default)]
pub struct StagedTuples {
    inserts: StageList,
    updates: StageList,
    deletes: StageList,
}

impl StagedTuples {
    /// Creates empty staging lists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&mut self, stage: Stage) -> &mut StageList {
        match stage {
            Stage::Insert => &mut self.inserts,
            Stage::Update => &mut self.updates,
            Stage::Delete => &mut self.deletes,
        }
    }

    /// Number of tuples staged in `stage`.
    #[must_use]
    pub fn len(&self, stage: Stage) -> usize {
        match stage {
            Stage::Insert => self.inserts.len,
            Stage::Update => self.updates.len,
            Stage::Delete => self.deletes.len,
        }
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.len == 0 && self.updates.len == 0 && self.deletes.len == 0
    }

    fn push(&mut self, arena: &mut TupleArena, id: TupleId, stage: Stage) -> Result<()> {
        let last = self.list(stage).last;
        if let Some(last) = last {
            arena.get_mut(last)?.staging.next = Some(id);
        } else {
            self.list(stage).first = Some(id);
        }
        let list = self.list(stage);
        list.last = Some(id);
        list.len += 1;

        let links = &mut arena.get_mut(id)?.staging;
        links.stage = Some(stage);
        links.prev = last;
        links.next = None;
        Ok(())
    }

    /// Removes `id` from whichever list it is staged in.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is not staged.
    pub fn unstage(&mut self, arena: &mut TupleArena, id: TupleId) -> Result<Stage> {
        let links = arena.get(id)?.staging;
        let Some(stage) = links.stage else {
            return Err(Error::structural(id, "unstage", "tuple is not staged"));
        };

        match links.prev {
            Some(prev) => arena.get_mut(prev)?.staging.next = links.next,
            None => self.list(stage).first = links.next,
        }
        match links.next {
            Some(next) => arena.get_mut(next)?.staging.prev = links.prev,
            None => self.list(stage).last = links.prev,
        }
        self.list(stage).len -= 1;
        arena.get_mut(id)?.staging = crate::tuple::StageLinks::default();
        Ok(stage)
    }

    /// Stages a new tuple for insertion.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is already staged.
    pub fn stage_insert(&mut self, arena: &mut TupleArena, id: TupleId) -> Result<()> {
        if let Some(stage) = arena.get(id)?.staging.stage {
            return Err(Error::structural(
                id,
                "stage insert",
                format!("tuple already staged as {stage:?}"),
            ));
        }
        self.push(arena, id, Stage::Insert)
    }

    /// Stages an update.
    ///
    /// A pending insert or update already covers the change.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is staged for deletion.
    pub fn stage_update(&mut self, arena: &mut TupleArena, id: TupleId) -> Result<StageOutcome> {
        match arena.get(id)?.staging.stage {
            Some(Stage::Insert | Stage::Update) => Ok(StageOutcome::AlreadyStaged),
            Some(Stage::Delete) => Err(Error::structural(
                id,
                "stage update",
                "tuple is staged for deletion",
            )),
            None => {
                self.push(arena, id, Stage::Update)?;
                Ok(StageOutcome::Staged)
            }
        }
    }

    /// Stages a deletion.
    ///
    /// A pending insert is cancelled outright ([`StageOutcome::Discarded`]);
    /// a pending update becomes a delete.
    ///
    /// # Errors
    /// Propagates arena faults.
    pub fn stage_delete(&mut self, arena: &mut TupleArena, id: TupleId) -> Result<StageOutcome> {
        match arena.get(id)?.staging.stage {
            Some(Stage::Insert) => {
                self.unstage(arena, id)?;
                Ok(StageOutcome::Discarded)
            }
            Some(Stage::Update) => {
                self.unstage(arena, id)?;
                self.push(arena, id, Stage::Delete)?;
                Ok(StageOutcome::Staged)
            }
            Some(Stage::Delete) => Ok(StageOutcome::AlreadyStaged),
            None => {
                self.push(arena, id, Stage::Delete)?;
                Ok(StageOutcome::Staged)
            }
        }
    }

    /// Takes the oldest tuple staged in `stage`.
    ///
    /// # Errors
    /// Propagates arena faults.
    pub fn pop(&mut self, arena: &mut TupleArena, stage: Stage) -> Result<Option<TupleId>> {
        match self.list(stage).first {
            Some(id) => {
                self.unstage(arena, id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Tuples staged in `stage`, oldest first.
    ///
    /// # Errors
    /// Propagates arena faults.
    pub fn ids(&self, arena: &TupleArena, stage: Stage) -> Result<Vec<TupleId>> {
        let mut cursor = match stage {
            Stage::Insert => self.inserts.first,
            Stage::Update => self.updates.first,
            Stage::Delete => self.deletes.first,
        };
        let mut out = Vec::new();
        while let Some(id) = cursor {
            out.push(id);
            cursor = arena.get(id)?.staging.next;
        }
        Ok(out)
    }
}
