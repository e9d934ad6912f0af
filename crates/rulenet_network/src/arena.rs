//! Generational slot arena for tuples.
//!
//! The `TupleArena` owns every live tuple of a session. Freed slots go on a
//! free list and their generation is bumped, so any [`TupleId`] that outlives
//! its tuple is rejected instead of aliasing the slot's next occupant.

use rulenet_foundation::{Error, Result, TupleId};

use crate::tuple::Tuple;

#[derive(Clone, Debug)]
struct Slot {
    /// Even generations are free, odd generations are alive.
    generation: u32,
    tuple: Option<Tuple>,
}

/// Slot storage for tuples with stale-reference detection.
#[derive(Clone, Debug, Default)]
pub struct TupleArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live_count: usize,
}

impl TupleArena {
    /// Creates a new empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tuple, returning its id.
    ///
    /// Reuses indices from the free list when available.
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc(&mut self, tuple: Tuple) -> TupleId {
        self.live_count += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.tuple = Some(tuple);
            TupleId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 1,
                tuple: Some(tuple),
            });
            TupleId::new(index, 1)
        }
    }

    /// Removes a tuple and returns it.
    ///
    /// The caller must have unlinked it from every chain, memory and
    /// staging list first; a still-linked tuple is a structural fault.
    ///
    /// # Errors
    /// Returns `StaleTuple` for unknown or freed ids, `Structural` if the
    /// tuple is still linked somewhere.
    pub fn free(&mut self, id: TupleId) -> Result<Tuple> {
        let tuple = self.get(id)?;
        if tuple.left.owner.is_some()
            || tuple.right.owner.is_some()
            || tuple.staging.stage.is_some()
            || tuple.memory.is_some()
        {
            return Err(Error::structural(id, "free", "tuple is still linked"));
        }

        let slot = &mut self.slots[id.index as usize];
        slot.generation += 1;
        self.free_list.push(id.index);
        self.live_count -= 1;
        slot.tuple
            .take()
            .ok_or_else(|| Error::stale_tuple(id))
    }

    /// Checks if a tuple id refers to a live tuple.
    #[must_use]
    pub fn contains(&self, id: TupleId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.tuple.is_some())
    }

    /// Borrows a live tuple.
    ///
    /// # Errors
    /// Returns `StaleTuple` if the id is unknown, freed, or from an older
    /// generation.
    pub fn get(&self, id: TupleId) -> Result<&Tuple> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.tuple.as_ref().ok_or_else(|| Error::stale_tuple(id))
            }
            _ => Err(Error::stale_tuple(id)),
        }
    }

    /// Mutably borrows a live tuple.
    ///
    /// # Errors
    /// Returns `StaleTuple` if the id is unknown, freed, or from an older
    /// generation.
    pub fn get_mut(&mut self, id: TupleId) -> Result<&mut Tuple> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.tuple.as_mut().ok_or_else(|| Error::stale_tuple(id))
            }
            _ => Err(Error::stale_tuple(id)),
        }
    }

    /// Returns the number of live tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live tuples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over all live tuples in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (TupleId, &Tuple)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.tuple
                .as_ref()
                .map(|t| (TupleId::new(idx as u32, slot.generation), t))
        })
    }
}
