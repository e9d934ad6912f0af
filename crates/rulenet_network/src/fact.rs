//! Fact handle lifecycle with generational indices and recency.
//!
//! The `FactStore` is working memory's identity table: it hands out stable
//! [`FactId`]s, stamps every insert and update with a fresh recency, and
//! owns the head/tail of the tuple chains rooted at each handle.

use rulenet_foundation::{Error, FactId, Recency, Result, TupleId, Value};

use crate::tuple::ChainEnds;

/// An inserted object and its bookkeeping.
#[derive(Clone, Debug)]
pub struct FactHandle {
    id: FactId,
    recency: Recency,
    value: Value,
    /// Root left tuples created from this fact.
    pub(crate) left_tuples: ChainEnds,
    /// Right tuples created from this fact.
    pub(crate) right_tuples: ChainEnds,
}

impl FactHandle {
    /// Identity of this handle.
    #[must_use]
    pub fn id(&self) -> FactId {
        self.id
    }

    /// Recency stamped by the last insert or update.
    #[must_use]
    pub fn recency(&self) -> Recency {
        self.recency
    }

    /// The object.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// First root left tuple.
    #[must_use]
    pub fn first_left_tuple(&self) -> Option<TupleId> {
        self.left_tuples.first
    }

    /// First right tuple.
    #[must_use]
    pub fn first_right_tuple(&self) -> Option<TupleId> {
        self.right_tuples.first
    }
}

#[derive(Clone, Debug)]
struct FactSlot {
    /// Even generations are free, odd generations are alive.
    generation: u32,
    handle: Option<FactHandle>,
}

/// Manages fact handle allocation, recency, and generation tracking.
#[derive(Clone, Debug, Default)]
pub struct FactStore {
    slots: Vec<FactSlot>,
    free_list: Vec<u32>,
    live_count: usize,
    /// Last recency handed out; `0` before the first insert.
    recency: Recency,
}

impl FactStore {
    /// Creates a new empty fact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning its new handle id.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, value: Value) -> FactId {
        self.live_count += 1;
        self.recency += 1;

        let id = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            FactId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(FactSlot {
                generation: 1,
                handle: None,
            });
            FactId::new(index, 1)
        };

        self.slots[id.index as usize].handle = Some(FactHandle {
            id,
            recency: self.recency,
            value,
            left_tuples: ChainEnds::default(),
            right_tuples: ChainEnds::default(),
        });
        id
    }

    /// Replaces the value of a fact and stamps a new recency.
    ///
    /// # Errors
    /// Returns an error if the fact is stale or never existed.
    pub fn update(&mut self, id: FactId, value: Value) -> Result<Recency> {
        self.validate(id)?;
        self.recency += 1;
        let recency = self.recency;
        let handle = self.get_mut(id)?;
        handle.value = value;
        handle.recency = recency;
        Ok(recency)
    }

    /// Removes a fact, returning its handle.
    ///
    /// Every tuple rooted at the handle must already be detached.
    ///
    /// # Errors
    /// Returns an error if the fact is stale or never existed, or
    /// `Structural` if tuples are still attached to it.
    pub fn remove(&mut self, id: FactId) -> Result<FactHandle> {
        let handle = self.get(id)?;
        if let Some(tuple) = handle.left_tuples.first.or(handle.right_tuples.first) {
            return Err(Error::structural(
                tuple,
                "remove fact",
                format!("{id:?} still owns tuples"),
            ));
        }
        let slot = &mut self.slots[id.index as usize];
        slot.generation += 1;
        self.free_list.push(id.index);
        self.live_count -= 1;
        slot.handle.take().ok_or_else(|| Error::fact_not_found(id))
    }

    /// Validates that a fact is live.
    ///
    /// # Errors
    /// Returns `FactNotFound` for unknown or freed slots, `StaleFact` on a
    /// generation mismatch.
    pub fn validate(&self, id: FactId) -> Result<()> {
        let Some(slot) = self.slots.get(id.index as usize) else {
            return Err(Error::fact_not_found(id));
        };
        if slot.generation != id.generation {
            return Err(Error::stale_fact(id));
        }
        if slot.handle.is_none() {
            return Err(Error::fact_not_found(id));
        }
        Ok(())
    }

    /// Checks if a fact exists and is not stale.
    #[must_use]
    pub fn exists(&self, id: FactId) -> bool {
        self.validate(id).is_ok()
    }

    /// Borrows a live fact handle.
    ///
    /// # Errors
    /// Returns an error if the fact is stale or never existed.
    pub fn get(&self, id: FactId) -> Result<&FactHandle> {
        self.validate(id)?;
        self.slots[id.index as usize]
            .handle
            .as_ref()
            .ok_or_else(|| Error::fact_not_found(id))
    }

    pub(crate) fn get_mut(&mut self, id: FactId) -> Result<&mut FactHandle> {
        self.validate(id)?;
        self.slots[id.index as usize]
            .handle
            .as_mut()
            .ok_or_else(|| Error::fact_not_found(id))
    }

    /// Borrows the value of a live fact.
    ///
    /// # Errors
    /// Returns an error if the fact is stale or never existed.
    pub fn value(&self, id: FactId) -> Result<&Value> {
        self.get(id).map(FactHandle::value)
    }

    /// The most recently assigned recency.
    #[must_use]
    pub fn current_recency(&self) -> Recency {
        self.recency
    }

    /// Returns the total number of live facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if there are no live facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over all live fact handles in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &FactHandle> + '_ {
        self.slots.iter().filter_map(|slot| slot.handle.as_ref())
    }
}
