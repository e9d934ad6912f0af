//! Hash-bucketed tuple memory.
//!
//! A `TupleMemory` is an array of buckets, each an intrusive doubly linked
//! list of tuples threaded through the arena. The bucket is chosen from a
//! join-key hash computed by the caller; whoever places tuples must use the
//! same hash (and the same equality) when probing for join candidates.

use rulenet_foundation::{Error, Result, TupleId};

use crate::arena::TupleArena;
use crate::tuple::MemoryLink;

/// Identity of a memory, used to reject removals from the wrong memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemoryId(pub u32);

#[derive(Copy, Clone, Debug, Default)]
struct Bucket {
    first: Option<TupleId>,
    last: Option<TupleId>,
    len: usize,
}

/// Hash-indexed tuple storage with O(1) add and remove.
#[derive(Clone, Debug)]
pub struct TupleMemory {
    id: MemoryId,
    buckets: Vec<Bucket>,
    len: usize,
}

impl TupleMemory {
    /// Default number of buckets for a new memory.
    pub const DEFAULT_CAPACITY: usize = 16;

    /// Creates a memory with the default bucket count.
    #[must_use]
    pub fn new(id: MemoryId) -> Self {
        Self::with_capacity(id, Self::DEFAULT_CAPACITY)
    }

    /// Creates a memory with `capacity` buckets (at least one).
    #[must_use]
    pub fn with_capacity(id: MemoryId, capacity: usize) -> Self {
        Self {
            id,
            buckets: vec![Bucket::default(); capacity.max(1)],
            len: 0,
        }
    }

    /// This memory's identity.
    #[must_use]
    pub fn id(&self) -> MemoryId {
        self.id
    }

    /// Number of buckets.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of tuples stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no tuples are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket a hash maps to.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Number of tuples in the bucket at `index`.
    #[must_use]
    pub fn bucket_len(&self, index: usize) -> usize {
        self.buckets.get(index).map_or(0, |b| b.len)
    }

    /// Tuples sharing `hash`'s bucket, in insertion order.
    ///
    /// Other keys may share the bucket; callers must still test equality.
    pub fn bucket<'a>(&self, arena: &'a TupleArena, hash: u64) -> BucketIter<'a> {
        BucketIter {
            arena,
            cursor: self.buckets[self.bucket_index(hash)].first,
        }
    }

    /// Appends `id` to the bucket for `hash`.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple already belongs to a memory.
    pub fn add(&mut self, arena: &mut TupleArena, id: TupleId, hash: u64) -> Result<()> {
        if arena.get(id)?.memory.is_some() {
            return Err(Error::structural(id, "memory add", "tuple already in a memory"));
        }
        let bucket = self.bucket_index(hash);
        self.link_tail(arena, id, bucket, hash)?;
        self.len += 1;
        Ok(())
    }

    fn link_tail(
        &mut self,
        arena: &mut TupleArena,
        id: TupleId,
        bucket: usize,
        hash: u64,
    ) -> Result<()> {
        let last = self.buckets[bucket].last;
        if let Some(last) = last {
            arena
                .get_mut(last)?
                .memory
                .as_mut()
                .ok_or_else(|| Error::structural(id, "memory add", "bucket tail is unlinked"))?
                .next = Some(id);
        } else {
            self.buckets[bucket].first = Some(id);
        }
        self.buckets[bucket].last = Some(id);
        self.buckets[bucket].len += 1;
        arena.get_mut(id)?.memory = Some(MemoryLink {
            memory: self.id,
            bucket,
            hash,
            prev: last,
            next: None,
        });
        Ok(())
    }

    /// Unlinks `id` from its bucket using its stored links.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is not in this memory or its bucket
    /// neighbours are inconsistent.
    pub fn remove(&mut self, arena: &mut TupleArena, id: TupleId) -> Result<()> {
        let link = match arena.get(id)?.memory {
            Some(link) if link.memory == self.id => link,
            Some(_) => {
                return Err(Error::structural(id, "memory remove", "tuple is in another memory"));
            }
            None => return Err(Error::structural(id, "memory remove", "tuple is not in a memory")),
        };

        match link.prev {
            Some(prev) => Self::neighbour(arena, prev, id)?.next = link.next,
            None => self.buckets[link.bucket].first = link.next,
        }
        match link.next {
            Some(next) => Self::neighbour(arena, next, id)?.prev = link.prev,
            None => self.buckets[link.bucket].last = link.prev,
        }

        self.buckets[link.bucket].len -= 1;
        self.len -= 1;
        arena.get_mut(id)?.memory = None;
        Ok(())
    }

    fn neighbour(
        arena: &mut TupleArena,
        neighbour: TupleId,
        of: TupleId,
    ) -> Result<&mut MemoryLink> {
        arena
            .get_mut(neighbour)?
            .memory
            .as_mut()
            .ok_or_else(|| Error::structural(of, "memory remove", "bucket neighbour is unlinked"))
    }

    /// Rebuckets every stored tuple into `capacity` buckets.
    ///
    /// Tuples keep their stored hash; relative order within each new bucket
    /// follows the old full-iteration order.
    ///
    /// # Errors
    /// Propagates arena faults.
    pub fn resize(&mut self, arena: &mut TupleArena, capacity: usize) -> Result<()> {
        let view: &TupleArena = arena;
        let tuples: Vec<(TupleId, u64)> = self
            .full_iter(view)
            .map(|id| {
                view.get(id)
                    .map(|t| (id, t.memory.map_or(0, |link| link.hash)))
            })
            .collect::<Result<_>>()?;

        self.buckets = vec![Bucket::default(); capacity.max(1)];
        for (id, hash) in tuples {
            arena.get_mut(id)?.memory = None;
            let bucket = self.bucket_index(hash);
            self.link_tail(arena, id, bucket, hash)?;
        }
        Ok(())
    }

    /// Unlinks every tuple and returns them in full-iteration order.
    ///
    /// # Errors
    /// Propagates arena faults.
    pub fn clear(&mut self, arena: &mut TupleArena) -> Result<Vec<TupleId>> {
        let tuples: Vec<TupleId> = self.full_iter(&*arena).collect();
        for id in &tuples {
            arena.get_mut(*id)?.memory = None;
        }
        self.buckets.iter_mut().for_each(|b| *b = Bucket::default());
        self.len = 0;
        Ok(tuples)
    }

    /// Lazily visits every stored tuple: buckets ascending, insertion order
    /// within a bucket.
    ///
    /// The iterator borrows the arena, so it can be restarted at any time by
    /// calling this again.
    pub fn full_iter<'a>(&'a self, arena: &'a TupleArena) -> FullIter<'a> {
        FullIter {
            memory: self,
            arena,
            next_bucket: 0,
            cursor: None,
        }
    }
}

/// Iterator over one bucket.
pub struct BucketIter<'a> {
    arena: &'a TupleArena,
    cursor: Option<TupleId>,
}

impl Iterator for BucketIter<'_> {
    type Item = TupleId;

    fn next(&mut self) -> Option<TupleId> {
        let id = self.cursor?;
        self.cursor = self
            .arena
            .get(id)
            .ok()
            .and_then(|t| t.memory)
            .and_then(|link| link.next);
        Some(id)
    }
}

/// Iterator over every tuple in a memory.
pub struct FullIter<'a> {
    memory: &'a TupleMemory,
    arena: &'a TupleArena,
    next_bucket: usize,
    cursor: Option<TupleId>,
}

impl Iterator for FullIter<'_> {
    type Item = TupleId;

    fn next(&mut self) -> Option<TupleId> {
        while self.cursor.is_none() {
            let bucket = self.memory.buckets.get(self.next_bucket)?;
            self.cursor = bucket.first;
            self.next_bucket += 1;
        }
        let id = self.cursor?;
        self.cursor = self
            .arena
            .get(id)
            .ok()
            .and_then(|t| t.memory)
            .and_then(|link| link.next);
        Some(id)
    }
}
