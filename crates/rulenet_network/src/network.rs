//! Structural maintenance of the tuple graph.
//!
//! Every tuple can sit in two sibling chains: the *left* chain of its left
//! parent (or of its fact handle, for root tuples) and the *right* chain of
//! its right parent (or of its fact handle, for right tuples). Chains are
//! intrusive doubly linked lists threaded through the arena, so attach,
//! detach and move-to-end are all O(1).

use rulenet_foundation::{Error, FactId, Result, TupleId};
use tracing::trace;

use crate::arena::TupleArena;
use crate::fact::FactStore;
use crate::tuple::{ChainEnds, SiblingLinks, Tuple};

/// Which sibling chain an operation applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Chain {
    /// Children through the left input; root tuples of a fact.
    Left,
    /// Children through the right input; right tuples of a fact.
    Right,
}

/// Owner of a sibling chain.
///
/// Root tuples hang off their fact handle rather than a parent tuple; the
/// two owners keep separate head/tail pointers and are never conflated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    /// A fact handle (root and right tuples).
    Fact(FactId),
    /// A parent tuple.
    Tuple(TupleId),
}

/// Working memory identities plus the tuple arena of one session.
#[derive(Clone, Debug, Default)]
pub struct TupleNetwork {
    /// Fact handles.
    pub facts: FactStore,
    /// Tuple storage.
    pub tuples: TupleArena,
}

impl TupleNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tuple and links it at the end of `owner`'s chain.
    ///
    /// # Errors
    /// Propagates attach faults; the tuple is freed again on failure.
    pub fn alloc_attached(&mut self, tuple: Tuple, owner: Owner, chain: Chain) -> Result<TupleId> {
        let id = self.tuples.alloc(tuple);
        if let Err(err) = self.attach(id, owner, chain, None) {
            self.tuples.free(id)?;
            return Err(err);
        }
        Ok(id)
    }

    // =========================================================================
    // Chain Ends
    // =========================================================================

    fn ends(&self, owner: Owner, chain: Chain) -> Result<ChainEnds> {
        match owner {
            Owner::Fact(fact) => {
                let handle = self.facts.get(fact)?;
                Ok(match chain {
                    Chain::Left => handle.left_tuples,
                    Chain::Right => handle.right_tuples,
                })
            }
            Owner::Tuple(parent) => {
                let parent = self.tuples.get(parent)?;
                Ok(match chain {
                    Chain::Left => parent.children,
                    Chain::Right => parent.right_children,
                })
            }
        }
    }

    fn ends_mut(&mut self, owner: Owner, chain: Chain) -> Result<&mut ChainEnds> {
        match owner {
            Owner::Fact(fact) => {
                let handle = self.facts.get_mut(fact)?;
                Ok(match chain {
                    Chain::Left => &mut handle.left_tuples,
                    Chain::Right => &mut handle.right_tuples,
                })
            }
            Owner::Tuple(parent) => {
                let parent = self.tuples.get_mut(parent)?;
                Ok(match chain {
                    Chain::Left => &mut parent.children,
                    Chain::Right => &mut parent.right_children,
                })
            }
        }
    }

    fn links(&self, id: TupleId, chain: Chain) -> Result<SiblingLinks> {
        let tuple = self.tuples.get(id)?;
        Ok(match chain {
            Chain::Left => tuple.left,
            Chain::Right => tuple.right,
        })
    }

    fn links_mut(&mut self, id: TupleId, chain: Chain) -> Result<&mut SiblingLinks> {
        let tuple = self.tuples.get_mut(id)?;
        Ok(match chain {
            Chain::Left => &mut tuple.left,
            Chain::Right => &mut tuple.right,
        })
    }

    // =========================================================================
    // Attach / Detach
    // =========================================================================

    /// Links `id` into `owner`'s chain.
    ///
    /// Appends at the tail (discovery order) unless `before` names a sibling,
    /// in which case the tuple is spliced in front of it.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is already in this chain kind, or
    /// if `before` is not a member of `owner`'s chain.
    pub fn attach(
        &mut self,
        id: TupleId,
        owner: Owner,
        chain: Chain,
        before: Option<TupleId>,
    ) -> Result<()> {
        if self.links(id, chain)?.owner.is_some() {
            return Err(Error::structural(id, "attach", "tuple already linked"));
        }

        match before {
            None => {
                let ends = self.ends(owner, chain)?;
                if let Some(last) = ends.last {
                    self.links_mut(last, chain)?.next = Some(id);
                } else {
                    self.ends_mut(owner, chain)?.first = Some(id);
                }
                self.ends_mut(owner, chain)?.last = Some(id);
                *self.links_mut(id, chain)? = SiblingLinks {
                    owner: Some(owner),
                    prev: ends.last,
                    next: None,
                };
            }
            Some(sibling) => {
                let sibling_links = self.links(sibling, chain)?;
                if sibling_links.owner != Some(owner) {
                    return Err(Error::structural(
                        id,
                        "attach",
                        format!("{sibling:?} is not a sibling under {owner:?}"),
                    ));
                }
                if let Some(prev) = sibling_links.prev {
                    self.links_mut(prev, chain)?.next = Some(id);
                } else {
                    self.ends_mut(owner, chain)?.first = Some(id);
                }
                self.links_mut(sibling, chain)?.prev = Some(id);
                *self.links_mut(id, chain)? = SiblingLinks {
                    owner: Some(owner),
                    prev: sibling_links.prev,
                    next: Some(sibling),
                };
            }
        }
        Ok(())
    }

    /// Unlinks `id` from its chain in O(1).
    ///
    /// Handles the middle, head, tail and singleton cases; for root tuples
    /// the head/tail being fixed are the fact handle's own.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is not linked, or if a neighbour's
    /// back-pointer disagrees with the tuple's own links.
    pub fn detach(&mut self, id: TupleId, chain: Chain) -> Result<()> {
        let links = self.links(id, chain)?;
        let Some(owner) = links.owner else {
            return Err(Error::structural(id, "detach", "tuple is not linked"));
        };

        match links.prev {
            Some(prev) => {
                let prev_links = self.links_mut(prev, chain)?;
                if prev_links.next != Some(id) {
                    return Err(Error::structural(id, "detach", "prev sibling does not point back"));
                }
                prev_links.next = links.next;
            }
            None => {
                let ends = self.ends_mut(owner, chain)?;
                if ends.first != Some(id) {
                    return Err(Error::structural(id, "detach", "owner head does not match"));
                }
                ends.first = links.next;
            }
        }

        match links.next {
            Some(next) => {
                let next_links = self.links_mut(next, chain)?;
                if next_links.prev != Some(id) {
                    return Err(Error::structural(id, "detach", "next sibling does not point back"));
                }
                next_links.prev = links.prev;
            }
            None => {
                let ends = self.ends_mut(owner, chain)?;
                if ends.last != Some(id) {
                    return Err(Error::structural(id, "detach", "owner tail does not match"));
                }
                ends.last = links.prev;
            }
        }

        *self.links_mut(id, chain)? = SiblingLinks::default();
        trace!(?id, ?owner, ?chain, "detached tuple");
        Ok(())
    }

    /// Re-splices `id` to the tail of its own chain.
    ///
    /// # Errors
    /// Returns `Structural` if the tuple is not linked.
    pub fn move_to_end(&mut self, id: TupleId, chain: Chain) -> Result<()> {
        let links = self.links(id, chain)?;
        let Some(owner) = links.owner else {
            return Err(Error::structural(id, "move_to_end", "tuple is not linked"));
        };
        if links.next.is_none() {
            return Ok(());
        }
        self.detach(id, chain)?;
        self.attach(id, owner, chain, None)
    }

    /// Unlinks `id` from whichever of its chains it is still part of.
    ///
    /// Clears the chain parent too, so a detached tuple never points at a
    /// parent that may be freed before it.
    ///
    /// # Errors
    /// Propagates detach faults.
    pub fn unlink(&mut self, id: TupleId) -> Result<()> {
        for chain in [Chain::Left, Chain::Right] {
            if self.links(id, chain)?.owner.is_some() {
                self.detach(id, chain)?;
            }
        }
        self.tuples.get_mut(id)?.parent = None;
        Ok(())
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Members of `owner`'s chain, head to tail.
    ///
    /// # Errors
    /// Returns an error if the owner is stale or a link is broken.
    pub fn children(&self, owner: Owner, chain: Chain) -> Result<Vec<TupleId>> {
        let mut out = Vec::new();
        let mut cursor = self.ends(owner, chain)?.first;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.links(id, chain)?.next;
        }
        Ok(out)
    }

    /// Members of `owner`'s chain, tail to head.
    ///
    /// # Errors
    /// Returns an error if the owner is stale or a link is broken.
    pub fn children_rev(&self, owner: Owner, chain: Chain) -> Result<Vec<TupleId>> {
        let mut out = Vec::new();
        let mut cursor = self.ends(owner, chain)?.last;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.links(id, chain)?.prev;
        }
        Ok(out)
    }

    /// Facts bound along the chain ending at `id`, root first.
    ///
    /// # Errors
    /// Returns `Structural` if a parent's index is not one less than its
    /// child's, or an error for stale parents.
    pub fn facts_of(&self, id: TupleId) -> Result<Vec<FactId>> {
        let tuple = self.tuples.get(id)?;
        let mut facts = vec![tuple.fact; tuple.size()];
        let mut index = tuple.index;
        let mut cursor = tuple.parent;
        while let Some(parent_id) = cursor {
            let parent = self.tuples.get(parent_id)?;
            if parent.index + 1 != index {
                return Err(Error::structural(
                    id,
                    "facts_of",
                    format!("parent index {} under child index {index}", parent.index),
                ));
            }
            index = parent.index;
            facts[index] = parent.fact;
            cursor = parent.parent;
        }
        if index != 0 {
            return Err(Error::structural(id, "facts_of", "chain does not reach a root"));
        }
        Ok(facts)
    }
}
