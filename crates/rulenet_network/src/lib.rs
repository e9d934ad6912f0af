//! Tuple arena, sibling chains, indexed memories, and staging for rulenet.
//!
//! This crate provides:
//! - [`FactStore`] - Generational fact handle allocation with recency
//! - [`TupleArena`] - Generational slot arena for partial matches
//! - [`TupleNetwork`] - Parent/child sibling chain maintenance
//! - [`TupleMemory`] - Hash-bucketed tuple index with a full iterator
//! - [`StagedTuples`] - Pending insert/update/delete lists
//! - [`PropagationContext`] - Origin and type of a fact change

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod context;
pub mod fact;
pub mod memory;
pub mod network;
pub mod staging;
pub mod tuple;

pub use arena::TupleArena;
pub use context::{PropagationContext, PropagationType, TerminalIdentity};
pub use fact::{FactHandle, FactStore};
pub use memory::{FullIter, MemoryId, TupleMemory};
pub use network::{Chain, Owner, TupleNetwork};
pub use staging::{Stage, StageOutcome, StagedTuples};
pub use tuple::{Activation, NodeId, Tuple, TupleKind};
