//! rulenet - Incremental production rule engine
//!
//! This crate re-exports all layers of the rulenet system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: rulenet_engine      Joins, terminal activation, agenda, sessions
//! Layer 1: rulenet_network     Tuple arena, sibling chains, memories, staging
//! Layer 0: rulenet_foundation  Core types (Value, FactId, TupleId, Error)
//! ```

pub use rulenet_engine as engine;
pub use rulenet_foundation as foundation;
pub use rulenet_network as network;
