//! Core ids, values, and error types for rulenet.
//!
//! This crate provides:
//! - [`Value`] - The object type carried by facts
//! - [`FactId`] / [`TupleId`] - Generational identifiers
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod value;

pub use error::{Error, ErrorContext, ErrorKind, Result, SemanticLimit};
pub use id::{AgendaGroupId, FactId, Recency, TupleId};
pub use value::{MatchRef, Value};
