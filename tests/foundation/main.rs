//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Value, FactId, TupleId, and Error.

mod errors;
mod ids;
mod values;
