//! Cross-layer integration tests for rulenet
//!
//! Tests that drive whole sessions through the facade crate.

mod limits;
mod runtime_rules;
