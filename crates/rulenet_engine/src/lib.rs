//! Join propagation, terminal activation, agenda, and sessions for rulenet.
//!
//! This crate provides:
//! - [`RuleDefinition`] / [`Pattern`] / [`JoinSpec`] - Rule topology input
//! - [`BuildContext`] - Bounded, explicitly owned rule compilation pool
//! - [`KnowledgeBase`] - Compiled rules that sessions are created from
//! - [`Session`] - Working memory, propagation, and the fire loop
//! - [`Agenda`] - Agenda groups, focus stack, and firing order
//! - [`AgendaEventListener`] - Activation lifecycle notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod build;
pub mod config;
pub mod event;
pub mod executor;
pub mod node;
pub mod propagation;
pub mod rule;
pub mod session;
pub mod terminal;

pub use agenda::{Agenda, AgendaGroup, QueueKey};
pub use build::{BuildContext, KnowledgeBase, RulePackage};
pub use config::{BuildConfig, SessionConfig};
pub use event::{AgendaEvent, AgendaEventListener, CancelReason, EventRecorder, MatchEvent};
pub use executor::RuleExecutor;
pub use rule::{CompiledRule, EntryPoint, JoinSpec, Pattern, RuleDefinition, Salience};
pub use session::{RuleContext, Session};
