//! Error types for the rulenet system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//!
//! Errors fall into two families:
//! - structural faults ([`ErrorKind::Structural`], stale ids), which mean the
//!   tuple network is corrupt and every later match is suspect;
//! - recoverable faults ([`ErrorKind::Evaluation`], limits), which the caller
//!   of the fire loop may handle and retry.

use std::fmt;

use thiserror::Error;

use crate::id::{FactId, TupleId};

/// Result type alias using the rulenet [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for rulenet operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a structural invariant violation.
    #[must_use]
    pub fn structural(tuple: TupleId, operation: &'static str, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural {
            tuple,
            operation,
            detail: detail.into(),
        })
    }

    /// Creates a stale tuple reference error.
    #[must_use]
    pub fn stale_tuple(id: TupleId) -> Self {
        Self::new(ErrorKind::StaleTuple(id))
    }

    /// Creates a fact not found error.
    #[must_use]
    pub fn fact_not_found(id: FactId) -> Self {
        Self::new(ErrorKind::FactNotFound(id))
    }

    /// Creates a stale fact reference error.
    #[must_use]
    pub fn stale_fact(id: FactId) -> Self {
        Self::new(ErrorKind::StaleFact(id))
    }

    /// Creates an evaluation failure raised by user-supplied code.
    #[must_use]
    pub fn evaluation(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an unsupported operation error.
    #[must_use]
    pub fn unsupported(operation: &'static str, kind: &'static str) -> Self {
        Self::new(ErrorKind::Unsupported { operation, kind })
    }

    /// Creates a rule build error.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Build(message.into()))
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Returns true if the session remains usable after this error.
    ///
    /// Structural faults and stale tuple ids mean the network is corrupt.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::Structural { .. } | ErrorKind::StaleTuple(_)
        )
    }

    /// Attaches a rule name to an evaluation error that lacks one.
    #[must_use]
    pub fn in_rule(mut self, rule: &str) -> Self {
        if let ErrorKind::Evaluation { rule: r, .. } = &mut self.kind {
            if r.is_empty() {
                *r = rule.to_string();
            }
        }
        let context = self
            .context
            .take()
            .unwrap_or_default()
            .with_frame(format!("rule {rule}"));
        self.context = Some(context);
        self
    }
}

/// Categorized error kinds.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Tuple network invariant violated.
    #[error("structural fault in {operation} on {tuple:?}: {detail}")]
    Structural {
        /// The tuple being manipulated.
        tuple: TupleId,
        /// The operation that detected the fault.
        operation: &'static str,
        /// What was inconsistent.
        detail: String,
    },

    /// Tuple reference is stale (generation mismatch or freed slot).
    #[error("stale tuple reference: {0:?}")]
    StaleTuple(TupleId),

    /// Fact was not found in working memory.
    #[error("fact not found: {0:?}")]
    FactNotFound(FactId),

    /// Fact reference is stale (generation mismatch).
    #[error("stale fact reference: {0:?}")]
    StaleFact(FactId),

    /// User-supplied constraint, salience, or consequence failed.
    #[error("evaluation failed in rule '{rule}': {message}")]
    Evaluation {
        /// The rule being evaluated (empty if unknown at the raise site).
        rule: String,
        /// Description of the failure.
        message: String,
    },

    /// Operation is not supported by this kind of tuple or node.
    #[error("unsupported operation {operation} on {kind}")]
    Unsupported {
        /// The operation requested.
        operation: &'static str,
        /// The kind that cannot perform it.
        kind: &'static str,
    },

    /// Rule definition could not be compiled.
    #[error("build error: {0}")]
    Build(String),

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Maximum rule firings per `fire_all_rules` call exceeded.
    MaxActivations {
        /// The configured limit.
        limit: usize,
        /// The rule that was about to fire.
        context: Option<String>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxActivations { limit, context } => {
                write!(f, "max activations ({limit}) exceeded")?;
                if let Some(ctx) = context {
                    write!(f, ": {ctx}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Tuple being processed, if any.
    pub tuple: Option<TupleId>,
    /// Stack of rule/node frames.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tuple being processed.
    #[must_use]
    pub fn with_tuple(mut self, tuple: TupleId) -> Self {
        self.tuple = Some(tuple);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tuple) = &self.tuple {
            write!(f, "at {tuple:?}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
