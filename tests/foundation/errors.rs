//! Integration tests for Error types
//!
//! Tests error construction, display, context, and recoverability.

use rulenet_foundation::{Error, ErrorContext, ErrorKind, FactId, SemanticLimit, TupleId};

// =============================================================================
// Error Construction
// =============================================================================

#[test]
fn error_structural() {
    let err = Error::structural(TupleId::new(3, 1), "detach", "owner head does not match");
    assert!(matches!(err.kind, ErrorKind::Structural { operation: "detach", .. }));
    let msg = format!("{err}");
    assert!(msg.contains("detach"));
    assert!(msg.contains("owner head"));
}

#[test]
fn error_stale_tuple() {
    let err = Error::stale_tuple(TupleId::new(9, 4));
    assert!(matches!(err.kind, ErrorKind::StaleTuple(_)));
    assert!(format!("{err}").contains('9'));
}

#[test]
fn error_fact_not_found() {
    let err = Error::fact_not_found(FactId::new(42, 1));
    assert!(matches!(err.kind, ErrorKind::FactNotFound(_)));
    assert!(format!("{err}").contains("42"));
}

#[test]
fn error_stale_fact() {
    let err = Error::stale_fact(FactId::new(5, 2));
    assert!(matches!(err.kind, ErrorKind::StaleFact(_)));
}

#[test]
fn error_unsupported() {
    let err = Error::unsupported("blockers", "right tuple");
    let msg = format!("{err}");
    assert!(msg.contains("blockers"));
    assert!(msg.contains("right tuple"));
}

#[test]
fn error_limit_exceeded_display() {
    let err = Error::limit_exceeded(SemanticLimit::MaxActivations {
        limit: 10,
        context: Some("payroll.raise#default".to_string()),
    });
    let msg = format!("{err}");
    assert!(msg.contains("10"));
    assert!(msg.contains("payroll.raise#default"));
}

// =============================================================================
// Recoverability
// =============================================================================

#[test]
fn structural_faults_are_not_recoverable() {
    assert!(!Error::structural(TupleId::new(0, 1), "free", "still linked").is_recoverable());
    assert!(!Error::stale_tuple(TupleId::new(0, 1)).is_recoverable());
}

#[test]
fn evaluation_and_limits_are_recoverable() {
    assert!(Error::evaluation("r", "boom").is_recoverable());
    assert!(Error::build("bad").is_recoverable());
    assert!(
        Error::limit_exceeded(SemanticLimit::MaxActivations {
            limit: 1,
            context: None
        })
        .is_recoverable()
    );
}

// =============================================================================
// Context
// =============================================================================

#[test]
fn in_rule_fills_missing_rule_name_only() {
    let err = Error::evaluation("", "no age").in_rule("adults");
    match &err.kind {
        ErrorKind::Evaluation { rule, .. } => assert_eq!(rule, "adults"),
        other => panic!("unexpected kind {other:?}"),
    }

    let err = Error::evaluation("original", "no age").in_rule("adults");
    match &err.kind {
        ErrorKind::Evaluation { rule, .. } => assert_eq!(rule, "original"),
        other => panic!("unexpected kind {other:?}"),
    }
    let context = err.context.unwrap();
    assert_eq!(context.stack, vec!["rule adults".to_string()]);
}

#[test]
fn context_carries_tuple_and_frames() {
    let tuple = TupleId::new(7, 2);
    let err = Error::evaluation("r", "boom").with_context(
        ErrorContext::new()
            .with_tuple(tuple)
            .with_frame("join 0")
            .with_frame("rule r"),
    );
    let context = err.context.unwrap();
    assert_eq!(context.tuple, Some(tuple));
    assert_eq!(context.stack.len(), 2);
}
