//! Kill switch and halting

use std::sync::Arc;

use rulenet::engine::{Pattern, RuleDefinition, Session, SessionConfig};
use rulenet::foundation::{ErrorKind, SemanticLimit, Value};

/// Re-inserts a bigger number every time it fires.
fn runaway() -> RuleDefinition {
    RuleDefinition::new("runaway")
        .pattern(Pattern::matching(|v| v.as_int().is_some()))
        .then(|ctx| {
            let n = ctx.fact(0)?.as_int().unwrap_or(0);
            ctx.insert(Value::Int(n + 1))?;
            Ok(())
        })
}

#[test]
fn runaway_rules_hit_the_kill_switch() {
    let rule = Arc::new(runaway().compile().unwrap());
    let mut session =
        Session::new(&[rule], SessionConfig::testing().with_max_activations(50)).unwrap();
    session.insert(Value::Int(0)).unwrap();

    let err = session.fire_all_rules().unwrap_err();
    match &err.kind {
        ErrorKind::LimitExceeded(SemanticLimit::MaxActivations { limit, context }) => {
            assert_eq!(*limit, 50);
            assert_eq!(context.as_deref(), Some("default.runaway#default"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_recoverable());
    assert_eq!(session.fact_count(), 51);
}

#[test]
fn session_survives_the_kill_switch() {
    let rule = Arc::new(runaway().compile().unwrap());
    let mut session =
        Session::new(&[rule], SessionConfig::testing().with_max_activations(10)).unwrap();
    session.insert(Value::Int(0)).unwrap();
    assert!(session.fire_all_rules().is_err());

    // Each call gets a fresh budget.
    assert_eq!(session.fire_until_limit(5).unwrap(), 5);
    assert_eq!(session.agenda_size(), 1);
}

#[test]
fn halt_leaves_the_rest_queued() {
    let stop = RuleDefinition::new("stop")
        .salience(10)
        .pattern(Pattern::field_eq("type", "stop"))
        .then(|ctx| {
            ctx.halt();
            Ok(())
        });
    let count = RuleDefinition::new("count").pattern(Pattern::matching(|v| v.as_int().is_some()));
    let rules = [
        Arc::new(stop.compile().unwrap()),
        Arc::new(count.compile().unwrap()),
    ];
    let mut session = Session::new(&rules, SessionConfig::testing()).unwrap();
    for n in 0..4 {
        session.insert(Value::Int(n)).unwrap();
    }
    session.insert(Value::record([("type", Value::from("stop"))])).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.agenda_size(), 4);
    assert_eq!(session.fire_all_rules().unwrap(), 4);
}
