//! Rules added to a running session

use std::sync::Arc;

use rulenet::engine::{
    CompiledRule, EventRecorder, JoinSpec, Pattern, RuleDefinition, Session, SessionConfig,
};
use rulenet::foundation::{Error, ErrorKind, Value};

fn compiled(rule: RuleDefinition) -> Arc<CompiledRule> {
    Arc::new(rule.compile().unwrap())
}

#[test]
fn added_rule_sees_existing_facts() {
    let mut session = Session::new(&[], SessionConfig::testing()).unwrap();
    for n in 0..3 {
        session.insert(Value::Int(n)).unwrap();
    }
    session
        .add_rule(compiled(RuleDefinition::new("late").pattern(Pattern::any())))
        .unwrap();

    assert_eq!(session.rule_count(), 1);
    assert_eq!(session.fire_all_rules().unwrap(), 3);
}

#[test]
fn added_join_rule_pairs_existing_facts() {
    let mut session = Session::new(&[], SessionConfig::testing()).unwrap();
    for id in 0..3 {
        session
            .insert(Value::record([("kind", Value::from("left")), ("key", Value::Int(id))]))
            .unwrap();
        session
            .insert(Value::record([("kind", Value::from("right")), ("key", Value::Int(id))]))
            .unwrap();
    }
    let pairs = RuleDefinition::new("pairs")
        .pattern(Pattern::field_eq("kind", "left"))
        .pattern(Pattern::field_eq("kind", "right").join(JoinSpec::fields(0, "key", "key")));
    session.add_rule(compiled(pairs)).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 3);
}

#[test]
fn rule_addition_is_not_locked_out() {
    let early = RuleDefinition::new("early").pattern(Pattern::any());
    let mut session = Session::new(&[compiled(early)], SessionConfig::testing()).unwrap();
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    session.insert(Value::Int(1)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    session.insert(Value::Int(2)).unwrap();

    let late = RuleDefinition::new("late")
        .lock_on_active(true)
        .pattern(Pattern::any());
    session.add_rule(compiled(late)).unwrap();

    // MAIN is active, but seeding a new rule is never suppressed.
    assert_eq!(session.fire_all_rules().unwrap(), 3);
    assert!(recorder.cancelled().is_empty());

    // An ordinary insert into the active group is.
    session.insert(Value::Int(3)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(recorder.cancelled().len(), 1);
}

#[test]
fn duplicate_rule_is_rejected_and_the_session_keeps_working() {
    let rule = compiled(RuleDefinition::new("once").pattern(Pattern::any()));
    let mut session = Session::new(&[Arc::clone(&rule)], SessionConfig::testing()).unwrap();

    let err = session.add_rule(rule).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Build(_)));
    assert_eq!(session.rule_count(), 1);

    session.insert(Value::Int(1)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
}

#[test]
fn failing_seed_leaves_the_session_unchanged() {
    let mut session = Session::new(&[], SessionConfig::testing()).unwrap();
    session.insert(Value::from("not a number")).unwrap();

    let strict = RuleDefinition::new("strict").pattern(Pattern::try_matching(|v| {
        v.as_int()
            .map(|n| n > 0)
            .ok_or_else(|| Error::evaluation("", "expected an int"))
    }));
    let err = session.add_rule(compiled(strict)).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(session.rule_count(), 0);
    assert_eq!(session.tuple_count(), 0);
}
