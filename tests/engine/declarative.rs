//! Declarative agenda: materialised matches, blocking, and unblocking

use std::sync::{Arc, Mutex};

use rulenet_engine::{
    AgendaEvent, CancelReason, EventRecorder, Pattern, RuleDefinition, SessionConfig,
};
use rulenet_foundation::{ErrorKind, Value};

use crate::{fact, session};

fn work() -> RuleDefinition {
    RuleDefinition::new("work").pattern(Pattern::field_eq("type", "job"))
}

/// Blocks every `work` match as soon as it is queued.
fn hold() -> RuleDefinition {
    RuleDefinition::new("hold")
        .salience(100)
        .pattern(Pattern::activations_of("work"))
        .then(|ctx| {
            let target = ctx.fact_id(0)?;
            ctx.block_match(target)
        })
}

#[test]
fn queued_matches_are_visible_as_facts() {
    let mut session = session(vec![work()], SessionConfig::declarative());
    session.insert(fact("job", &[])).unwrap();
    session.flush().unwrap();

    let matches: Vec<String> = session
        .facts()
        .filter_map(|(_, value)| value.as_match().map(|m| m.rule.to_string()))
        .collect();
    assert_eq!(matches, vec!["work".to_string()]);

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.fact_count(), 1);
}

#[test]
fn ordinary_patterns_never_see_matches() {
    let everything = RuleDefinition::new("everything").pattern(Pattern::any());
    let mut session = session(vec![work(), everything], SessionConfig::declarative());
    session.insert(fact("job", &[])).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(session.fact_count(), 1);
}

#[test]
fn catch_all_meta_rule_sees_only_other_rules_matches() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let audit = RuleDefinition::new("audit")
        .salience(10)
        .pattern(Pattern::activations())
        .then(move |ctx| {
            let rule = ctx.fact(0)?.as_match().map(|m| m.rule.to_string());
            log.lock().unwrap().extend(rule);
            Ok(())
        });
    let mut session = session(vec![work(), audit], SessionConfig::declarative());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    session.insert(fact("job", &[])).unwrap();
    session.insert(fact("job", &[])).unwrap();
    session.flush().unwrap();
    // Two jobs and the two `work` matches; `audit` matches stay unmaterialised.
    assert_eq!(session.fact_count(), 4);
    assert_eq!(session.agenda_size(), 4);

    assert_eq!(session.fire_all_rules().unwrap(), 4);
    assert_eq!(
        recorder.fired(),
        vec![
            "audit".to_string(),
            "audit".to_string(),
            "work".to_string(),
            "work".to_string()
        ]
    );
    assert_eq!(*seen.lock().unwrap(), vec!["work".to_string(), "work".to_string()]);
    assert_eq!(session.fact_count(), 2);
    assert_eq!(session.agenda_size(), 0);
}

#[test]
fn meta_rule_blocks_a_match() {
    let mut session = session(vec![work(), hold()], SessionConfig::declarative());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    session.insert(fact("job", &[])).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(recorder.fired(), vec!["hold".to_string()]);
    assert_eq!(
        recorder.cancelled(),
        vec![("work".to_string(), CancelReason::Blocked)]
    );
    assert_eq!(session.agenda_size(), 0);
    // The job and the blocked match it produced.
    assert_eq!(session.fact_count(), 2);
}

#[test]
fn unblock_all_requeues_under_a_new_number() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let release = RuleDefinition::new("release")
        .pattern(Pattern::field_eq("type", "go"))
        .pattern(Pattern::activations_of("work"))
        .then(move |ctx| {
            let target = ctx.fact_id(1)?;
            log.lock().unwrap().extend(ctx.blockers_of(target)?);
            ctx.unblock_all(target)
        });
    let mut session = session(vec![work(), hold(), release], SessionConfig::declarative());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    session.insert(fact("job", &[])).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);

    session.insert(fact("go", &[])).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(
        recorder.fired(),
        vec!["hold".to_string(), "release".to_string(), "work".to_string()]
    );
    assert_eq!(*seen.lock().unwrap(), vec!["hold".to_string()]);

    let numbers: Vec<u64> = recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            AgendaEvent::Created(m) if &*m.rule == "work" => Some(m.activation_number),
            _ => None,
        })
        .collect();
    assert_eq!(numbers.len(), 2);
    assert!(numbers[1] > numbers[0]);

    // Firing `work` retracted its match, which took the meta-rule matches with it.
    assert_eq!(session.fact_count(), 2);
    assert_eq!(session.agenda_size(), 0);
}

#[test]
fn deleting_the_blocker_releases_the_match() {
    let freeze = RuleDefinition::new("freeze")
        .salience(100)
        .pattern(Pattern::field_eq("type", "freeze"))
        .pattern(Pattern::activations_of("work"))
        .then(|ctx| {
            let target = ctx.fact_id(1)?;
            ctx.block_match(target)
        });
    let mut session = session(vec![work(), freeze], SessionConfig::declarative());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    let trigger = session.insert(fact("freeze", &[])).unwrap();
    session.insert(fact("job", &[])).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.agenda_size(), 0);

    session.delete(trigger).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(recorder.fired(), vec!["freeze".to_string(), "work".to_string()]);
}

#[test]
fn deleting_a_blocked_match_cleans_up() {
    let mut session = session(vec![work(), hold()], SessionConfig::declarative());
    let job = session.insert(fact("job", &[])).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);

    session.delete(job).unwrap();
    session.flush().unwrap();
    assert_eq!(session.fact_count(), 0);
    assert_eq!(session.tuple_count(), 0);
    assert_eq!(session.fire_all_rules().unwrap(), 0);
}

#[test]
fn blocking_needs_the_declarative_agenda() {
    let mut session = session(vec![hold()], SessionConfig::testing());
    let fake = session.insert(Value::Int(1)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 0);
    assert!(session.fact(fake).unwrap().as_match().is_none());

    let probe = RuleDefinition::new("probe")
        .pattern(Pattern::any())
        .then(move |ctx| ctx.block_match(fake));
    session.add_rule(Arc::new(probe.compile().unwrap())).unwrap();
    let err = session.fire_all_rules().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unsupported { .. }));
}
