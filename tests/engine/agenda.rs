//! Firing order, agenda groups, and focus

use std::sync::{Arc, Mutex};

use rulenet_engine::{
    AgendaEvent, CancelReason, EventRecorder, Pattern, RuleDefinition, SessionConfig,
};
use rulenet_foundation::Value;

use crate::session;

fn rule(name: &str, salience: i32) -> RuleDefinition {
    RuleDefinition::new(name)
        .salience(salience)
        .pattern(Pattern::any())
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

// =============================================================================
// Salience
// =============================================================================

#[test]
fn higher_salience_first_then_creation_order() {
    let mut session = session(
        vec![rule("A", 5), rule("B", 10), rule("C", 5)],
        SessionConfig::testing(),
    );
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    session.insert(Value::Int(1)).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 3);
    assert_eq!(recorder.fired(), names(&["B", "A", "C"]));
}

#[test]
fn equal_salience_fires_oldest_match_first() {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&fired);
    let rule = RuleDefinition::new("log").pattern(Pattern::any()).then(move |ctx| {
        log.lock().unwrap().push(ctx.fact(0)?.clone());
        Ok(())
    });
    let mut session = session(vec![rule], SessionConfig::testing());
    for n in 0..5 {
        session.insert(Value::Int(n)).unwrap();
    }

    assert_eq!(session.fire_all_rules().unwrap(), 5);
    assert_eq!(*fired.lock().unwrap(), (0..5).map(Value::Int).collect::<Vec<_>>());
}

#[test]
fn dynamic_salience_reads_the_match() {
    let ranked = RuleDefinition::new("ranked")
        .dynamic_salience(|facts| Ok(i32::try_from(facts[0].as_int().unwrap_or(0)).unwrap_or(0)))
        .pattern(Pattern::matching(|v| v.as_int().is_some()));
    let mut session = session(vec![ranked], SessionConfig::testing());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    for n in [3, 9, 1] {
        session.insert(Value::Int(n)).unwrap();
    }
    session.fire_all_rules().unwrap();

    let saliences: Vec<i32> = recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            AgendaEvent::AfterFired(m) => Some(m.salience),
            _ => None,
        })
        .collect();
    assert_eq!(saliences, vec![9, 3, 1]);
}

// =============================================================================
// Focus
// =============================================================================

#[test]
fn focus_stack_fires_top_group_first() {
    let mut session = session(
        vec![
            rule("in-main", 100),
            rule("in-a", 0).agenda_group("a"),
            rule("in-b", 0).agenda_group("b"),
        ],
        SessionConfig::testing(),
    );
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    session.insert(Value::Int(1)).unwrap();
    session.set_focus("a");
    session.set_focus("b");
    assert_eq!(session.focus_stack(), names(&["MAIN", "a", "b"]));

    assert_eq!(session.fire_all_rules().unwrap(), 3);
    assert_eq!(recorder.fired(), names(&["in-b", "in-a", "in-main"]));
    assert_eq!(session.focus_stack(), names(&["MAIN"]));

    let focus: Vec<AgendaEvent> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, AgendaEvent::GroupPushed(_) | AgendaEvent::GroupPopped(_)))
        .collect();
    assert_eq!(
        focus,
        vec![
            AgendaEvent::GroupPushed("a".to_string()),
            AgendaEvent::GroupPushed("b".to_string()),
            AgendaEvent::GroupPopped("b".to_string()),
            AgendaEvent::GroupPopped("a".to_string()),
        ]
    );
}

#[test]
fn groups_without_focus_wait() {
    let mut session = session(
        vec![rule("in-main", 0), rule("in-a", 0).agenda_group("a")],
        SessionConfig::testing(),
    );
    session.insert(Value::Int(1)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.agenda_size(), 1);

    session.set_focus("a");
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(session.agenda_size(), 0);
}

#[test]
fn refocusing_the_top_group_is_a_no_op() {
    let mut session = session(vec![rule("in-a", 0).agenda_group("a")], SessionConfig::testing());
    session.set_focus("a");
    session.set_focus("a");
    assert_eq!(session.focus_stack(), names(&["MAIN", "a"]));
}

#[test]
fn auto_focus_jumps_ahead_of_main() {
    let mut session = session(
        vec![
            rule("routine", 100),
            rule("alarm", 0).agenda_group("alerts").auto_focus(true),
        ],
        SessionConfig::testing(),
    );
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    session.insert(Value::Int(1)).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(recorder.fired(), names(&["alarm", "routine"]));
    assert_eq!(session.focus_stack(), names(&["MAIN"]));
}

#[test]
fn clearing_a_group_cancels_its_activations() {
    let mut session = session(
        vec![rule("in-a", 0).agenda_group("a"), rule("in-main", 0)],
        SessionConfig::testing(),
    );
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());
    session.insert(Value::Int(1)).unwrap();
    session.insert(Value::Int(2)).unwrap();
    session.flush().unwrap();

    assert_eq!(session.clear_agenda_group("a").unwrap(), 2);
    assert_eq!(session.clear_agenda_group("missing").unwrap(), 0);
    assert_eq!(
        recorder.cancelled(),
        vec![
            ("in-a".to_string(), CancelReason::Clear),
            ("in-a".to_string(), CancelReason::Clear),
        ]
    );
    session.set_focus("a");
    assert_eq!(session.fire_all_rules().unwrap(), 2);
    assert_eq!(recorder.fired(), names(&["in-main", "in-main"]));
}
