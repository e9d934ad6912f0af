//! Join propagation through sessions

use std::sync::{Arc, Mutex};

use rulenet_engine::{
    CancelReason, EventRecorder, JoinSpec, Pattern, RuleDefinition, SessionConfig,
};
use rulenet_foundation::{FactId, Value};

use crate::{fact, session};

fn customer(id: i64) -> Value {
    fact("customer", &[("id", Value::Int(id))])
}

fn order(id: i64, customer: i64) -> Value {
    fact("order", &[("id", Value::Int(id)), ("customer", Value::Int(customer))])
}

fn shipment(order: i64) -> Value {
    fact("shipment", &[("order", Value::Int(order))])
}

/// customer(id) joined with order(customer == id); records bound facts.
fn customer_orders(log: &Arc<Mutex<Vec<Vec<FactId>>>>) -> RuleDefinition {
    let log = Arc::clone(log);
    RuleDefinition::new("customer-orders")
        .pattern(Pattern::field_eq("type", "customer"))
        .pattern(Pattern::field_eq("type", "order").join(JoinSpec::fields(0, "id", "customer")))
        .then(move |ctx| {
            log.lock().unwrap().push(ctx.facts().to_vec());
            Ok(())
        })
}

// =============================================================================
// Staging
// =============================================================================

#[test]
fn insert_then_delete_before_flush_leaves_nothing() {
    let log = Arc::default();
    let mut session = session(vec![customer_orders(&log)], SessionConfig::testing());
    let c = session.insert(customer(1)).unwrap();
    session.delete(c).unwrap();
    session.flush().unwrap();

    assert_eq!(session.tuple_count(), 0);
    assert_eq!(session.agenda_size(), 0);
    assert_eq!(session.fact_count(), 0);
}

#[test]
fn delete_and_related_insert_in_one_cycle_leave_one_match() {
    let log = Arc::default();
    let mut session = session(vec![customer_orders(&log)], SessionConfig::testing());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    let c = session.insert(customer(1)).unwrap();
    let first = session.insert(order(10, 1)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 1);

    session.delete(first).unwrap();
    let second = session.insert(order(11, 1)).unwrap();
    session.flush().unwrap();

    assert_eq!(session.agenda_size(), 1);
    assert_eq!(
        recorder.cancelled(),
        vec![("customer-orders".to_string(), CancelReason::Retracted)]
    );
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(*log.lock().unwrap(), vec![vec![c, second]]);
}

// =============================================================================
// Joins
// =============================================================================

#[test]
fn join_key_update_repairs_the_match() {
    let log = Arc::default();
    let mut session = session(vec![customer_orders(&log)], SessionConfig::testing());
    let _c1 = session.insert(customer(1)).unwrap();
    let c2 = session.insert(customer(2)).unwrap();
    let o = session.insert(order(10, 1)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 1);

    session.update(o, order(10, 2)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 1);

    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(*log.lock().unwrap(), vec![vec![c2, o]]);
}

#[test]
fn update_to_unknown_key_drops_the_match_until_a_partner_arrives() {
    let log = Arc::default();
    let mut session = session(vec![customer_orders(&log)], SessionConfig::testing());
    session.insert(customer(1)).unwrap();
    let o = session.insert(order(10, 1)).unwrap();
    session.flush().unwrap();

    session.update(o, order(10, 7)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 0);

    let c7 = session.insert(customer(7)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
    assert_eq!(*log.lock().unwrap(), vec![vec![c7, o]]);
}

#[test]
fn many_partners_share_one_bucket() {
    let log = Arc::default();
    let mut session = session(vec![customer_orders(&log)], SessionConfig::testing());
    for id in 0..20 {
        session.insert(order(id, id % 2)).unwrap();
    }
    session.insert(customer(0)).unwrap();
    session.insert(customer(1)).unwrap();

    assert_eq!(session.fire_all_rules().unwrap(), 20);
    assert_eq!(session.fire_all_rules().unwrap(), 0);
}

#[test]
fn unjoined_pattern_is_a_cross_product() {
    let rule = RuleDefinition::new("pairs")
        .pattern(Pattern::field_eq("type", "customer"))
        .pattern(Pattern::field_eq("type", "order"));
    let mut session = session(vec![rule], SessionConfig::testing());
    for id in 0..2 {
        session.insert(customer(id)).unwrap();
    }
    for id in 0..3 {
        session.insert(order(id, 99)).unwrap();
    }
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 6);
}

#[test]
fn join_test_filters_pairs() {
    let rule = RuleDefinition::new("bigger")
        .pattern(Pattern::matching(|v| v.as_int().is_some()))
        .pattern(Pattern::matching(|v| v.as_int().is_some()).test(|left, right| {
            matches!((left[0].as_int(), right.as_int()), (Some(l), Some(r)) if r > l)
        }));
    let mut session = session(vec![rule], SessionConfig::testing());
    for n in [1, 2, 3] {
        session.insert(Value::Int(n)).unwrap();
    }
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 3);
}

#[test]
fn delete_cascades_through_a_chain() {
    let rule = RuleDefinition::new("shipped")
        .pattern(Pattern::field_eq("type", "customer"))
        .pattern(Pattern::field_eq("type", "order").join(JoinSpec::fields(0, "id", "customer")))
        .pattern(Pattern::field_eq("type", "shipment").join(JoinSpec::fields(1, "id", "order")));
    let mut session = session(vec![rule], SessionConfig::testing());
    let recorder = EventRecorder::new();
    session.add_listener(recorder.clone());

    let c = session.insert(customer(1)).unwrap();
    session.insert(order(10, 1)).unwrap();
    session.insert(order(11, 1)).unwrap();
    session.insert(shipment(10)).unwrap();
    session.insert(shipment(11)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 2);

    session.delete(c).unwrap();
    session.flush().unwrap();
    assert_eq!(session.agenda_size(), 0);
    assert_eq!(recorder.cancelled().len(), 2);
    assert_eq!(session.fire_all_rules().unwrap(), 0);
}

#[test]
fn fact_that_stops_matching_leaves_the_network() {
    let rule = RuleDefinition::new("orders").pattern(Pattern::field_eq("type", "order"));
    let mut session = session(vec![rule], SessionConfig::testing());
    let o = session.insert(order(1, 1)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.tuple_count(), 1);

    session.update(o, customer(1)).unwrap();
    session.flush().unwrap();
    assert_eq!(session.tuple_count(), 0);
    assert_eq!(session.agenda_size(), 0);

    session.update(o, order(1, 1)).unwrap();
    assert_eq!(session.fire_all_rules().unwrap(), 1);
}
