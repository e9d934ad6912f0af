//! Integration tests for Value

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rulenet_foundation::{FactId, MatchRef, TupleId, Value};

fn hash(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn record_field_access() {
    let person = Value::record([("name", Value::from("ann")), ("age", Value::Int(30))]);
    assert_eq!(person.field("name").and_then(Value::as_str), Some("ann"));
    assert_eq!(person.field("age").and_then(Value::as_int), Some(30));
    assert!(person.field("missing").is_none());
    assert!(Value::Int(1).field("name").is_none());
}

#[test]
fn with_field_returns_a_new_record() {
    let before = Value::record([("n", Value::Int(1))]);
    let after = before.with_field("n", Value::Int(2));
    assert_eq!(before.field("n"), Some(&Value::Int(1)));
    assert_eq!(after.field("n"), Some(&Value::Int(2)));
    assert_eq!(Value::Nil.with_field("n", Value::Int(2)), Value::Nil);
}

#[test]
fn equal_values_hash_equal() {
    let a = Value::record([("x", Value::Int(1)), ("y", Value::Float(0.5))]);
    let b = Value::record([("y", Value::Float(0.5)), ("x", Value::Int(1))]);
    assert_eq!(a, b);
    assert_eq!(hash(&a), hash(&b));
}

#[test]
fn floats_compare_by_bits() {
    assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    assert_ne!(Value::Float(0.0), Value::Float(-0.0));
}

#[test]
fn variants_never_compare_equal() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert_ne!(Value::Nil, Value::Bool(false));
    assert_ne!(Value::FactRef(FactId::new(0, 1)), Value::Int(0));
}

#[test]
fn match_values() {
    let m = MatchRef {
        rule: Arc::from("audit"),
        tuple: TupleId::new(2, 1),
    };
    let value = Value::Match(m.clone());
    assert_eq!(value.as_match(), Some(&m));
    assert!(Value::Int(1).as_match().is_none());
    assert_eq!(format!("{value}"), "#match[audit Tuple(2)]");
}
