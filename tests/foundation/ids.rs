//! Integration tests for generational ids

use std::collections::HashSet;

use rulenet_foundation::{AgendaGroupId, FactId, TupleId};

#[test]
fn ids_compare_by_index_and_generation() {
    assert_eq!(FactId::new(1, 1), FactId::new(1, 1));
    assert_ne!(FactId::new(1, 1), FactId::new(1, 2));
    assert_ne!(TupleId::new(1, 1), TupleId::new(2, 1));
}

#[test]
fn ids_hash_consistently() {
    let set: HashSet<_> = [TupleId::new(1, 1), TupleId::new(1, 1), TupleId::new(1, 2)]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn display_hides_generation() {
    assert_eq!(format!("{}", FactId::new(3, 9)), "Fact(3)");
    assert_eq!(format!("{:?}", FactId::new(3, 9)), "FactId(3v9)");
    assert_eq!(format!("{}", TupleId::new(4, 2)), "Tuple(4)");
}

#[test]
fn main_group_is_default() {
    assert_eq!(AgendaGroupId::default(), AgendaGroupId::MAIN);
}
