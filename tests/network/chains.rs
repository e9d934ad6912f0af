//! Integration tests for sibling chain maintenance

use proptest::prelude::*;
use rulenet_foundation::{FactId, TupleId, Value};
use rulenet_network::{Chain, NodeId, Owner, Tuple, TupleKind, TupleNetwork};

// =============================================================================
// Helpers
// =============================================================================

fn root(net: &mut TupleNetwork, fact: FactId) -> TupleId {
    net.alloc_attached(
        Tuple::root(fact, NodeId(0), TupleKind::Left),
        Owner::Fact(fact),
        Chain::Left,
    )
    .unwrap()
}

fn child(net: &mut TupleNetwork, parent: TupleId, fact: FactId) -> TupleId {
    let index = net.tuples.get(parent).unwrap().index();
    net.alloc_attached(
        Tuple::child(parent, index, fact, NodeId(1), TupleKind::Left),
        Owner::Tuple(parent),
        Chain::Left,
    )
    .unwrap()
}

fn assert_consistent(net: &TupleNetwork, owner: Owner, expected: &[TupleId]) {
    let forward = net.children(owner, Chain::Left).unwrap();
    let mut backward = net.children_rev(owner, Chain::Left).unwrap();
    backward.reverse();
    assert_eq!(forward, expected);
    assert_eq!(backward, expected);
}

// =============================================================================
// Chain Invariant
// =============================================================================

#[test]
fn child_index_is_parent_index_plus_one() {
    let mut net = TupleNetwork::new();
    let facts: Vec<_> = (0..4).map(|n| net.facts.insert(Value::Int(n))).collect();

    let mut cursor = root(&mut net, facts[0]);
    for fact in &facts[1..] {
        cursor = child(&mut net, cursor, *fact);
    }

    let leaf = net.tuples.get(cursor).unwrap();
    assert_eq!(leaf.index(), 3);
    assert_eq!(leaf.size(), 4);
    assert_eq!(net.facts_of(cursor).unwrap(), facts);

    for (id, tuple) in net.tuples.iter() {
        assert_eq!(tuple.size(), tuple.index() + 1);
        if let Some(parent) = tuple.left_parent() {
            assert_eq!(net.tuples.get(parent).unwrap().index() + 1, tuple.index(), "{id:?}");
        }
    }
}

// =============================================================================
// Detach
// =============================================================================

#[test]
fn detach_head_middle_tail_singleton() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let ids: Vec<_> = (0..4).map(|_| root(&mut net, fact)).collect();
    let owner = Owner::Fact(fact);

    net.detach(ids[0], Chain::Left).unwrap();
    assert_consistent(&net, owner, &ids[1..]);
    net.detach(ids[2], Chain::Left).unwrap();
    assert_consistent(&net, owner, &[ids[1], ids[3]]);
    net.detach(ids[3], Chain::Left).unwrap();
    assert_consistent(&net, owner, &[ids[1]]);
    net.detach(ids[1], Chain::Left).unwrap();
    assert_consistent(&net, owner, &[]);

    let handle = net.facts.get(fact).unwrap();
    assert!(handle.first_left_tuple().is_none());
}

#[test]
fn detach_twice_is_structural() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let id = root(&mut net, fact);
    net.detach(id, Chain::Left).unwrap();
    let err = net.detach(id, Chain::Left).unwrap_err();
    assert!(!err.is_recoverable());
}

#[test]
fn move_to_end_reorders() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let ids: Vec<_> = (0..3).map(|_| root(&mut net, fact)).collect();
    net.move_to_end(ids[0], Chain::Left).unwrap();
    assert_consistent(&net, Owner::Fact(fact), &[ids[1], ids[2], ids[0]]);
}

proptest! {
    #[test]
    fn any_detach_order_keeps_forward_and_backward_in_agreement(
        order in (1usize..32).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let mut net = TupleNetwork::new();
        let fact = net.facts.insert(Value::Nil);
        let parent = root(&mut net, fact);
        let children: Vec<_> = (0..order.len()).map(|_| child(&mut net, parent, fact)).collect();

        let mut remaining = children.clone();
        for &i in &order {
            net.detach(children[i], Chain::Left).unwrap();
            remaining.retain(|id| *id != children[i]);

            let forward = net.children(Owner::Tuple(parent), Chain::Left).unwrap();
            let mut backward = net.children_rev(Owner::Tuple(parent), Chain::Left).unwrap();
            backward.reverse();
            prop_assert_eq!(&forward, &remaining);
            prop_assert_eq!(&backward, &remaining);

            let parent_tuple = net.tuples.get(parent).unwrap();
            prop_assert_eq!(parent_tuple.first_child(), remaining.first().copied());
            prop_assert_eq!(parent_tuple.last_child(), remaining.last().copied());
        }
    }
}
