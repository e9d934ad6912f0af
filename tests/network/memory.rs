//! Integration tests for indexed tuple memories

use rulenet_foundation::{FactId, TupleId, Value};
use rulenet_network::{Chain, MemoryId, NodeId, Owner, Tuple, TupleKind, TupleMemory, TupleNetwork};

fn network() -> (TupleNetwork, FactId) {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    (net, fact)
}

fn tuple(net: &mut TupleNetwork, fact: FactId) -> TupleId {
    net.alloc_attached(
        Tuple::root(fact, NodeId(0), TupleKind::Right),
        Owner::Fact(fact),
        Chain::Right,
    )
    .unwrap()
}

#[test]
fn full_iterator_visits_sparse_buckets_in_order() {
    let (mut net, fact) = network();
    let mut memory = TupleMemory::with_capacity(MemoryId(1), 10);

    let t0 = tuple(&mut net, fact);
    let t5 = tuple(&mut net, fact);
    let t9 = tuple(&mut net, fact);
    memory.add(&mut net.tuples, t9, 9).unwrap();
    memory.add(&mut net.tuples, t0, 0).unwrap();
    memory.add(&mut net.tuples, t5, 5).unwrap();

    let all: Vec<_> = memory.full_iter(&net.tuples).collect();
    assert_eq!(all, vec![t0, t5, t9]);

    let extra: Vec<_> = (0..3).map(|_| tuple(&mut net, fact)).collect();
    for (n, id) in extra.iter().enumerate() {
        memory.add(&mut net.tuples, *id, 10 * (n as u64 + 1)).unwrap();
    }

    let all: Vec<_> = memory.full_iter(&net.tuples).collect();
    assert_eq!(all.len(), 6);
    assert_eq!(all, vec![t0, extra[0], extra[1], extra[2], t5, t9]);
    assert_eq!(memory.bucket_len(0), 4);
    assert_eq!(memory.bucket(&net.tuples, 5).collect::<Vec<_>>(), vec![t5]);
    assert_eq!(memory.bucket(&net.tuples, 19).collect::<Vec<_>>(), vec![t9]);
}

#[test]
fn tuples_remember_their_memory_and_hash() {
    let (mut net, fact) = network();
    let mut memory = TupleMemory::new(MemoryId(7));
    let id = tuple(&mut net, fact);
    memory.add(&mut net.tuples, id, 1234).unwrap();

    let stored = net.tuples.get(id).unwrap();
    assert_eq!(stored.memory(), Some(MemoryId(7)));
    assert_eq!(stored.memory_hash(), Some(1234));

    memory.remove(&mut net.tuples, id).unwrap();
    assert!(net.tuples.get(id).unwrap().memory().is_none());
    assert!(memory.is_empty());
}

#[test]
fn tuple_in_a_memory_cannot_be_freed() {
    let (mut net, fact) = network();
    let mut memory = TupleMemory::new(MemoryId(0));
    let id = tuple(&mut net, fact);
    net.detach(id, Chain::Right).unwrap();
    memory.add(&mut net.tuples, id, 3).unwrap();

    assert!(net.tuples.free(id).is_err());
    memory.remove(&mut net.tuples, id).unwrap();
    net.tuples.free(id).unwrap();
    assert!(net.tuples.get(id).is_err());
}

#[test]
fn resize_preserves_contents() {
    let (mut net, fact) = network();
    let mut memory = TupleMemory::with_capacity(MemoryId(0), 2);
    let ids: Vec<_> = (0..8).map(|_| tuple(&mut net, fact)).collect();
    for (n, id) in ids.iter().enumerate() {
        memory.add(&mut net.tuples, *id, n as u64).unwrap();
    }
    memory.resize(&mut net.tuples, 16).unwrap();

    let mut all: Vec<_> = memory.full_iter(&net.tuples).collect();
    all.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(all, expected);
    assert_eq!(memory.capacity(), 16);
    assert_eq!(memory.bucket(&net.tuples, 3).collect::<Vec<_>>(), vec![ids[3]]);
}
