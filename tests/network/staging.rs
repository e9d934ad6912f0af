//! Integration tests for staging lists

use rulenet_foundation::{FactId, TupleId, Value};
use rulenet_network::{
    Chain, NodeId, Owner, Stage, StageOutcome, StagedTuples, Tuple, TupleKind, TupleNetwork,
};

fn tuple(net: &mut TupleNetwork, fact: FactId) -> TupleId {
    net.alloc_attached(
        Tuple::root(fact, NodeId(0), TupleKind::Left),
        Owner::Fact(fact),
        Chain::Left,
    )
    .unwrap()
}

#[test]
fn insert_then_delete_frees_without_reaching_the_node() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let mut staged = StagedTuples::new();
    let id = tuple(&mut net, fact);
    staged.stage_insert(&mut net.tuples, id).unwrap();

    net.unlink(id).unwrap();
    assert_eq!(
        staged.stage_delete(&mut net.tuples, id).unwrap(),
        StageOutcome::Discarded
    );
    net.tuples.free(id).unwrap();
    assert!(staged.is_empty());
    assert!(net.tuples.is_empty());
    net.facts.remove(fact).unwrap();
}

#[test]
fn lists_drain_independently_in_staging_order() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let mut staged = StagedTuples::new();
    let ids: Vec<_> = (0..6).map(|_| tuple(&mut net, fact)).collect();

    staged.stage_insert(&mut net.tuples, ids[0]).unwrap();
    staged.stage_update(&mut net.tuples, ids[1]).unwrap();
    staged.stage_delete(&mut net.tuples, ids[2]).unwrap();
    staged.stage_insert(&mut net.tuples, ids[3]).unwrap();
    staged.stage_update(&mut net.tuples, ids[4]).unwrap();
    staged.stage_delete(&mut net.tuples, ids[5]).unwrap();

    assert_eq!(staged.ids(&net.tuples, Stage::Delete).unwrap(), vec![ids[2], ids[5]]);
    assert_eq!(staged.ids(&net.tuples, Stage::Update).unwrap(), vec![ids[1], ids[4]]);
    assert_eq!(staged.ids(&net.tuples, Stage::Insert).unwrap(), vec![ids[0], ids[3]]);

    assert_eq!(staged.pop(&mut net.tuples, Stage::Delete).unwrap(), Some(ids[2]));
    assert_eq!(staged.len(Stage::Delete), 1);
    assert_eq!(staged.len(Stage::Insert), 2);
}

#[test]
fn restaging_collapses_to_the_net_change() {
    let mut net = TupleNetwork::new();
    let fact = net.facts.insert(Value::Nil);
    let mut staged = StagedTuples::new();
    let id = tuple(&mut net, fact);

    assert_eq!(staged.stage_update(&mut net.tuples, id).unwrap(), StageOutcome::Staged);
    assert_eq!(
        staged.stage_update(&mut net.tuples, id).unwrap(),
        StageOutcome::AlreadyStaged
    );
    assert_eq!(staged.stage_delete(&mut net.tuples, id).unwrap(), StageOutcome::Staged);
    assert_eq!(
        staged.stage_delete(&mut net.tuples, id).unwrap(),
        StageOutcome::AlreadyStaged
    );
    assert_eq!(net.tuples.get(id).unwrap().stage(), Some(Stage::Delete));
    assert_eq!(staged.len(Stage::Update), 0);
    assert!(staged.stage_insert(&mut net.tuples, id).is_err());
}
