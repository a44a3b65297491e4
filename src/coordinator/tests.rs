//! Integration tests for the rebalance/watch/shutdown state machine,
//! exercised against `FakeCoordGateway` rather than a real coordination
//! store, the way the teacher crate's own integration tests stand up an
//! in-memory `Client` double instead of a live broker.

use std::rc::Rc;
use std::time::Duration;

use tokio_core::reactor::Core;

use assign::{self, AssignmentStrategy};
use coord::{CoordGateway, FakeCoordGateway};
use fetch::tests::NullFetchManager;
use stream::tests::NullDecoder;
use types::AutoOffsetReset;

use super::Coordinator;

fn new_coordinator(
    core: &Core,
    consumer_id: &str,
    gateway: FakeCoordGateway,
) -> Coordinator<FakeCoordGateway, NullFetchManager, NullDecoder> {
    Coordinator::new(
        core.handle(),
        consumer_id.to_owned(),
        "g".to_owned(),
        4,
        Duration::from_millis(10),
        10,
        1024,
        1,
        AutoOffsetReset::Largest,
        true,
        Duration::from_millis(20),
        vec![assign::assignor_for(AssignmentStrategy::Range)],
        Rc::new(gateway),
        Rc::new(NullFetchManager),
        Rc::new(NullDecoder),
    )
}

/// Polls `condition` while driving the reactor, tolerant of the watch
/// loop's 2-second debounce between a `Changed` event and the rebalance it
/// triggers.
fn run_until<F: Fn() -> bool>(core: &mut Core, condition: F) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        core.turn(Some(Duration::from_millis(20)));
    }
    assert!(condition(), "condition did not become true before timeout");
}

#[test]
fn single_consumer_static_claims_every_partition() {
    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0, 1, 2, 3]);

    let coordinator = new_coordinator(&core, "c0", gateway.clone());
    let mut topic_count_map = ::std::collections::HashMap::new();
    topic_count_map.insert("t".to_owned(), 2u32);

    let streams = coordinator.create_message_streams(topic_count_map).unwrap();
    assert_eq!(streams.get("t").map(|s| s.len()), Some(2));

    let mut core = core;
    run_until(&mut core, || coordinator.registry().snapshot().len() == 4);

    let owners = gateway.owners();
    assert_eq!(owners.len(), 4);
    for thread in owners.values() {
        assert_eq!(thread.consumer_id, "c0");
    }
}

#[test]
fn second_call_to_create_message_streams_is_rejected() {
    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0]);

    let coordinator = new_coordinator(&core, "c0", gateway);
    let mut map = ::std::collections::HashMap::new();
    map.insert("t".to_owned(), 1u32);

    assert!(coordinator.create_message_streams(map.clone()).is_ok());
    assert!(coordinator.create_message_streams(map).is_err());
}

#[test]
fn two_consumers_split_partitions_without_double_ownership() {
    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0, 1, 2, 3]);

    let c0 = new_coordinator(&core, "c0", gateway.clone());
    let c1 = new_coordinator(&core, "c1", gateway.clone());

    let mut map = ::std::collections::HashMap::new();
    map.insert("t".to_owned(), 1u32);

    c0.create_message_streams(map.clone()).unwrap();

    let mut core = core;
    run_until(&mut core, || !gateway.owners().is_empty());

    c1.create_message_streams(map).unwrap();
    gateway.fire_consumers_changed();

    run_until(&mut core, || c1.registry().snapshot().len() > 0 && c0.registry().snapshot().len() > 0);

    let owners = gateway.owners();
    assert_eq!(owners.len(), 4);

    let c0_owned = owners.values().filter(|t| t.consumer_id == "c0").count();
    let c1_owned = owners.values().filter(|t| t.consumer_id == "c1").count();
    assert_eq!(c0_owned + c1_owned, 4);
    assert!(c0_owned >= 1 && c1_owned >= 1);
}

#[test]
fn close_releases_every_owned_partition_and_deregisters() {
    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0, 1]);

    let coordinator = new_coordinator(&core, "c0", gateway.clone());
    let mut map = ::std::collections::HashMap::new();
    map.insert("t".to_owned(), 1u32);
    coordinator.create_message_streams(map).unwrap();

    let mut core = core;
    run_until(&mut core, || coordinator.registry().snapshot().len() == 2);
    assert_eq!(gateway.owners().len(), 2);

    let closed = coordinator.close();
    core.run(closed).unwrap();

    run_until(&mut core, || gateway.owners().is_empty());
    assert!(gateway.registered_consumers().is_empty());
}

#[test]
fn ack_on_unowned_partition_returns_not_owner() {
    use errors::ErrorKind;

    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0]);

    let coordinator = new_coordinator(&core, "c0", gateway);
    let mut core = core;

    let result = core.run(coordinator.ack("t".to_owned(), 0, 5));
    match result {
        Err(::errors::Error(ErrorKind::NotOwner(ref tp), _)) => {
            assert_eq!(tp.topic, "t");
            assert_eq!(tp.partition, 0);
        }
        Ok(()) => panic!("expected NotOwner, got Ok"),
        Err(other) => panic!("expected NotOwner, got {}", other),
    }
}

#[test]
fn ack_on_owned_partition_commits_the_offset() {
    let core = Core::new().unwrap();
    let gateway = FakeCoordGateway::new();
    gateway.set_topic("t", vec![0]);

    let coordinator = new_coordinator(&core, "c0", gateway.clone());
    let mut map = ::std::collections::HashMap::new();
    map.insert("t".to_owned(), 1u32);
    coordinator.create_message_streams(map).unwrap();

    let mut core = core;
    run_until(&mut core, || coordinator.registry().snapshot().len() == 1);

    core.run(coordinator.ack("t".to_owned(), 0, 42)).unwrap();

    // `ack` only stages the offset; the background flush loop writes it
    // through on `ack_flush_interval`.
    run_until(&mut core, || gateway.committed_offset("t", 0) == Some(42));
}
