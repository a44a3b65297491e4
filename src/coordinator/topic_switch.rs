//! The topic-switch sub-protocol: lets a running consumer group move to a
//! new subscription without a coordinated restart.
//!
//! One member calls `Coordinator::switch_topic`, which advertises a
//! `switch/<desiredPattern>` `ConsumerInfo` and notifies the group. Every
//! member's next rebalance attempt sees the advertisement (step 5 of
//! `TryRebalance`), joins by advertising its own switch `ConsumerInfo`, and
//! waits at the sync barrier until every member has done the same. The last
//! member to observe a fully-synced group flips the barrier, adopts the
//! final subscription, and lets the next ordinary rebalance assign it.

use std::collections::HashMap;

use futures::future::Future;

use super::Coordinator;
use assign::AssignmentContext;
use coord::CoordGateway;
use errors::Error;
use fetch::FetchManager;
use stream::BlockDecoder;
use support::BoxFuture;
use topic_count::{StaticTopicCount, SwitchTopicCount, TopicCount, TopicCountPolicy};
use types::ConsumerInfo;

/// Advertises `new_topic_count_map`/`desired_pattern` as a topic switch and
/// wakes the rest of the group. Does not itself wait for the switch to
/// converge; the caller's next rebalance (triggered right after this
/// resolves) observes `IsGroupTopicSwitchInProgress` and carries the rest of
/// the protocol forward.
pub(crate) fn advertise_switch<C, F, D>(
    coordinator: Coordinator<C, F, D>,
    new_topic_count_map: HashMap<String, u32>,
    desired_pattern: String,
) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    if coordinator.inner.state.in_topic_switch.get() {
        return BoxFuture::err(::errors::ErrorKind::InconsistentGroupState("a topic switch is already in progress".to_owned()).into());
    }

    coordinator.inner.state.in_topic_switch.set(true);

    let topic_counts = new_topic_count_map.into_iter().collect();
    let policy = SwitchTopicCount::new(coordinator.inner.consumer_id.clone(), topic_counts, desired_pattern);
    let info = ConsumerInfo::new(policy.topics_to_num_streams(), policy.pattern());

    coordinator.install_topic_count(TopicCount::Switch(policy));
    *coordinator.inner.last_advertised_subscription.borrow_mut() = info.subscription.clone();

    let group = coordinator.inner.group_id.clone();
    let consumer_id = coordinator.inner.consumer_id.clone();
    let coord = coordinator.inner.coord.clone();
    let coord2 = coord.clone();
    let group2 = group.clone();

    BoxFuture::new(
        coord
            .register_consumer(&group, &consumer_id, &info)
            .and_then(move |_| coord2.notify_consumer_group(&group2, &consumer_id)),
    )
}

/// Step 5 of `TryRebalance`. Returns `true` when this attempt should
/// short-circuit without running the assigner (we just advertised our own
/// switch, or we are waiting on peers to catch up); `false` once every
/// member has converged and ordinary assignment should proceed.
pub(crate) fn handle_group_switch_state<C, F, D>(coordinator: &Coordinator<C, F, D>, ctx: &AssignmentContext) -> BoxFuture<bool>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    if !ctx.state.is_group_topic_switch_in_progress {
        coordinator.inner.state.in_topic_switch.set(false);
        return BoxFuture::new(clear_sync_barrier(coordinator.clone()).map(|_| false));
    }

    if !coordinator.inner.state.in_topic_switch.get() {
        // A peer started a switch; join it with our own advertisement of the
        // same target subscription.
        let topic_count_map: HashMap<String, u32> = ctx.state.desired_topic_count_map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let desired_pattern = ctx.state.desired_pattern.clone().unwrap_or_else(|| "static".to_owned());

        return BoxFuture::new(advertise_switch(coordinator.clone(), topic_count_map, desired_pattern).map(|_| true));
    }

    if !ctx.state.is_group_topic_switch_in_sync {
        // We've advertised; every member hasn't yet. Wait for the next
        // notification-triggered rebalance rather than spinning.
        return BoxFuture::ok(true);
    }

    finalize_switch(coordinator.clone(), ctx)
}

/// Best-effort cleanup run on every ordinary (non-switch) rebalance attempt:
/// clears the one-bit sync barrier and purges stale notification nodes so a
/// later switch starts from a clean barrier instead of reading stale
/// `in_sync` state left over from the last one. Failures are logged, not
/// propagated — this step never blocks ordinary assignment.
fn clear_sync_barrier<C, F, D>(coordinator: Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();
    let coord2 = coord.clone();
    let group2 = group.clone();

    BoxFuture::new(
        coord
            .delete_consumer_group_sync(&group)
            .then(|result| {
                if let Err(err) = result {
                    warn!("clearing topic-switch sync barrier failed: {}", err);
                }
                Ok::<(), Error>(())
            })
            .and_then(move |_| {
                coord2.purge_obsolete_notifications(&group2).then(|result| {
                    if let Err(err) = result {
                        warn!("purging obsolete group notifications failed: {}", err);
                    }
                    Ok::<(), Error>(())
                })
            }),
    )
}

/// Every member has advertised the switch and the barrier reads in sync:
/// flip it, adopt the converged subscription as a plain `Static` policy, and
/// notify the group so the short-circuited rebalances still waiting wake up
/// and run ordinary assignment.
fn finalize_switch<C, F, D>(coordinator: Coordinator<C, F, D>, ctx: &AssignmentContext) -> BoxFuture<bool>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let group = coordinator.inner.group_id.clone();
    let consumer_id = coordinator.inner.consumer_id.clone();
    let coord = coordinator.inner.coord.clone();
    let topic_counts = ctx.state.desired_topic_count_map.clone();

    let coordinator2 = coordinator.clone();
    let coord2 = coord.clone();
    let group2 = group.clone();
    let consumer_id2 = consumer_id.clone();
    let topic_counts2 = topic_counts.clone();

    BoxFuture::new(coord.create_consumer_group_sync(&group).and_then(move |_| {
        let policy = StaticTopicCount::new(consumer_id2.clone(), topic_counts2);
        let info = ConsumerInfo::new(policy.topics_to_num_streams(), policy.pattern());

        coordinator2.install_topic_count(TopicCount::Static(policy));
        *coordinator2.inner.last_advertised_subscription.borrow_mut() = info.subscription.clone();
        coordinator2.inner.state.in_topic_switch.set(false);

        let coord3 = coord2.clone();
        let group3 = group2.clone();
        let consumer_id3 = consumer_id2.clone();

        coord2
            .register_consumer(&group2, &consumer_id2, &info)
            .and_then(move |_| coord3.notify_consumer_group(&group3, &consumer_id3))
            .map(|_| true)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assign::GroupState;
    use coord::FakeCoordGateway;
    use fetch::tests::NullFetchManager;
    use stream::tests::NullDecoder;
    use tokio_core::reactor::Core;
    use types::AutoOffsetReset;

    fn new_coordinator(core: &Core, gateway: FakeCoordGateway) -> Coordinator<FakeCoordGateway, NullFetchManager, NullDecoder> {
        Coordinator::new(
            core.handle(),
            "c0".to_owned(),
            "g".to_owned(),
            4,
            ::std::time::Duration::from_millis(10),
            10,
            1024,
            1,
            AutoOffsetReset::Largest,
            true,
            ::std::time::Duration::from_millis(20),
            vec![::assign::assignor_for(::assign::AssignmentStrategy::Range)],
            ::std::rc::Rc::new(gateway),
            ::std::rc::Rc::new(NullFetchManager),
            ::std::rc::Rc::new(NullDecoder),
        )
    }

    fn no_switch_context(coordinator: &Coordinator<FakeCoordGateway, NullFetchManager, NullDecoder>) -> AssignmentContext {
        AssignmentContext::new(
            "g".to_owned(),
            coordinator.inner.consumer_id.clone(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            GroupState::default(),
            false,
        )
    }

    #[test]
    fn ordinary_rebalance_clears_a_stale_sync_barrier() {
        let mut core = Core::new().unwrap();
        let gateway = FakeCoordGateway::new();
        let coordinator = new_coordinator(&core, gateway.clone());

        core.run(gateway.create_consumer_group_sync(&"g".to_owned())).unwrap();
        assert!(core.run(gateway.is_consumer_group_in_sync(&"g".to_owned())).unwrap());

        let ctx = no_switch_context(&coordinator);
        let short_circuit = core.run(handle_group_switch_state(&coordinator, &ctx)).unwrap();

        assert!(!short_circuit);
        assert!(!core.run(gateway.is_consumer_group_in_sync(&"g".to_owned())).unwrap());
    }

    #[test]
    fn ordinary_rebalance_with_no_barrier_set_is_a_no_op() {
        let mut core = Core::new().unwrap();
        let gateway = FakeCoordGateway::new();
        let coordinator = new_coordinator(&core, gateway.clone());

        let ctx = no_switch_context(&coordinator);
        let short_circuit = core.run(handle_group_switch_state(&coordinator, &ctx)).unwrap();

        assert!(!short_circuit);
        assert!(!core.run(gateway.is_consumer_group_in_sync(&"g".to_owned())).unwrap());
    }
}
