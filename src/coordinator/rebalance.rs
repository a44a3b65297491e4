//! `Rebalance()` / `TryRebalance()`: the retrying reassignment protocol.
//!
//! `rebalance` is the outer retry loop; `try_rebalance` is one attempt at the
//! eleven-step protocol. Every attempt is guarded by `State::rebalancing` so
//! that a watch firing mid-attempt cannot start a second one on the same
//! single-threaded reactor.

use std::collections::BTreeSet;

use futures::future::{self, Future};

use super::Coordinator;
use super::topic_switch;
use assign::AssignmentContext;
use coord::{Broker, CoordGateway};
use errors::{Error, ErrorKind};
use fetch::FetchManager;
use registry::{PartitionTopicInfo, RegistrySnapshot};
use stream::BlockDecoder;
use support::BoxFuture;
use topic_count::{TopicCount, TopicCountPolicy, WildcardTopicCount};
use types::{ConsumerId, ConsumerInfo, ThreadId, TopicPartition, INVALID_OFFSET};

/// Retries `try_rebalance` up to `rebalance_max_retries` times with
/// `rebalance_backoff` between attempts. Exhausting the budget is fatal
/// unless the consumer is shutting down, in which case it is simply
/// abandoned.
pub(crate) fn rebalance<C, F, D>(coordinator: Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    attempt(coordinator, 0)
}

fn attempt<C, F, D>(coordinator: Coordinator<C, F, D>, retries: usize) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    if !coordinator.inner.state.try_begin_rebalance() {
        // Another attempt is already in flight (kicked off by the watch
        // loop or a direct call); let it run rather than stacking a second
        // one on top of it.
        return BoxFuture::ok(());
    }

    let ending = coordinator.clone();
    let attempted = try_rebalance(coordinator.clone()).then(move |result| {
        ending.inner.state.end_rebalance();
        result
    });

    let retrying = coordinator.clone();

    BoxFuture::new(attempted.or_else(move |err| {
        if retrying.inner.state.is_shutting_down.get() {
            return BoxFuture::ok(());
        }

        if retries + 1 >= retrying.inner.rebalance_max_retries {
            return BoxFuture::err(ErrorKind::RebalanceExhausted(retries + 1).into());
        }

        warn!("rebalance attempt {} failed: {}", retries + 1, err);

        let backoff = retrying.inner.rebalance_backoff;
        let next = retrying.clone();

        BoxFuture::new(
            retrying
                .inner
                .timer
                .sleep(backoff)
                .map_err(|err| ErrorKind::CoordUnavailable(err.to_string()).into())
                .and_then(move |_| attempt(next, retries + 1)),
        )
    }))
}

/// One attempt at the eleven-step protocol. Resolves to `Ok(())` both on a
/// completed reassignment and on an intentional short-circuit (waiting on a
/// topic-switch barrier, or a shutdown observed mid-attempt); resolves to
/// `Err` only for conditions the retry loop should back off and retry.
fn try_rebalance<C, F, D>(coordinator: Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let released = {
        let coordinator = coordinator.clone();
        recompute_topic_count(&coordinator).and_then(move |_| release_owned_partitions(&coordinator).map(move |_| coordinator))
    };

    BoxFuture::new(released.and_then(move |coordinator| {
        if coordinator.inner.state.is_shutting_down.get() {
            return BoxFuture::ok(());
        }

        build_context(coordinator)
    }))
}

/// Step 1: if a `Wildcard` policy is installed, rebuild it from a freshly
/// fetched topic list and, if the matched subscription changed, re-advertise
/// our `ConsumerInfo` before anyone reads group membership this attempt.
fn recompute_topic_count<C, F, D>(coordinator: &Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let spec = coordinator.inner.wildcard_filter.borrow().clone();

    let (filter, num_streams) = match spec {
        Some(spec) => spec,
        None => return BoxFuture::ok(()),
    };

    let coordinator = coordinator.clone();
    let exclude_internal = coordinator.inner.exclude_internal_topics;
    let consumer_id = coordinator.inner.consumer_id.clone();

    BoxFuture::new(coordinator.inner.coord.get_topics().and_then(move |all_topics| {
        let policy = WildcardTopicCount::new(consumer_id, &all_topics, &filter, num_streams, exclude_internal);
        let subscription = policy.topics_to_num_streams();
        let changed = *coordinator.inner.last_advertised_subscription.borrow() != subscription;

        coordinator.install_topic_count(TopicCount::Wildcard(policy));

        if !changed {
            return BoxFuture::ok(());
        }

        let info = coordinator.consumer_info();
        *coordinator.inner.last_advertised_subscription.borrow_mut() = info.subscription.clone();

        BoxFuture::new(
            coordinator
                .inner
                .coord
                .register_consumer(&coordinator.inner.group_id, &coordinator.inner.consumer_id, &info),
        )
    }))
}

/// Step 3: release every partition we currently hold before reading group
/// membership, so a crashed-and-restarted peer never sees a stale claim.
fn release_owned_partitions<C, F, D>(coordinator: &Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let snapshot = coordinator.inner.registry.snapshot();
    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();

    let releases: Vec<_> = snapshot
        .iter()
        .map(|info| {
            let tp = info.topic_partition();
            let group = group.clone();
            let coord = coord.clone();

            coord.delete_partition_ownership(&group, &tp).then(move |result| {
                if let Err(err) = result {
                    warn!("releasing ownership of {} failed: {}", tp, err);
                }
                Ok::<(), Error>(())
            })
        })
        .collect();

    BoxFuture::new(future::join_all(releases).map(|_| ()))
}

/// Steps 2 and 4: gather brokers, group membership, the topic-switch state,
/// and the partition universe of every topic subscribed by anyone in the
/// group, then build the `AssignmentContext` the rest of this attempt runs
/// against.
fn build_context<C, F, D>(coordinator: Coordinator<C, F, D>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();

    let brokers = coord.get_all_brokers();
    let members = coord.get_consumers_in_group(&group);
    let in_sync = coord.is_consumer_group_in_sync(&group);

    BoxFuture::new(
        brokers
            .join3(members, in_sync)
            .and_then(move |(all_brokers, all_consumers_in_group, is_in_sync)| {
                fetch_all_topic_partitions(coordinator, all_consumers_in_group, all_brokers, is_in_sync)
            }),
    )
}

fn fetch_all_topic_partitions<C, F, D>(
    coordinator: Coordinator<C, F, D>,
    all_consumers_in_group: Vec<(ConsumerId, ConsumerInfo)>,
    all_brokers: Vec<Broker>,
    is_in_sync: bool,
) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let mut topics: BTreeSet<String> = BTreeSet::new();
    for &(_, ref info) in &all_consumers_in_group {
        for topic in info.subscription.keys() {
            topics.insert(topic.clone());
        }
    }

    let mut state = ::assign::GroupState::default();
    for &(_, ref info) in &all_consumers_in_group {
        if let Some(desired) = info.pattern.desired() {
            state.is_group_topic_switch_in_progress = true;
            state.desired_pattern = Some(desired.to_owned());
            state.desired_topic_count_map = info.subscription.clone();
        }
    }
    state.is_group_topic_switch_in_sync = is_in_sync;

    let coord = coordinator.inner.coord.clone();
    let fetches: Vec<_> = topics
        .into_iter()
        .map(move |topic| {
            let coord = coord.clone();
            let topic_for_map = topic.clone();

            coord.get_partitions_for_topic(&topic).map(move |partitions| {
                partitions
                    .into_iter()
                    .map(|p| TopicPartition::new(topic_for_map.clone(), p))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    BoxFuture::new(future::join_all(fetches).and_then(move |groups| {
        let all_topic_partitions: Vec<TopicPartition> = groups.into_iter().flat_map(|g| g).collect();

        let ctx = AssignmentContext::new(
            coordinator.inner.group_id.clone(),
            coordinator.inner.consumer_id.clone(),
            all_consumers_in_group,
            all_brokers,
            all_topic_partitions,
            state,
            coordinator.inner.state.in_topic_switch.get(),
        );

        apply_topic_switch_state(coordinator, ctx)
    }))
}

/// Step 5: branch on the group's topic-switch state before running the
/// assigner. Short-circuits this attempt (returns without assigning
/// anything) while a switch is being advertised or awaiting sync.
fn apply_topic_switch_state<C, F, D>(coordinator: Coordinator<C, F, D>, ctx: AssignmentContext) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    BoxFuture::new(topic_switch::handle_group_switch_state(&coordinator, &ctx).and_then(move |short_circuit| {
        if short_circuit {
            BoxFuture::ok(())
        } else {
            run_assignment(coordinator, ctx)
        }
    }))
}

/// Steps 6 through 9: assign, then fetch (and resolve, where invalid) a
/// starting offset for every partition assigned to us.
fn run_assignment<C, F, D>(coordinator: Coordinator<C, F, D>, ctx: AssignmentContext) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let assignment = coordinator.inner.assignors[0].assign(&ctx);

    let mut owned: Vec<(TopicPartition, ThreadId)> = assignment
        .into_iter()
        .filter(|&(_, ref thread_id)| thread_id.consumer_id == coordinator.inner.consumer_id)
        .collect();
    owned.sort_by(|a, b| a.0.cmp(&b.0));

    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();
    let fetch_manager = coordinator.inner.fetch_manager.clone();
    let auto_offset_reset = coordinator.inner.auto_offset_reset;

    let offsets: Vec<_> = owned
        .iter()
        .map(|&(ref tp, _)| {
            let tp = tp.clone();
            let group = group.clone();
            let coord = coord.clone();
            let fetch_manager = fetch_manager.clone();

            coord.get_offset(&group, &tp).and_then(move |offset| {
                if offset == INVALID_OFFSET {
                    BoxFuture::new(fetch_manager.resolve_offset(&tp, auto_offset_reset))
                } else {
                    BoxFuture::ok(offset)
                }
            })
        })
        .collect();

    BoxFuture::new(future::join_all(offsets).and_then(move |offsets| {
        // Step 8: a shutdown observed after kicking off these fetches
        // abandons the attempt cleanly rather than claiming ownership we
        // are about to release again.
        if coordinator.inner.state.is_shutting_down.get() {
            return BoxFuture::ok(());
        }

        let owned_with_offsets = owned.into_iter().zip(offsets.into_iter()).collect();
        claim_and_publish(coordinator, owned_with_offsets)
    }))
}

/// Step 10 and 11: claim ownership of every assigned partition, rolling
/// back on the first contended claim; on full success, build and publish
/// the new Registry and hand it to the `FetchManager`.
fn claim_and_publish<C, F, D>(coordinator: Coordinator<C, F, D>, owned: Vec<((TopicPartition, ThreadId), i64)>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();

    let claims: Vec<_> = owned
        .iter()
        .map(|&((ref tp, ref thread_id), _)| {
            let tp = tp.clone();
            let thread_id = thread_id.clone();
            let group = group.clone();

            coord
                .claim_partition_ownership(&group, &tp, &thread_id)
                .map(move |claimed| (tp, thread_id, claimed))
        })
        .collect();

    BoxFuture::new(future::join_all(claims).and_then(move |claims| {
        let contended = claims
            .iter()
            .find(|&&(_, _, claimed)| !claimed)
            .map(|&(ref tp, _, _)| tp.clone());

        if let Some(tp) = contended {
            let group = coordinator.inner.group_id.clone();
            let coord = coordinator.inner.coord.clone();

            let rollback: Vec<_> = claims
                .iter()
                .filter(|&&(_, _, claimed)| claimed)
                .map(|&(ref tp, _, _)| {
                    let tp = tp.clone();
                    let group = group.clone();
                    let coord = coord.clone();

                    coord.delete_partition_ownership(&group, &tp).then(|result| {
                        if let Err(err) = result {
                            warn!("rolling back claim failed: {}", err);
                        }
                        Ok::<(), Error>(())
                    })
                })
                .collect();

            return BoxFuture::new(future::join_all(rollback).then(move |_| Err::<(), Error>(ErrorKind::PartitionContended(tp).into())));
        }

        publish_registry(coordinator, owned)
    }))
}

fn publish_registry<C, F, D>(coordinator: Coordinator<C, F, D>, owned: Vec<((TopicPartition, ThreadId), i64)>) -> BoxFuture<()>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let mut infos = Vec::with_capacity(owned.len());

    {
        let streams = coordinator.inner.streams.borrow();

        for ((tp, thread_id), offset) in owned {
            let key = (tp.topic.clone(), thread_id);

            let stream = match streams.get(&key) {
                Some(stream) => stream.clone(),
                None => {
                    return BoxFuture::err(
                        ErrorKind::InconsistentGroupState(format!("no stream allocated for {} thread {}", tp, key.1)).into(),
                    )
                }
            };

            infos.push(PartitionTopicInfo {
                topic: tp.topic,
                partition: tp.partition,
                stream: stream,
                consumed_offset: offset,
                fetched_offset: offset,
                fetch_size: coordinator.inner.fetch_size,
                client_id: coordinator.inner.consumer_id.clone(),
            });
        }
    }

    let snapshot: RegistrySnapshot = infos.clone().into_iter().collect();
    coordinator.inner.registry.replace(snapshot);

    BoxFuture::new(coordinator.inner.fetch_manager.start_connections(infos))
}
