//! The watch loop: re-arms the four coordination-store watches after every
//! firing, debounces a burst of `Changed` events into one rebalance, and
//! tears ownership down once `Coordinator::close` signals unsubscribe.

use std::time::Duration;

use futures::future::{self, loop_fn, Future, Loop};
use futures::sync::oneshot;

use super::rebalance;
use super::Coordinator;
use coord::{CoordGateway, WatchOutcome};
use fetch::FetchManager;
use stream::BlockDecoder;

/// Debounce window between a `Changed` watch firing and the rebalance it
/// triggers, so a burst of near-simultaneous membership changes (several
/// consumers restarting at once) collapses into a single rebalance instead
/// of one per event.
fn debounce_window() -> Duration {
    Duration::from_secs(2)
}

pub(crate) fn spawn_watch_loop<C, F, D>(coordinator: Coordinator<C, F, D>)
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let (tx, rx) = oneshot::channel();
    *coordinator.inner.unsubscribe_tx.borrow_mut() = Some(tx);

    let watching = loop_fn(coordinator.clone(), watch_once);

    let on_unsubscribe = coordinator.clone();
    let teardown = rx.then(move |_| shutdown(on_unsubscribe));

    coordinator.inner.handle.spawn(watching.select(teardown).then(|_| Ok(())));
}

/// Arms all four watches, waits for the first to fire, and reports what
/// should happen next: `Loop::Continue` to rearm and keep watching.
/// Individual watch failures are treated as `SessionLost` rather than
/// stopping the loop — reinstalling every watch is the right reaction to a
/// lost session regardless of which one noticed it first.
fn watch_once<C, F, D>(coordinator: Coordinator<C, F, D>) -> Box<Future<Item = Loop<(), Coordinator<C, F, D>>, Error = ()>>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();

    let topics = coord.watch_topics();
    let brokers = coord.watch_brokers();
    let consumers = coord.watch_consumers_in_group(&group);
    let changes = coord.watch_group_changes(&group);

    let watches: Vec<Box<Future<Item = WatchOutcome, Error = ()>>> = vec![
        Box::new(topics.or_else(|err| {
            warn!("topics watch failed: {}", err);
            future::ok(WatchOutcome::SessionLost)
        })),
        Box::new(brokers.or_else(|err| {
            warn!("brokers watch failed: {}", err);
            future::ok(WatchOutcome::SessionLost)
        })),
        Box::new(consumers.or_else(|err| {
            warn!("group membership watch failed: {}", err);
            future::ok(WatchOutcome::SessionLost)
        })),
        Box::new(changes.or_else(|err| {
            warn!("group changes watch failed: {}", err);
            future::ok(WatchOutcome::SessionLost)
        })),
    ];

    let coordinator = coordinator.clone();

    Box::new(future::select_all(watches).then(move |result| {
        let outcome = match result {
            Ok((outcome, _idx, _rest)) => outcome,
            Err((_err, _idx, _rest)) => WatchOutcome::SessionLost,
        };

        on_watch_fired(coordinator, outcome)
    }))
}

fn on_watch_fired<C, F, D>(coordinator: Coordinator<C, F, D>, outcome: WatchOutcome) -> Box<Future<Item = Loop<(), Coordinator<C, F, D>>, Error = ()>>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    // Session loss reinstalls every watch (the next `watch_once` call does
    // that unconditionally) but does not itself trigger a rebalance — the
    // membership/topic/broker state hasn't necessarily changed, only our
    // view of it went stale.
    if outcome == WatchOutcome::SessionLost {
        warn!("coordination-store session lost; reinstalling watches");
        return Box::new(future::ok(Loop::Continue(coordinator)));
    }

    Box::new(coordinator.inner.timer.sleep(debounce_window()).then(move |_| {
        let rebalancing = coordinator.clone();

        coordinator.inner.handle.spawn(rebalance::rebalance(rebalancing).then(|result| {
            if let Err(err) = result {
                error!("rebalance triggered by a watch event failed: {}", err);
            }
            Ok(())
        }));

        Ok(Loop::Continue(coordinator))
    }))
}

/// Releases every partition we currently own, deregisters our `ConsumerInfo`,
/// and signals `Coordinator::close`'s caller. Runs once, when
/// `unsubscribe_tx` fires.
fn shutdown<C, F, D>(coordinator: Coordinator<C, F, D>) -> Box<Future<Item = (), Error = ()>>
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
                    warn!("releasing ownership of {} during shutdown failed: {}", tp, err);
                }
                Ok::<(), ()>(())
            })
        })
        .collect();

    let consumer_id = coordinator.inner.consumer_id.clone();
    let coord = coordinator.inner.coord.clone();
    let coordinator2 = coordinator.clone();

    Box::new(future::join_all(releases).then(move |_| {
        coord.deregister_consumer(&group, &consumer_id).then(move |result| {
            if let Err(err) = result {
                warn!("deregistering consumer during shutdown failed: {}", err);
            }

            coordinator2.finish_close();

            Ok(())
        })
    }))
}
