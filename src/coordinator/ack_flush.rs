//! Background flush of staged `Ack` offsets.
//!
//! `Coordinator::ack` never blocks on store I/O: it stages the highest
//! acked offset per partition in `Inner::pending_acks` and returns
//! immediately. This loop drains that stage on `ack_flush_interval` and
//! writes each partition's offset through `CoordGateway::commit_offset`,
//! the same periodic-drain idiom `watch.rs` uses for its debounce sleep.

use std::collections::HashMap;

use futures::future::{self, loop_fn, Future, Loop};

use super::Coordinator;
use coord::CoordGateway;
use fetch::FetchManager;
use stream::BlockDecoder;
use types::TopicPartition;

pub(crate) fn spawn_ack_flush_loop<C, F, D>(coordinator: Coordinator<C, F, D>)
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let handle = coordinator.inner.handle.clone();

    let looping = loop_fn(coordinator, |coordinator| {
        if coordinator.inner.state.is_shutting_down.get() {
            let flushing = flush_once(&coordinator);
            return Box::new(flushing.then(|_| Ok::<_, ()>(Loop::Break(())))) as Box<Future<Item = Loop<(), _>, Error = ()>>;
        }

        let interval = coordinator.inner.ack_flush_interval;

        Box::new(coordinator.inner.timer.sleep(interval).then(move |_| {
            flush_once(&coordinator).then(move |_| Ok::<_, ()>(Loop::Continue(coordinator)))
        })) as Box<Future<Item = Loop<(), _>, Error = ()>>
    });

    handle.spawn(looping);
}

/// Drains every staged offset and writes it through `commit_offset`.
/// Individual write failures are logged and re-staged for the next tick
/// rather than retried inline — a transient store fault should not block
/// the next partition's flush.
pub(crate) fn flush_once<C, F, D>(coordinator: &Coordinator<C, F, D>) -> Box<Future<Item = (), Error = ()>>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    let staged: HashMap<TopicPartition, i64> = coordinator.inner.pending_acks.borrow_mut().drain().collect();

    if staged.is_empty() {
        return Box::new(future::ok(()));
    }

    let group = coordinator.inner.group_id.clone();
    let coord = coordinator.inner.coord.clone();
    let coordinator = coordinator.clone();

    let writes: Vec<_> = staged
        .into_iter()
        .map(move |(tp, offset)| {
            let group = group.clone();
            let coord = coord.clone();
            let coordinator = coordinator.clone();
            let tp_for_requeue = tp.clone();

            coord.commit_offset(&group, &tp, offset).then(move |result| {
                if let Err(err) = result {
                    warn!("flushing acked offset for {} failed, will retry next tick: {}", tp_for_requeue, err);
                    coordinator
                        .inner
                        .pending_acks
                        .borrow_mut()
                        .entry(tp_for_requeue)
                        .and_modify(|existing| {
                            if offset > *existing {
                                *existing = offset;
                            }
                        })
                        .or_insert(offset);
                }
                Ok::<(), ()>(())
            })
        })
        .collect();

    Box::new(future::join_all(writes).map(|_| ()))
}
