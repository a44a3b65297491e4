//! `Coordinator`: the state machine at the center of the crate.
//!
//! Owns the watch loop, the rebalance loop with retry/backoff, the
//! topic-switch sub-protocol, and the shutdown sequence — orchestrating
//! every other component (`TopicCountPolicy`, `Assigner`, `CoordGateway`,
//! `Registry`, `StreamFanout`, `FetchManager`) the way `ConsumerCoordinator`
//! orchestrates `Client` in the teacher crate, on the same single-threaded
//! reactor, with all shared state behind `Rc<RefCell<_>>`.

mod ack_flush;
mod rebalance;
#[cfg(test)]
mod tests;
mod topic_switch;
mod watch;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::sync::oneshot;
use futures::Future;
use tokio_core::reactor::Handle;
use tokio_timer::Timer;

use assign::{AssignmentStrategy, Assigner};
use coord::CoordGateway;
use errors::{Error, ErrorKind, Result};
use fetch::FetchManager;
use registry::Registry;
use stream::{BlockDecoder, ConsumerStream, StreamFanout, StreamHandle};
use support::BoxFuture;
use topic_count::TopicCount;
use types::{ConsumerId, GroupId, ThreadId, TopicPartition};

/// `Coordinator.isShuttingDown` / in-flight-rebalance bookkeeping. Kept as
/// plain `Cell`s rather than a tagged enum: the flags are independent
/// (shutdown can arrive mid-rebalance) and every transition is monotonic or
/// trivially idempotent.
struct State {
    /// Guards `Rebalance`: only one attempt runs at a time. The watch loop
    /// and direct calls (`create_message_streams`, `switch_topic`) both
    /// check this before starting one, which is what makes the
    /// `rebalanceLock` in the design a single boolean rather than a real
    /// mutex on a single-threaded reactor.
    rebalancing: Cell<bool>,
    is_shutting_down: Cell<bool>,
    in_topic_switch: Cell<bool>,
    registered: Cell<bool>,
}

impl State {
    fn new() -> Self {
        State {
            rebalancing: Cell::new(false),
            is_shutting_down: Cell::new(false),
            in_topic_switch: Cell::new(false),
            registered: Cell::new(false),
        }
    }

    fn try_begin_rebalance(&self) -> bool {
        if self.rebalancing.get() {
            false
        } else {
            self.rebalancing.set(true);
            true
        }
    }

    fn end_rebalance(&self) {
        self.rebalancing.set(false);
    }
}

pub(crate) struct Inner<C, F, D> {
    pub(crate) handle: Handle,
    pub(crate) timer: Rc<Timer>,
    pub(crate) consumer_id: ConsumerId,
    pub(crate) group_id: GroupId,
    pub(crate) rebalance_max_retries: usize,
    pub(crate) rebalance_backoff: Duration,
    pub(crate) ack_flush_interval: Duration,
    pub(crate) queued_max_messages: usize,
    pub(crate) fetch_size: u32,
    /// Default `numStreams` for `create_message_streams_by_filter` when the
    /// caller passes `0`.
    pub(crate) num_consumer_fetchers: u32,
    pub(crate) auto_offset_reset: ::types::AutoOffsetReset,
    pub(crate) exclude_internal_topics: bool,

    pub(crate) coord: Rc<C>,
    pub(crate) fetch_manager: Rc<F>,
    pub(crate) decoder: Rc<D>,
    pub(crate) assignors: Vec<Box<Assigner>>,

    pub(crate) registry: Registry,
    state: State,

    /// The currently-active `TopicCountPolicy`; replaced wholesale by
    /// `create_message_streams[_by_filter]` and by the topic-switch
    /// sub-protocol. `None` before the first subscription is installed.
    pub(crate) topic_count: RefCell<Option<TopicCount>>,

    /// Set only by `create_message_streams_by_filter`; lets the rebalance
    /// loop rebuild a `WildcardTopicCount` from a freshly fetched topic list
    /// on every attempt instead of caching a stale match.
    pub(crate) wildcard_filter: RefCell<Option<(::topic_count::TopicFilter, u32)>>,

    /// The `subscription` map last written to our own `ConsumerInfo`. Used
    /// to tell whether a recomputed `Wildcard` policy needs to be
    /// re-advertised before this attempt reads the group's membership.
    pub(crate) last_advertised_subscription: RefCell<::std::collections::BTreeMap<String, u32>>,

    /// `(topic, threadId) -> StreamHandle`, the block-queue/close-signal
    /// side of every `Stream` this consumer currently owns. Mutated only
    /// during `create_message_streams[_by_filter]` and rebalance; read
    /// elsewhere.
    pub(crate) streams: RefCell<HashMap<(String, ThreadId), StreamHandle>>,

    /// Highest offset `Ack`ed per partition since the last flush tick.
    /// `Ack` itself only stages here; `ack_flush` drains it on
    /// `ack_flush_interval` and writes through `CoordGateway::commit_offset`.
    pub(crate) pending_acks: RefCell<HashMap<TopicPartition, i64>>,

    /// Fired once `close()` has released ownership and deregistered; the
    /// watch loop holds the sender, `close()` returns the receiver wrapped
    /// in `BoxFuture`.
    close_finished_tx: RefCell<Option<oneshot::Sender<()>>>,
    unsubscribe_tx: RefCell<Option<oneshot::Sender<()>>>,
}

/// The orchestrator itself. Cheaply `Clone`: every field of substance lives
/// behind the shared `Inner`.
pub struct Coordinator<C, F, D> {
    pub(crate) inner: Rc<Inner<C, F, D>>,
}

impl<C, F, D> Clone for Coordinator<C, F, D> {
    fn clone(&self) -> Self {
        Coordinator { inner: self.inner.clone() }
    }
}

impl<C, F, D> Coordinator<C, F, D>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    pub fn new(
        handle: Handle,
        consumer_id: ConsumerId,
        group_id: GroupId,
        rebalance_max_retries: usize,
        rebalance_backoff: Duration,
        queued_max_messages: usize,
        fetch_size: u32,
        num_consumer_fetchers: u32,
        auto_offset_reset: ::types::AutoOffsetReset,
        exclude_internal_topics: bool,
        ack_flush_interval: Duration,
        assignors: Vec<Box<Assigner>>,
        coord: Rc<C>,
        fetch_manager: Rc<F>,
        decoder: Rc<D>,
    ) -> Self {
        let inner = Rc::new(Inner {
            handle: handle,
            timer: Rc::new(Timer::default()),
            consumer_id: consumer_id,
            group_id: group_id,
            rebalance_max_retries: rebalance_max_retries,
            rebalance_backoff: rebalance_backoff,
            ack_flush_interval: ack_flush_interval,
            queued_max_messages: queued_max_messages,
            fetch_size: fetch_size,
            num_consumer_fetchers: num_consumer_fetchers,
            auto_offset_reset: auto_offset_reset,
            exclude_internal_topics: exclude_internal_topics,
            coord: coord,
            fetch_manager: fetch_manager,
            decoder: decoder,
            assignors: assignors,
            registry: Registry::new(),
            state: State::new(),
            topic_count: RefCell::new(None),
            wildcard_filter: RefCell::new(None),
            last_advertised_subscription: RefCell::new(::std::collections::BTreeMap::new()),
            streams: RefCell::new(HashMap::new()),
            pending_acks: RefCell::new(HashMap::new()),
            close_finished_tx: RefCell::new(None),
            unsubscribe_tx: RefCell::new(None),
        });

        Coordinator { inner: inner }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Allocates one `Stream` per `(topic, threadIndex)`, installs a
    /// `Static` policy, registers with the group, and triggers the first
    /// rebalance. May be called once per consumer.
    pub fn create_message_streams(
        &self,
        topic_count_map: HashMap<String, u32>,
    ) -> Result<HashMap<String, Vec<ConsumerStream>>> {
        if self.inner.state.registered.get() {
            bail!("create_message_streams may only be called once per consumer");
        }
        self.inner.state.registered.set(true);

        let topic_counts: ::std::collections::BTreeMap<String, u32> = topic_count_map.into_iter().collect();
        let policy = ::topic_count::StaticTopicCount::new(self.inner.consumer_id.clone(), topic_counts);
        let streams = self.allocate_streams(&policy);
        *self.inner.topic_count.borrow_mut() = Some(TopicCount::Static(policy));

        self.kick_off_first_rebalance();

        Ok(streams)
    }

    /// Same as `create_message_streams`, but with a `Wildcard` policy: one
    /// stream per thread, not per topic. The caller does not know the topic
    /// universe yet, so the first allocation happens once the first
    /// rebalance has resolved the matched topic set; until then this method
    /// allocates zero streams and the first rebalance installs the rest by
    /// calling back into `allocate_streams` once it knows the matched
    /// topics.
    pub fn create_message_streams_by_filter(
        &self,
        filter: ::topic_count::TopicFilter,
        num_streams: u32,
    ) -> Result<()> {
        if self.inner.state.registered.get() {
            bail!("create_message_streams_by_filter may only be called once per consumer");
        }
        self.inner.state.registered.set(true);

        let num_streams = if num_streams == 0 { self.inner.num_consumer_fetchers } else { num_streams };

        let policy = ::topic_count::WildcardTopicCount::new(
            self.inner.consumer_id.clone(),
            &[],
            &filter,
            num_streams,
            self.inner.exclude_internal_topics,
        );
        *self.inner.topic_count.borrow_mut() = Some(TopicCount::Wildcard(policy));
        *self.inner.wildcard_filter.borrow_mut() = Some((filter, num_streams));

        self.kick_off_first_rebalance();

        Ok(())
    }

    /// The `ConsumerInfo` this consumer currently advertises, built from
    /// whichever `TopicCountPolicy` is installed.
    pub(crate) fn consumer_info(&self) -> ::types::ConsumerInfo {
        use topic_count::TopicCountPolicy;

        let policy = self.inner.topic_count.borrow();
        let policy = policy.as_ref().expect("topic_count installed before consumer_info is read");

        ::types::ConsumerInfo::new(policy.topics_to_num_streams(), policy.pattern())
    }

    fn kick_off_first_rebalance(&self) {
        let coordinator = self.clone();
        let info = self.consumer_info();
        *self.inner.last_advertised_subscription.borrow_mut() = info.subscription.clone();

        let start = self.inner
            .coord
            .register_consumer(&self.inner.group_id, &self.inner.consumer_id, &info)
            .then(move |result| {
                if let Err(err) = result {
                    error!("initial registration failed: {}", err);
                }
                rebalance::rebalance(coordinator)
            })
            .then(|result| {
                if let Err(err) = result {
                    error!("initial rebalance failed: {}", err);
                }
                Ok(())
            });

        self.inner.handle.spawn(start);

        watch::spawn_watch_loop(self.clone());
        ack_flush::spawn_ack_flush_loop(self.clone());
    }

    /// Allocates one `Stream` per `(topic, threadId)` this policy says we
    /// own, records the handle in `self.streams`, and returns the user-
    /// facing half grouped by topic.
    fn allocate_streams(&self, policy: &::topic_count::TopicCountPolicy) -> HashMap<String, Vec<ConsumerStream>> {
        use topic_count::TopicCountPolicy;

        let mut result: HashMap<String, Vec<ConsumerStream>> = HashMap::new();
        let mut streams = self.inner.streams.borrow_mut();

        for (topic, thread_ids) in policy.consumer_thread_ids_per_topic() {
            for thread_id in thread_ids {
                let key = (topic.clone(), thread_id.clone());

                if streams.contains_key(&key) {
                    continue;
                }

                let (stream, handle) = StreamFanout::create(
                    &self.inner.handle,
                    topic.clone(),
                    thread_id.clone(),
                    self.inner.queued_max_messages,
                    self.inner.decoder.clone(),
                );

                streams.insert(key, handle);
                result.entry(topic.clone()).or_insert_with(Vec::new).push(stream);
            }
        }

        result
    }

    /// Installs `policy` as the active `TopicCountPolicy` and allocates any
    /// `Stream`s it names that do not already exist. Used both by the
    /// rebalance loop (recomputing a `Wildcard` policy every attempt) and by
    /// the topic-switch sub-protocol (adopting the converged policy).
    pub(crate) fn install_topic_count(&self, policy: TopicCount) {
        self.allocate_streams(&policy);
        *self.inner.topic_count.borrow_mut() = Some(policy);
    }

    /// Writes a `ConsumerInfo` whose pattern is `switch/<desiredPattern>`
    /// and broadcasts a group notification. Does not change the local
    /// Registry synchronously; the next rebalance sees
    /// `IsGroupTopicSwitchInProgress` and converges.
    pub fn switch_topic(&self, new_topic_count_map: HashMap<String, u32>, desired_pattern: String) -> BoxFuture<()> {
        let coordinator = self.clone();

        BoxFuture::new(
            topic_switch::advertise_switch(self.clone(), new_topic_count_map, desired_pattern).map(move |_| {
                coordinator.inner.handle.spawn(rebalance::rebalance(coordinator.clone()).then(|result| {
                    if let Err(err) = result {
                        error!("rebalance after topic switch advertisement failed: {}", err);
                    }
                    Ok(())
                }));
            }),
        )
    }

    /// Stages an offset commit for `(topic, partition)`; the background
    /// flush loop writes it through `CoordGateway::commit_offset` on
    /// `ack_flush_interval`, so this never blocks on store I/O. An ack for a
    /// partition no longer owned returns `ErrNotOwner` rather than staging
    /// anything.
    pub fn ack(&self, topic: String, partition: i32, offset: i64) -> BoxFuture<()> {
        let tp = TopicPartition::new(topic, partition);

        if self.inner.registry.snapshot().get(&tp).is_none() {
            return BoxFuture::err(ErrorKind::NotOwner(tp).into());
        }

        self.inner
            .pending_acks
            .borrow_mut()
            .entry(tp)
            .and_modify(|existing| {
                if offset > *existing {
                    *existing = offset;
                }
            })
            .or_insert(offset);

        BoxFuture::ok(())
    }

    /// Initiates graceful shutdown; resolves once ownership has been
    /// released and the consumer has been deregistered.
    pub fn close(&self) -> BoxFuture<()> {
        if self.inner.state.is_shutting_down.get() {
            return BoxFuture::ok(());
        }
        self.inner.state.is_shutting_down.set(true);

        let (tx, rx) = oneshot::channel();
        *self.inner.close_finished_tx.borrow_mut() = Some(tx);

        for stream in self.inner.streams.borrow().values() {
            stream.close();
        }

        let coordinator = self.clone();
        let flushing_acks = self.clone();
        let fetch_manager = self.inner.fetch_manager.clone();

        // Flush any still-staged acks before the fetch manager tears down and
        // ownership is released, so a commit a caller already observed as
        // `Ok` from `ack()` isn't lost to this shutdown.
        let shutdown = ack_flush::flush_once(&flushing_acks)
            .then(move |_| fetch_manager.close())
            .then(move |result| {
                if let Err(ref err) = result {
                    warn!("fetch manager close failed: {}", err);
                }

                if let Some(tx) = coordinator.inner.unsubscribe_tx.borrow_mut().take() {
                    let _ = tx.send(());
                }

                Ok(())
            });

        self.inner.handle.spawn(shutdown);

        BoxFuture::new(rx.map_err(|_| ErrorKind::CoordUnavailable("close cancelled".to_owned()).into()))
    }

    pub(crate) fn finish_close(&self) {
        let mut streams = self.inner.streams.borrow_mut();

        for ((_, thread_id), _) in streams.drain() {
            trace!("released stream for thread {}", thread_id);
        }

        if let Some(tx) = self.inner.close_finished_tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    }
}

/// The public API surface a consuming process drives, mirroring
/// `tokio-kafka::consumer::Consumer`: a trait implemented by `GroupConsumer`
/// so embedders can depend on the contract rather than the concrete type
/// parameterized over `CoordGateway`/`FetchManager`/`BlockDecoder`.
pub trait Consumer {
    fn create_message_streams(
        &self,
        topic_count_map: HashMap<String, u32>,
    ) -> Result<HashMap<String, Vec<ConsumerStream>>>;

    fn create_message_streams_by_filter(&self, filter: ::topic_count::TopicFilter, num_streams: u32) -> Result<()>;

    fn switch_topic(&self, new_topic_count_map: HashMap<String, u32>, desired_pattern: String) -> BoxFuture<()>;

    fn ack(&self, topic: String, partition: i32, offset: i64) -> BoxFuture<()>;

    fn close(&self) -> BoxFuture<()>;
}

impl<C, F, D> Consumer for Coordinator<C, F, D>
where
    C: CoordGateway + 'static,
    F: FetchManager + 'static,
    D: BlockDecoder + 'static,
{
    fn create_message_streams(
        &self,
        topic_count_map: HashMap<String, u32>,
    ) -> Result<HashMap<String, Vec<ConsumerStream>>> {
        Coordinator::create_message_streams(self, topic_count_map)
    }

    fn create_message_streams_by_filter(&self, filter: ::topic_count::TopicFilter, num_streams: u32) -> Result<()> {
        Coordinator::create_message_streams_by_filter(self, filter, num_streams)
    }

    fn switch_topic(&self, new_topic_count_map: HashMap<String, u32>, desired_pattern: String) -> BoxFuture<()> {
        Coordinator::switch_topic(self, new_topic_count_map, desired_pattern)
    }

    fn ack(&self, topic: String, partition: i32, offset: i64) -> BoxFuture<()> {
        Coordinator::ack(self, topic, partition, offset)
    }

    fn close(&self) -> BoxFuture<()> {
        Coordinator::close(self)
    }
}
