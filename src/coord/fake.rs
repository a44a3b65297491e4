//! `FakeCoordGateway`: an in-memory `CoordGateway` backed by
//! `Rc<RefCell<_>>`, the same sharing idiom the teacher crate uses for
//! `ConsumerCoordinator::state`. Exercised by the coordinator's own
//! integration tests; several `Coordinator`s can clone the same instance to
//! simulate a multi-member group sharing one coordination store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::sync::oneshot;
use futures::Future;

use coord::{Broker, CoordGateway, Watch, WatchOutcome};
use errors::ErrorKind;
use support::BoxFuture;
use types::{ConsumerId, ConsumerInfo, GroupId, ThreadId, TopicPartition, INVALID_OFFSET};

#[derive(Default)]
struct Shared {
    brokers: Vec<Broker>,
    topics: HashMap<String, Vec<i32>>,
    consumers: HashMap<ConsumerId, ConsumerInfo>,
    owners: HashMap<(String, i32), ThreadId>,
    offsets: HashMap<(String, i32), i64>,
    in_sync: bool,
    notify_count: usize,

    topic_watchers: Vec<oneshot::Sender<WatchOutcome>>,
    broker_watchers: Vec<oneshot::Sender<WatchOutcome>>,
    consumer_watchers: Vec<oneshot::Sender<WatchOutcome>>,
    change_watchers: Vec<oneshot::Sender<WatchOutcome>>,
}

#[derive(Clone)]
pub struct FakeCoordGateway(Rc<RefCell<Shared>>);

fn watch_dropped() -> ::errors::Error {
    ErrorKind::CoordUnavailable("fake watch sender dropped".to_owned()).into()
}

impl FakeCoordGateway {
    pub fn new() -> Self {
        FakeCoordGateway(Rc::new(RefCell::new(Shared::default())))
    }

    pub fn set_topic(&self, topic: &str, partitions: Vec<i32>) {
        self.0.borrow_mut().topics.insert(topic.to_owned(), partitions);
    }

    pub fn set_offset(&self, topic: &str, partition: i32, offset: i64) {
        self.0.borrow_mut().offsets.insert((topic.to_owned(), partition), offset);
    }

    /// Wakes every watcher currently armed on `/brokers/topics` and
    /// `/consumers/<group>/ids`, the two watches a membership or topic
    /// change in these tests actually needs to fire.
    pub fn fire_topics_changed(&self) {
        let mut shared = self.0.borrow_mut();
        for tx in shared.topic_watchers.drain(..) {
            let _ = tx.send(WatchOutcome::Changed);
        }
    }

    pub fn fire_consumers_changed(&self) {
        let mut shared = self.0.borrow_mut();
        for tx in shared.consumer_watchers.drain(..) {
            let _ = tx.send(WatchOutcome::Changed);
        }
    }

    pub fn owners(&self) -> HashMap<(String, i32), ThreadId> {
        self.0.borrow().owners.clone()
    }

    pub fn registered_consumers(&self) -> Vec<ConsumerId> {
        self.0.borrow().consumers.keys().cloned().collect()
    }

    pub fn notify_count(&self) -> usize {
        self.0.borrow().notify_count
    }

    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.0.borrow().offsets.get(&(topic.to_owned(), partition)).cloned()
    }
}

impl CoordGateway for FakeCoordGateway {
    fn register_consumer(&self, _group: &GroupId, consumer_id: &ConsumerId, info: &ConsumerInfo) -> BoxFuture<()> {
        self.0.borrow_mut().consumers.insert(consumer_id.clone(), info.clone());
        BoxFuture::ok(())
    }

    fn deregister_consumer(&self, _group: &GroupId, consumer_id: &ConsumerId) -> BoxFuture<()> {
        self.0.borrow_mut().consumers.remove(consumer_id);
        BoxFuture::ok(())
    }

    fn get_all_brokers(&self) -> BoxFuture<Vec<Broker>> {
        BoxFuture::ok(self.0.borrow().brokers.clone())
    }

    fn watch_brokers(&self) -> Watch {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().broker_watchers.push(tx);
        BoxFuture::new(rx.map_err(|_| watch_dropped()))
    }

    fn get_topics(&self) -> BoxFuture<Vec<String>> {
        BoxFuture::ok(self.0.borrow().topics.keys().cloned().collect())
    }

    fn watch_topics(&self) -> Watch {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().topic_watchers.push(tx);
        BoxFuture::new(rx.map_err(|_| watch_dropped()))
    }

    fn get_partitions_for_topic(&self, topic: &str) -> BoxFuture<Vec<i32>> {
        BoxFuture::ok(self.0.borrow().topics.get(topic).cloned().unwrap_or_default())
    }

    fn get_consumers_in_group(&self, _group: &GroupId) -> BoxFuture<Vec<(ConsumerId, ConsumerInfo)>> {
        BoxFuture::ok(self.0.borrow().consumers.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn watch_consumers_in_group(&self, _group: &GroupId) -> Watch {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().consumer_watchers.push(tx);
        BoxFuture::new(rx.map_err(|_| watch_dropped()))
    }

    fn watch_group_changes(&self, _group: &GroupId) -> Watch {
        let (tx, rx) = oneshot::channel();
        self.0.borrow_mut().change_watchers.push(tx);
        BoxFuture::new(rx.map_err(|_| watch_dropped()))
    }

    fn claim_partition_ownership(&self, _group: &GroupId, tp: &TopicPartition, thread: &ThreadId) -> BoxFuture<bool> {
        let mut shared = self.0.borrow_mut();
        let key = (tp.topic.clone(), tp.partition);

        match shared.owners.get(&key) {
            Some(existing) if existing != thread => BoxFuture::ok(false),
            _ => {
                shared.owners.insert(key, thread.clone());
                BoxFuture::ok(true)
            }
        }
    }

    fn delete_partition_ownership(&self, _group: &GroupId, tp: &TopicPartition) -> BoxFuture<()> {
        self.0.borrow_mut().owners.remove(&(tp.topic.clone(), tp.partition));
        BoxFuture::ok(())
    }

    fn get_offset(&self, _group: &GroupId, tp: &TopicPartition) -> BoxFuture<i64> {
        let offset = *self.0
            .borrow()
            .offsets
            .get(&(tp.topic.clone(), tp.partition))
            .unwrap_or(&INVALID_OFFSET);
        BoxFuture::ok(offset)
    }

    fn commit_offset(&self, _group: &GroupId, tp: &TopicPartition, offset: i64) -> BoxFuture<()> {
        self.0.borrow_mut().offsets.insert((tp.topic.clone(), tp.partition), offset);
        BoxFuture::ok(())
    }

    fn is_consumer_group_in_sync(&self, _group: &GroupId) -> BoxFuture<bool> {
        BoxFuture::ok(self.0.borrow().in_sync)
    }

    fn create_consumer_group_sync(&self, _group: &GroupId) -> BoxFuture<()> {
        self.0.borrow_mut().in_sync = true;
        BoxFuture::ok(())
    }

    fn delete_consumer_group_sync(&self, _group: &GroupId) -> BoxFuture<()> {
        self.0.borrow_mut().in_sync = false;
        BoxFuture::ok(())
    }

    fn notify_consumer_group(&self, _group: &GroupId, _from_consumer_id: &ConsumerId) -> BoxFuture<()> {
        self.0.borrow_mut().notify_count += 1;
        BoxFuture::ok(())
    }

    fn purge_obsolete_notifications(&self, _group: &GroupId) -> BoxFuture<()> {
        BoxFuture::ok(())
    }
}
