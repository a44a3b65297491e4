//! `Registry`: the single, locally authoritative ownership map produced by
//! the last successful rebalance.
//!
//! Readers (the `FetchManager`) and the sole writer (the Coordinator, from
//! inside `TryRebalance`) never see a torn view: `replace` swaps an `Rc`
//! behind a `RefCell`, so a concurrent `snapshot` either sees the old map in
//! full or the new one in full, never a mix — the single-threaded-reactor
//! analogue of an atomic pointer swap.

use std::collections::HashMap;
use std::rc::Rc;

use stream::StreamHandle;
use types::TopicPartition;

/// Per-partition state installed by the Coordinator at the end of a
/// successful rebalance.
#[derive(Clone)]
pub struct PartitionTopicInfo {
    pub topic: String,
    pub partition: i32,
    /// Shared with every other partition of the same topic owned by the
    /// same thread.
    pub stream: StreamHandle,
    pub consumed_offset: i64,
    pub fetched_offset: i64,
    pub fetch_size: u32,
    pub client_id: String,
}

impl PartitionTopicInfo {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// An immutable snapshot of ownership, as seen by the `FetchManager` and by
/// `Registry::snapshot` callers.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    by_topic: HashMap<String, HashMap<i32, PartitionTopicInfo>>,
}

impl RegistrySnapshot {
    pub fn get(&self, tp: &TopicPartition) -> Option<&PartitionTopicInfo> {
        self.by_topic.get(&tp.topic).and_then(|partitions| partitions.get(&tp.partition))
    }

    pub fn len(&self) -> usize {
        self.by_topic.values().map(|partitions| partitions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionTopicInfo> {
        self.by_topic.values().flat_map(|partitions| partitions.values())
    }

    pub fn topics(&self) -> impl Iterator<Item = &String> {
        self.by_topic.keys()
    }
}

impl ::std::iter::FromIterator<PartitionTopicInfo> for RegistrySnapshot {
    fn from_iter<I: IntoIterator<Item = PartitionTopicInfo>>(iter: I) -> Self {
        let mut by_topic: HashMap<String, HashMap<i32, PartitionTopicInfo>> = HashMap::new();

        for info in iter {
            by_topic
                .entry(info.topic.clone())
                .or_insert_with(HashMap::new)
                .insert(info.partition, info);
        }

        RegistrySnapshot { by_topic: by_topic }
    }
}

/// The sole mutator is `replace`, called only by the Coordinator under its
/// `rebalanceLock`. Many readers may call `snapshot` concurrently with a
/// `replace`.
pub struct Registry {
    current: ::std::cell::RefCell<Rc<RegistrySnapshot>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            current: ::std::cell::RefCell::new(Rc::new(RegistrySnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> Rc<RegistrySnapshot> {
        self.current.borrow().clone()
    }

    pub fn replace(&self, new: RegistrySnapshot) {
        *self.current.borrow_mut() = Rc::new(new);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
