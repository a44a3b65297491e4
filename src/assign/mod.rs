//! `Assigner`: the pure function at the center of the rebalance protocol.
//!
//! Every member of a group runs assignment independently against the same
//! `AssignmentContext` and must converge on the same map without any
//! additional coordination — determinism and a total order over consumers,
//! threads, and partitions is what makes that possible.

mod range;
mod round_robin;

pub use self::range::RangeAssignor;
pub use self::round_robin::RoundRobinAssignor;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use coord::Broker;
use errors::{Error, ErrorKind};
use types::{ConsumerId, ConsumerInfo, GroupId, ThreadId, TopicPartition};

/// Group-wide state relevant to the topic-switch sub-protocol, folded into
/// the assignment context so `TryRebalance` can make its step-5 decisions
/// from one value.
#[derive(Clone, Debug, Default)]
pub struct GroupState {
    pub is_group_topic_switch_in_progress: bool,
    pub is_group_topic_switch_in_sync: bool,
    pub desired_topic_count_map: BTreeMap<String, u32>,
    pub desired_pattern: Option<String>,
}

/// Everything an `Assigner` needs, reconstructed fresh on every rebalance
/// attempt from the group's current `ConsumerInfo` nodes.
#[derive(Clone, Debug)]
pub struct AssignmentContext {
    pub group: GroupId,
    pub consumer_id: ConsumerId,
    /// Sorted by consumer id so independent members agree on iteration order.
    pub all_consumers_in_group: Vec<(ConsumerId, ConsumerInfo)>,
    pub all_brokers: Vec<Broker>,
    pub all_topic_partitions: Vec<TopicPartition>,
    pub state: GroupState,
    pub in_topic_switch: bool,
}

impl AssignmentContext {
    pub fn new(
        group: GroupId,
        consumer_id: ConsumerId,
        mut all_consumers_in_group: Vec<(ConsumerId, ConsumerInfo)>,
        all_brokers: Vec<Broker>,
        all_topic_partitions: Vec<TopicPartition>,
        state: GroupState,
        in_topic_switch: bool,
    ) -> Self {
        all_consumers_in_group.sort_by(|a, b| a.0.cmp(&b.0));

        AssignmentContext {
            group: group,
            consumer_id: consumer_id,
            all_consumers_in_group: all_consumers_in_group,
            all_brokers: all_brokers,
            all_topic_partitions: all_topic_partitions,
            state: state,
            in_topic_switch: in_topic_switch,
        }
    }

    /// `topic -> sorted set of ThreadId` across every member of the group,
    /// reconstructed from each member's advertised `subscription`.
    pub fn thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>> {
        let mut result: BTreeMap<String, BTreeSet<ThreadId>> = BTreeMap::new();

        for &(ref consumer_id, ref info) in &self.all_consumers_in_group {
            for (topic, &count) in &info.subscription {
                let entry = result.entry(topic.clone()).or_insert_with(BTreeSet::new);

                for i in 0..count {
                    entry.insert(ThreadId::new(consumer_id.clone(), i));
                }
            }
        }

        result
    }
}

/// Partition assignment strategy, selected by `partitionAssignmentStrategy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentStrategy {
    Range,
    RoundRobin,
}

impl FromStr for AssignmentStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "range" => Ok(AssignmentStrategy::Range),
            "roundrobin" => Ok(AssignmentStrategy::RoundRobin),
            other => Err(ErrorKind::UnsupportedAssignmentStrategy(other.to_owned()).into()),
        }
    }
}

/// A deterministic, complete, disjoint mapping from `AssignmentContext` to
/// partition ownership.
pub trait Assigner {
    fn strategy(&self) -> AssignmentStrategy;

    fn assign(&self, ctx: &AssignmentContext) -> HashMap<TopicPartition, ThreadId>;
}

/// Build the assignor named by `partitionAssignmentStrategy`.
pub fn assignor_for(strategy: AssignmentStrategy) -> Box<Assigner> {
    match strategy {
        AssignmentStrategy::Range => Box::new(RangeAssignor),
        AssignmentStrategy::RoundRobin => Box::new(RoundRobinAssignor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Pattern;

    pub fn consumer_info(topics: &[(&str, u32)]) -> ConsumerInfo {
        ConsumerInfo::new(
            topics.iter().map(|&(t, c)| (t.to_owned(), c)).collect(),
            Pattern::Static,
        )
    }

    #[test]
    fn strategy_parses_known_names_only() {
        assert_eq!("range".parse::<AssignmentStrategy>().unwrap(), AssignmentStrategy::Range);
        assert_eq!(
            "roundrobin".parse::<AssignmentStrategy>().unwrap(),
            AssignmentStrategy::RoundRobin
        );
        assert!("sticky".parse::<AssignmentStrategy>().is_err());
    }

    #[test]
    fn thread_ids_per_topic_unions_every_member() {
        let ctx = AssignmentContext::new(
            "g".to_owned(),
            "c0".to_owned(),
            vec![
                ("c0".to_owned(), consumer_info(&[("t", 2)])),
                ("c1".to_owned(), consumer_info(&[("t", 1)])),
            ],
            vec![],
            (0..4).map(|p| TopicPartition::new("t", p)).collect(),
            GroupState::default(),
            false,
        );

        let per_topic = ctx.thread_ids_per_topic();
        assert_eq!(per_topic["t"].len(), 3);
    }
}
