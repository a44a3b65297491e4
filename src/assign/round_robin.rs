//! Round-robin assignor: lays every subscribed partition, sorted, against a
//! single sorted list of threads, skipping threads not subscribed to a given
//! partition's topic. Deterministic and complete even when members have
//! heterogeneous subscriptions (plain Kafka round-robin assumes a uniform
//! subscription; this generalizes it to the wildcard/topic-switch case).

use std::collections::{BTreeSet, HashMap};

use assign::{AssignmentContext, AssignmentStrategy, Assigner};
use types::{ThreadId, TopicPartition};

pub struct RoundRobinAssignor;

impl Assigner for RoundRobinAssignor {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::RoundRobin
    }

    fn assign(&self, ctx: &AssignmentContext) -> HashMap<TopicPartition, ThreadId> {
        let threads_per_topic = ctx.thread_ids_per_topic();

        let mut all_threads: BTreeSet<ThreadId> = BTreeSet::new();
        for threads in threads_per_topic.values() {
            all_threads.extend(threads.iter().cloned());
        }
        let all_threads: Vec<ThreadId> = all_threads.into_iter().collect();

        let mut result = HashMap::new();

        if all_threads.is_empty() {
            return result;
        }

        let mut partitions: Vec<&TopicPartition> = ctx.all_topic_partitions.iter().collect();
        partitions.sort();

        let mut cursor = 0usize;

        for tp in partitions {
            let eligible = match threads_per_topic.get(&tp.topic) {
                Some(threads) if !threads.is_empty() => threads,
                _ => continue,
            };

            for _ in 0..all_threads.len() {
                let candidate = &all_threads[cursor % all_threads.len()];
                cursor += 1;

                if eligible.contains(candidate) {
                    result.insert(tp.clone(), candidate.clone());
                    break;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assign::GroupState;
    use types::{ConsumerInfo, Pattern};

    fn info(topics: &[(&str, u32)]) -> ConsumerInfo {
        ConsumerInfo::new(topics.iter().map(|&(t, c)| (t.to_owned(), c)).collect(), Pattern::Static)
    }

    #[test]
    fn assignment_is_disjoint_and_complete() {
        let ctx = AssignmentContext::new(
            "g".to_owned(),
            "c0".to_owned(),
            vec![
                ("c0".to_owned(), info(&[("t", 1)])),
                ("c1".to_owned(), info(&[("t", 1)])),
            ],
            vec![],
            (0..6).map(|p| TopicPartition::new("t", p)).collect(),
            GroupState::default(),
            false,
        );

        let assignment = RoundRobinAssignor.assign(&ctx);
        assert_eq!(assignment.len(), 6);

        let c0 = assignment.values().filter(|t| t.consumer_id == "c0").count();
        let c1 = assignment.values().filter(|t| t.consumer_id == "c1").count();
        assert_eq!(c0, 3);
        assert_eq!(c1, 3);
    }

    #[test]
    fn two_independent_runs_over_the_same_context_agree() {
        let ctx = AssignmentContext::new(
            "g".to_owned(),
            "c0".to_owned(),
            vec![
                ("c0".to_owned(), info(&[("t", 2)])),
                ("c1".to_owned(), info(&[("t", 2)])),
            ],
            vec![],
            (0..4).map(|p| TopicPartition::new("t", p)).collect(),
            GroupState::default(),
            false,
        );

        let a = RoundRobinAssignor.assign(&ctx);
        let b = RoundRobinAssignor.assign(&ctx);
        assert_eq!(a, b);
    }
}
