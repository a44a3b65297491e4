//! Range assignor: divides each topic's partitions into contiguous ranges
//! across the threads subscribed to it, handing any remainder to the
//! lexicographically-earliest threads. Standard Kafka range-assignment
//! behaviour, operating per-topic rather than over the flattened universe.

use std::collections::HashMap;

use assign::{AssignmentContext, AssignmentStrategy, Assigner};
use types::{ThreadId, TopicPartition};

pub struct RangeAssignor;

impl Assigner for RangeAssignor {
    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::Range
    }

    fn assign(&self, ctx: &AssignmentContext) -> HashMap<TopicPartition, ThreadId> {
        let threads_per_topic = ctx.thread_ids_per_topic();
        let mut result = HashMap::new();

        for (topic, threads) in &threads_per_topic {
            if threads.is_empty() {
                continue;
            }

            let threads: Vec<&ThreadId> = threads.iter().collect();

            let mut partitions: Vec<&TopicPartition> = ctx
                .all_topic_partitions
                .iter()
                .filter(|tp| &tp.topic == topic)
                .collect();
            partitions.sort();

            let num_threads = threads.len();
            let num_partitions = partitions.len();
            let base = num_partitions / num_threads;
            let extra = num_partitions % num_threads;

            let mut start = 0;

            for (i, thread) in threads.iter().enumerate() {
                let count = base + if i < extra { 1 } else { 0 };

                for tp in &partitions[start..start + count] {
                    result.insert((*tp).clone(), (*thread).clone());
                }

                start += count;
            }
        }

        result
    }
}
