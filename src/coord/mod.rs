//! The typed surface this crate needs from the coordination store.
//!
//! `CoordGateway` is deliberately just a trait, the same way
//! `tokio-kafka::client::Client` is a trait the consumer coordinator
//! consumes without bundling a broker transport. The concrete backend (a
//! ZooKeeper driver, or anything else that offers ephemeral nodes, change
//! notifications, and a flat key/value tree) is supplied by the embedding
//! process.

pub mod paths;

#[cfg(test)]
mod fake;
#[cfg(test)]
pub use self::fake::FakeCoordGateway;

use std::fmt;

use support::BoxFuture;
use types::{ConsumerId, ConsumerInfo, GroupId, ThreadId, TopicPartition};

/// A broker as advertised under `/brokers/ids/*`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    pub id: i32,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.id)
    }
}

/// Outcome of a fired watch: either the watched state changed, or the
/// session backing it was lost and every ephemeral node this process held
/// must be assumed gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    Changed,
    SessionLost,
}

/// A single-shot change notification. Firing once is the contract: the
/// watch loop must call the matching `watch_*` method again to rearm it.
pub type Watch = BoxFuture<WatchOutcome>;

/// Typed operations over the coordination store used by the group-
/// coordination core. Every method that can race a concurrent writer (claim,
/// sync barrier) returns a narrow, explicit result rather than overloading
/// the error channel.
pub trait CoordGateway {
    /// Write the ephemeral `ConsumerInfo` node for this consumer.
    fn register_consumer(
        &self,
        group: &GroupId,
        consumer_id: &ConsumerId,
        info: &ConsumerInfo,
    ) -> BoxFuture<()>;

    /// Remove the ephemeral `ConsumerInfo` node for this consumer. Idempotent.
    fn deregister_consumer(&self, group: &GroupId, consumer_id: &ConsumerId) -> BoxFuture<()>;

    /// Current broker set.
    fn get_all_brokers(&self) -> BoxFuture<Vec<Broker>>;

    /// Arm a one-shot watch on `/brokers/ids`.
    fn watch_brokers(&self) -> Watch;

    /// Current topic universe.
    fn get_topics(&self) -> BoxFuture<Vec<String>>;

    /// Arm a one-shot watch on `/brokers/topics`.
    fn watch_topics(&self) -> Watch;

    /// Partition ids currently assigned to `topic`, read from
    /// `/brokers/topics/<topic>`.
    fn get_partitions_for_topic(&self, topic: &str) -> BoxFuture<Vec<i32>>;

    /// Every `ConsumerInfo` currently registered in the group, keyed by
    /// consumer id.
    fn get_consumers_in_group(&self, group: &GroupId) -> BoxFuture<Vec<(ConsumerId, ConsumerInfo)>>;

    /// Arm a one-shot watch on `/consumers/<group>/ids`.
    fn watch_consumers_in_group(&self, group: &GroupId) -> Watch;

    /// Arm a one-shot watch on `/consumers/<group>/changes`.
    fn watch_group_changes(&self, group: &GroupId) -> Watch;

    /// Attempt to create the ephemeral ownership node for `tp`. Resolves to
    /// `false` (not an error) if another thread already holds it.
    fn claim_partition_ownership(
        &self,
        group: &GroupId,
        tp: &TopicPartition,
        thread: &ThreadId,
    ) -> BoxFuture<bool>;

    /// Delete the ownership node for `tp`. Missing-node is not an error.
    fn delete_partition_ownership(&self, group: &GroupId, tp: &TopicPartition) -> BoxFuture<()>;

    /// Committed offset for `tp`, or `INVALID_OFFSET` if none has ever been
    /// written.
    fn get_offset(&self, group: &GroupId, tp: &TopicPartition) -> BoxFuture<i64>;

    /// Write a committed offset for `tp`.
    fn commit_offset(&self, group: &GroupId, tp: &TopicPartition, offset: i64) -> BoxFuture<()>;

    /// Read the one-bit topic-switch sync barrier.
    fn is_consumer_group_in_sync(&self, group: &GroupId) -> BoxFuture<bool>;

    /// Flip the topic-switch sync barrier on.
    fn create_consumer_group_sync(&self, group: &GroupId) -> BoxFuture<()>;

    /// Clear the topic-switch sync barrier. Best-effort: failures are
    /// logged by the caller, not propagated.
    fn delete_consumer_group_sync(&self, group: &GroupId) -> BoxFuture<()>;

    /// Append a notification node under `/consumers/<group>/changes` to
    /// nudge every other member's watch loop.
    fn notify_consumer_group(&self, group: &GroupId, from_consumer_id: &ConsumerId) -> BoxFuture<()>;

    /// Best-effort cleanup of stale notification nodes.
    fn purge_obsolete_notifications(&self, group: &GroupId) -> BoxFuture<()>;
}
