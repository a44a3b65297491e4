//! `FetchManager`: the per-broker fetch loop this crate drives but does not
//! implement. Modeled as a trait for the same reason `CoordGateway` is: the
//! broker wire protocol is out of scope for the group-coordination core.

use registry::PartitionTopicInfo;
use support::BoxFuture;
use types::{AutoOffsetReset, TopicPartition};

/// Consumes the Registry's current ownership as an opaque snapshot; computes
/// its own deltas against whatever it was previously given. The Coordinator
/// never inspects or retains a handle back into the fetch path, breaking the
/// Consumer/FetchManager reference cycle the design notes call out.
pub trait FetchManager {
    /// Install a new target partition set, replacing whatever was given to
    /// the last call. Implementations compute the delta (start/stop
    /// per-broker connections) internally.
    fn start_connections(&self, partitions: Vec<PartitionTopicInfo>) -> BoxFuture<()>;

    /// Resolve `INVALID_OFFSET` against the broker's earliest/latest log
    /// offset for `tp`. Only called at rebalance time for a partition whose
    /// committed offset has never been written; the coordination store has
    /// no notion of log offsets, so this has to come from whatever holds the
    /// broker connection.
    fn resolve_offset(&self, tp: &TopicPartition, reset: AutoOffsetReset) -> BoxFuture<i64>;

    /// Tear down every connection and stop fetching. Resolves once all
    /// in-flight fetches have been abandoned or completed.
    fn close(&self) -> BoxFuture<()>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A `FetchManager` that never starts a connection and resolves every
    /// offset to zero; used where a test only needs the type to satisfy a
    /// bound, not to exercise fetch behavior.
    pub struct NullFetchManager;

    impl FetchManager for NullFetchManager {
        fn start_connections(&self, _partitions: Vec<PartitionTopicInfo>) -> BoxFuture<()> {
            BoxFuture::ok(())
        }

        fn resolve_offset(&self, _tp: &TopicPartition, _reset: AutoOffsetReset) -> BoxFuture<i64> {
            BoxFuture::ok(0)
        }

        fn close(&self) -> BoxFuture<()> {
            BoxFuture::ok(())
        }
    }
}
