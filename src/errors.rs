//! Crate-wide error taxonomy.
//!
//! Mirrors the taxonomy from the design: transient coordination-store faults
//! and contended claims are retried by the caller, unsupported configuration
//! and retry exhaustion are fatal, and `NotOwner` is a normal, non-fatal
//! outcome of racing an `ack` against a rebalance.

use types::TopicPartition;

error_chain!{
    foreign_links {
        Json(::serde_json::Error);
        IoError(::std::io::Error);
    }

    errors {
        /// The coordination store could not be reached, or the session backing
        /// our ephemeral nodes was lost. Recoverable: reinstall watches, retry.
        CoordUnavailable(reason: String) {
            description("coordination store unavailable")
            display("coordination store unavailable: {}", reason)
        }

        /// `claim_partition_ownership` found the node already held by another
        /// thread. Recoverable: release partial claims, backoff, retry.
        PartitionContended(tp: TopicPartition) {
            description("partition ownership contended")
            display("partition {:?} already owned by another thread", tp)
        }

        /// The group's membership or metadata could not be assembled into a
        /// consistent `AssignmentContext`. Recoverable: retry.
        InconsistentGroupState(reason: String) {
            description("inconsistent group state")
            display("inconsistent group state: {}", reason)
        }

        /// `offsetsStorage` names a backend this crate does not implement.
        /// Fatal: surfaced at `ConsumerBuilder::build` time.
        UnsupportedOffsetsStorage(name: String) {
            description("unsupported offsets storage")
            display("unsupported offsets storage `{}`, only \"zookeeper\" is supported", name)
        }

        /// `partitionAssignmentStrategy` names a strategy this crate does not
        /// implement.
        UnsupportedAssignmentStrategy(name: String) {
            description("unsupported partition assignment strategy")
            display("unsupported partition assignment strategy `{}`", name)
        }

        /// `rebalance` exhausted `rebalance_max_retries` without success and
        /// the consumer was not shutting down. Fatal.
        RebalanceExhausted(attempts: usize) {
            description("rebalance exhausted its retry budget")
            display("rebalance failed after {} attempts", attempts)
        }

        /// `ack` was called for a partition this consumer does not currently
        /// own (lost to a rebalance). Non-fatal.
        NotOwner(tp: TopicPartition) {
            description("partition not owned by this consumer")
            display("partition {:?} is not owned by this consumer", tp)
        }

        /// A fetched block failed to decode into messages. The caller logs
        /// and skips the block; this variant lets that path still flow
        /// through `Result`.
        Decode(reason: String) {
            description("failed to decode a fetched block")
            display("failed to decode block: {}", reason)
        }
    }
}
