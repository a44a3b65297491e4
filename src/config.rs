//! `ConsumerConfig`: validated, typed configuration consumed by the
//! Coordinator and its collaborators. Reading these values from a TOML file
//! or CLI flags is out of scope; this is the struct such a loader would
//! populate.

use std::time::Duration;

use assign::AssignmentStrategy;
use errors::{ErrorKind, Result};
use types::AutoOffsetReset;

pub const DEFAULT_NUM_CONSUMER_FETCHERS: u32 = 1;
pub const DEFAULT_FETCH_MESSAGE_MAX_BYTES: u32 = 1_024 * 1_024;
pub const DEFAULT_QUEUED_MAX_MESSAGES: usize = 2_000;
pub const DEFAULT_REBALANCE_MAX_RETRIES: usize = 4;
pub const DEFAULT_REBALANCE_BACKOFF_MILLIS: u64 = 2_000;
pub const DEFAULT_ZOOKEEPER_SESSION_TIMEOUT_MILLIS: u64 = 6_000;
pub const DEFAULT_ZOOKEEPER_CONNECTION_TIMEOUT_MILLIS: u64 = 6_000;
pub const DEFAULT_ACK_FLUSH_INTERVAL_MILLIS: u64 = 1_000;

/// The only `offsetsStorage` value this crate implements.
pub const SUPPORTED_OFFSETS_STORAGE: &str = "zookeeper";

/// Validated configuration for a `GroupConsumer`.
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Prefix used when generating this process's `ConsumerId`, the way
    /// `go_kafka_client` derives a consumer id from a configured prefix plus
    /// a generated suffix rather than accepting a caller-supplied id
    /// outright.
    pub client_id: String,
    pub group_id: String,
    pub zookeeper_connect: Vec<String>,
    pub zookeeper_session_timeout: Duration,
    pub zookeeper_connection_timeout: Duration,

    pub num_consumer_fetchers: u32,
    pub fetch_message_max_bytes: u32,
    pub queued_max_messages: usize,

    pub rebalance_max_retries: usize,
    pub rebalance_backoff: Duration,

    /// How often staged `Ack` offsets are flushed to the coordination store.
    /// `Ack` itself never blocks on store I/O; it stages the offset and a
    /// background task drains the stage on this interval.
    pub ack_flush_interval: Duration,

    pub offsets_storage: String,
    pub auto_offset_reset: AutoOffsetReset,
    pub exclude_internal_topics: bool,
    pub partition_assignment_strategy: AssignmentStrategy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            client_id: "consumer".to_owned(),
            group_id: String::new(),
            zookeeper_connect: Vec::new(),
            zookeeper_session_timeout: Duration::from_millis(DEFAULT_ZOOKEEPER_SESSION_TIMEOUT_MILLIS),
            zookeeper_connection_timeout: Duration::from_millis(DEFAULT_ZOOKEEPER_CONNECTION_TIMEOUT_MILLIS),
            num_consumer_fetchers: DEFAULT_NUM_CONSUMER_FETCHERS,
            fetch_message_max_bytes: DEFAULT_FETCH_MESSAGE_MAX_BYTES,
            queued_max_messages: DEFAULT_QUEUED_MAX_MESSAGES,
            rebalance_max_retries: DEFAULT_REBALANCE_MAX_RETRIES,
            rebalance_backoff: Duration::from_millis(DEFAULT_REBALANCE_BACKOFF_MILLIS),
            ack_flush_interval: Duration::from_millis(DEFAULT_ACK_FLUSH_INTERVAL_MILLIS),
            offsets_storage: SUPPORTED_OFFSETS_STORAGE.to_owned(),
            auto_offset_reset: AutoOffsetReset::Largest,
            exclude_internal_topics: true,
            partition_assignment_strategy: AssignmentStrategy::Range,
        }
    }
}

impl ConsumerConfig {
    /// Checked once, at `ConsumerBuilder::build` time: an unsupported
    /// `offsetsStorage` is a fatal, immediate error, not a lazily discovered
    /// one.
    pub fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() {
            bail!("group_id must not be empty");
        }

        if self.zookeeper_connect.is_empty() {
            bail!("zookeeper_connect must name at least one host");
        }

        if self.offsets_storage != SUPPORTED_OFFSETS_STORAGE {
            return Err(ErrorKind::UnsupportedOffsetsStorage(self.offsets_storage.clone()).into());
        }

        if self.queued_max_messages == 0 {
            bail!("queued_max_messages must be greater than zero");
        }

        Ok(())
    }
}
