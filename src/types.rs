//! Core identity and data-model types shared by every module in the crate.
//!
//! These map directly onto the data model: `ConsumerId`/`GroupId`/`ThreadId`
//! identify participants, `TopicPartition` identifies a unit of ownership,
//! and `ConsumerInfo` is the JSON document persisted per-consumer in the
//! coordination store.

use std::cmp::Ordering;
use std::fmt;

use time;

/// Sentinel committed-offset value meaning "no offset has ever been
/// committed for this partition".
pub const INVALID_OFFSET: i64 = -1;

/// Prefix a `ConsumerInfo.pattern` carries while a topic-switch is in
/// flight; stripped once the switch completes.
pub const SWITCH_TO_PATTERN_PREFIX: &str = "switch/";

/// Process-wide stable identifier of this consumer within its group.
pub type ConsumerId = String;

/// Name of the coordination group; all consumers sharing a group id
/// partition the union of their subscriptions.
pub type GroupId = String;

/// Within-consumer stream identity: `(consumerId, intraConsumerIndex)`.
///
/// Ordered lexicographically by `(consumer_id, index)` so that independent
/// members sort threads identically before assignment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId {
    pub consumer_id: ConsumerId,
    pub index: u32,
}

impl ThreadId {
    pub fn new<S: Into<ConsumerId>>(consumer_id: S, index: u32) -> Self {
        ThreadId {
            consumer_id: consumer_id.into(),
            index: index,
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.consumer_id, self.index)
    }
}

/// `(topic, partition)`; identity key for ownership, fetch state, and
/// offset tracking throughout the crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new<S: Into<String>>(topic: S, partition: i32) -> Self {
        TopicPartition {
            topic: topic.into(),
            partition: partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

// `TopicPartition` is sorted by topic then partition so assignment
// strategies can produce a deterministic, total order over the universe of
// partitions before dividing it among threads.
impl PartialOrd for TopicPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TopicPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.topic, self.partition).cmp(&(&other.topic, other.partition))
    }
}

/// The subscription pattern a `ConsumerInfo` advertises to the rest of the
/// group, mirroring `TopicCountPolicy::pattern()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Static,
    WhiteList,
    BlackList,
    /// In-flight topic switch; carries the pattern the group is converging
    /// on so peers can tell an advertisement from a settled subscription.
    Switch(String),
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Pattern::Static => write!(f, "static"),
            Pattern::WhiteList => write!(f, "white_list"),
            Pattern::BlackList => write!(f, "black_list"),
            Pattern::Switch(ref desired) => write!(f, "{}{}", SWITCH_TO_PATTERN_PREFIX, desired),
        }
    }
}

impl Pattern {
    /// `true` if this pattern advertises an in-flight topic switch.
    pub fn is_switch(&self) -> bool {
        match *self {
            Pattern::Switch(_) => true,
            _ => false,
        }
    }

    /// The settled pattern name a switch is converging on, stripped of the
    /// `switch/` prefix, or `None` if this is not a switch advertisement.
    pub fn desired(&self) -> Option<&str> {
        match *self {
            Pattern::Switch(ref desired) => Some(desired.as_str()),
            _ => None,
        }
    }
}

/// Persisted, per-consumer JSON document written at
/// `/consumers/<group>/ids/<consumerId>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    pub version: u32,
    pub subscription: ::std::collections::BTreeMap<String, u32>,
    pub pattern: Pattern,
    pub timestamp: i64,
}

impl ConsumerInfo {
    pub fn new(subscription: ::std::collections::BTreeMap<String, u32>, pattern: Pattern) -> Self {
        ConsumerInfo {
            version: 1,
            subscription: subscription,
            pattern: pattern,
            timestamp: time::get_time().sec,
        }
    }
}

/// Result of fetching the committed offset for a single partition.
#[derive(Clone, Debug)]
pub struct OffsetFetchResult {
    pub offset: i64,
    pub metadata: String,
}

impl Default for OffsetFetchResult {
    fn default() -> Self {
        OffsetFetchResult {
            offset: INVALID_OFFSET,
            metadata: String::new(),
        }
    }
}

/// Resolution policy for an `INVALID_OFFSET` seen at rebalance time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoOffsetReset {
    Smallest,
    Largest,
}

impl ::std::str::FromStr for AutoOffsetReset {
    type Err = ::errors::Error;

    fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
        match s {
            "smallest" => Ok(AutoOffsetReset::Smallest),
            "largest" => Ok(AutoOffsetReset::Largest),
            other => bail!("unsupported auto.offset.reset value `{}`", other),
        }
    }
}
