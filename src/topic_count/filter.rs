//! Topic filters used by the wildcard subscription policy.

use std::collections::HashSet;

/// Topics starting with this prefix are internal bookkeeping topics
/// (analogous to Kafka's `__consumer_offsets`) and are excluded from a
/// wildcard subscription whenever `excludeInternalTopics` is set, regardless
/// of whether the filter itself would otherwise allow them.
const INTERNAL_TOPIC_PREFIX: &str = "__";

fn is_internal(topic: &str) -> bool {
    topic.starts_with(INTERNAL_TOPIC_PREFIX)
}

/// A pluggable predicate deciding which topics a wildcard subscription
/// matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicFilter {
    /// Only the named topics are allowed.
    WhiteList(HashSet<String>),
    /// Every topic is allowed except the named ones.
    BlackList(HashSet<String>),
}

impl TopicFilter {
    pub fn white_list<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TopicFilter::WhiteList(topics.into_iter().map(Into::into).collect())
    }

    pub fn black_list<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TopicFilter::BlackList(topics.into_iter().map(Into::into).collect())
    }

    pub fn is_topic_allowed(&self, topic: &str, exclude_internal: bool) -> bool {
        if exclude_internal && is_internal(topic) {
            return false;
        }

        match *self {
            TopicFilter::WhiteList(ref topics) => topics.contains(topic),
            TopicFilter::BlackList(ref topics) => !topics.contains(topic),
        }
    }
}
