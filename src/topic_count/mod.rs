//! `TopicCountPolicy`: describes how subscribed topics map to per-consumer
//! threads. Three variants share one contract; `Wildcard` is rebuilt by the
//! Coordinator from a fresh topic listing on every rebalance attempt rather
//! than caching its own view of the topic universe.

mod filter;

pub use self::filter::TopicFilter;

use std::collections::{BTreeMap, BTreeSet};

use types::{ConsumerId, Pattern, ThreadId};

/// Shared contract every `TopicCount` variant implements.
pub trait TopicCountPolicy {
    /// `topic -> sorted set of ThreadId` this consumer would own under this
    /// policy.
    fn consumer_thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>>;

    /// `topic -> stream count`, the shape persisted in `ConsumerInfo.subscription`.
    fn topics_to_num_streams(&self) -> BTreeMap<String, u32>;

    /// The pattern this policy advertises in `ConsumerInfo.pattern`.
    fn pattern(&self) -> Pattern;
}

fn thread_ids_for(consumer_id: &ConsumerId, topic_counts: &BTreeMap<String, u32>) -> BTreeMap<String, BTreeSet<ThreadId>> {
    topic_counts
        .iter()
        .map(|(topic, &count)| {
            let ids = (0..count).map(|i| ThreadId::new(consumer_id.clone(), i)).collect();
            (topic.clone(), ids)
        })
        .collect()
}

/// An explicit `topic -> stream count` subscription.
#[derive(Clone, Debug)]
pub struct StaticTopicCount {
    consumer_id: ConsumerId,
    topic_counts: BTreeMap<String, u32>,
}

impl StaticTopicCount {
    pub fn new(consumer_id: ConsumerId, topic_counts: BTreeMap<String, u32>) -> Self {
        StaticTopicCount {
            consumer_id: consumer_id,
            topic_counts: topic_counts,
        }
    }
}

impl TopicCountPolicy for StaticTopicCount {
    fn consumer_thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>> {
        thread_ids_for(&self.consumer_id, &self.topic_counts)
    }

    fn topics_to_num_streams(&self) -> BTreeMap<String, u32> {
        self.topic_counts.clone()
    }

    fn pattern(&self) -> Pattern {
        Pattern::Static
    }
}

/// A filter-matched subscription over the current topic universe, with a
/// fixed stream count per matched topic. Built fresh by the Coordinator from
/// a just-fetched topic listing; never retained across rebalances.
#[derive(Clone, Debug)]
pub struct WildcardTopicCount {
    consumer_id: ConsumerId,
    topic_counts: BTreeMap<String, u32>,
    pattern: Pattern,
}

impl WildcardTopicCount {
    /// `all_topics` is the topic universe as just fetched from the
    /// coordination store; `filter` decides which of them this subscription
    /// matches.
    pub fn new(
        consumer_id: ConsumerId,
        all_topics: &[String],
        filter: &TopicFilter,
        num_streams: u32,
        exclude_internal: bool,
    ) -> Self {
        let topic_counts = all_topics
            .iter()
            .filter(|topic| filter.is_topic_allowed(topic, exclude_internal))
            .map(|topic| (topic.clone(), num_streams))
            .collect();

        let pattern = match *filter {
            TopicFilter::WhiteList(_) => Pattern::WhiteList,
            TopicFilter::BlackList(_) => Pattern::BlackList,
        };

        WildcardTopicCount {
            consumer_id: consumer_id,
            topic_counts: topic_counts,
            pattern: pattern,
        }
    }
}

impl TopicCountPolicy for WildcardTopicCount {
    fn consumer_thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>> {
        thread_ids_for(&self.consumer_id, &self.topic_counts)
    }

    fn topics_to_num_streams(&self) -> BTreeMap<String, u32> {
        self.topic_counts.clone()
    }

    fn pattern(&self) -> Pattern {
        self.pattern.clone()
    }
}

/// Identical emit semantics to `StaticTopicCount`, but `pattern()` carries
/// the `switch/<desiredPattern>` advertisement that signals an in-flight
/// topic switch to the rest of the group.
#[derive(Clone, Debug)]
pub struct SwitchTopicCount {
    consumer_id: ConsumerId,
    topic_counts: BTreeMap<String, u32>,
    desired_pattern: String,
}

impl SwitchTopicCount {
    pub fn new(consumer_id: ConsumerId, topic_counts: BTreeMap<String, u32>, desired_pattern: String) -> Self {
        SwitchTopicCount {
            consumer_id: consumer_id,
            topic_counts: topic_counts,
            desired_pattern: desired_pattern,
        }
    }
}

impl TopicCountPolicy for SwitchTopicCount {
    fn consumer_thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>> {
        thread_ids_for(&self.consumer_id, &self.topic_counts)
    }

    fn topics_to_num_streams(&self) -> BTreeMap<String, u32> {
        self.topic_counts.clone()
    }

    fn pattern(&self) -> Pattern {
        Pattern::Switch(self.desired_pattern.clone())
    }
}

/// Tagged union over the three policies, used wherever the Coordinator needs
/// to hold "whichever policy is currently active" without a trait object.
#[derive(Clone, Debug)]
pub enum TopicCount {
    Static(StaticTopicCount),
    Wildcard(WildcardTopicCount),
    Switch(SwitchTopicCount),
}

impl TopicCountPolicy for TopicCount {
    fn consumer_thread_ids_per_topic(&self) -> BTreeMap<String, BTreeSet<ThreadId>> {
        match *self {
            TopicCount::Static(ref p) => p.consumer_thread_ids_per_topic(),
            TopicCount::Wildcard(ref p) => p.consumer_thread_ids_per_topic(),
            TopicCount::Switch(ref p) => p.consumer_thread_ids_per_topic(),
        }
    }

    fn topics_to_num_streams(&self) -> BTreeMap<String, u32> {
        match *self {
            TopicCount::Static(ref p) => p.topics_to_num_streams(),
            TopicCount::Wildcard(ref p) => p.topics_to_num_streams(),
            TopicCount::Switch(ref p) => p.topics_to_num_streams(),
        }
    }

    fn pattern(&self) -> Pattern {
        match *self {
            TopicCount::Static(ref p) => p.pattern(),
            TopicCount::Wildcard(ref p) => p.pattern(),
            TopicCount::Switch(ref p) => p.pattern(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|&(t, c)| (t.to_owned(), c)).collect()
    }

    #[test]
    fn static_emits_one_thread_id_per_stream() {
        let policy = StaticTopicCount::new("c0".to_owned(), topics(&[("t", 2)]));
        let per_topic = policy.consumer_thread_ids_per_topic();
        let ids: Vec<_> = per_topic["t"].iter().cloned().collect();
        assert_eq!(ids, vec![ThreadId::new("c0", 0), ThreadId::new("c0", 1)]);
        assert_eq!(policy.pattern(), Pattern::Static);
    }

    #[test]
    fn wildcard_is_recomputed_from_a_fresh_topic_list() {
        let all = vec!["foo".to_owned(), "bar".to_owned(), "__internal".to_owned()];
        let filter = TopicFilter::black_list(vec!["bar"]);
        let policy = WildcardTopicCount::new("c0".to_owned(), &all, &filter, 2, true);

        let counts = policy.topics_to_num_streams();
        assert_eq!(counts.get("foo"), Some(&2));
        assert!(!counts.contains_key("bar"));
        assert!(!counts.contains_key("__internal"));
        assert_eq!(policy.pattern(), Pattern::BlackList);
    }

    #[test]
    fn switch_advertises_the_switch_prefixed_pattern() {
        let policy = SwitchTopicCount::new("c0".to_owned(), topics(&[("u", 1)]), "static".to_owned());
        assert_eq!(policy.pattern(), Pattern::Switch("static".to_owned()));
        assert_eq!(policy.topics_to_num_streams(), topics(&[("u", 1)]));
    }
}
