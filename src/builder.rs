//! `ConsumerBuilder`: validates a `ConsumerConfig` and wires a `GroupConsumer`
//! together with its collaborators, the way `tokio-kafka`'s client builders
//! assemble a configured client from a handle and a set of typed options
//! rather than a single monolithic constructor.

use std::rc::Rc;

use rand::Rng;
use tokio_core::reactor::Handle;

use assign::{self, AssignmentStrategy};
use config::ConsumerConfig;
use coord::CoordGateway;
use coordinator::Coordinator as GroupConsumer;
use errors::Result;
use fetch::FetchManager;
use stream::BlockDecoder;

/// Builds a `GroupConsumer` from a `ConsumerConfig` plus the three
/// collaborators the embedding process supplies: a `CoordGateway` (the
/// coordination-store client), a `FetchManager` (the broker fetch loop), and
/// a `BlockDecoder` (message decoding).
pub struct ConsumerBuilder {
    config: ConsumerConfig,
}

impl ConsumerBuilder {
    pub fn new(group_id: String, zookeeper_connect: Vec<String>) -> Self {
        let mut config = ConsumerConfig::default();
        config.group_id = group_id;
        config.zookeeper_connect = zookeeper_connect;

        ConsumerBuilder { config: config }
    }

    pub fn from_config(config: ConsumerConfig) -> Self {
        ConsumerBuilder { config: config }
    }

    pub fn client_id(mut self, client_id: String) -> Self {
        self.config.client_id = client_id;
        self
    }

    pub fn num_consumer_fetchers(mut self, n: u32) -> Self {
        self.config.num_consumer_fetchers = n;
        self
    }

    pub fn fetch_message_max_bytes(mut self, n: u32) -> Self {
        self.config.fetch_message_max_bytes = n;
        self
    }

    pub fn queued_max_messages(mut self, n: usize) -> Self {
        self.config.queued_max_messages = n;
        self
    }

    pub fn rebalance_max_retries(mut self, n: usize) -> Self {
        self.config.rebalance_max_retries = n;
        self
    }

    pub fn rebalance_backoff_ms(mut self, ms: u64) -> Self {
        self.config.rebalance_backoff = ::std::time::Duration::from_millis(ms);
        self
    }

    pub fn ack_flush_interval_ms(mut self, ms: u64) -> Self {
        self.config.ack_flush_interval = ::std::time::Duration::from_millis(ms);
        self
    }

    pub fn auto_offset_reset(mut self, reset: ::types::AutoOffsetReset) -> Self {
        self.config.auto_offset_reset = reset;
        self
    }

    pub fn exclude_internal_topics(mut self, exclude: bool) -> Self {
        self.config.exclude_internal_topics = exclude;
        self
    }

    pub fn partition_assignment_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.config.partition_assignment_strategy = strategy;
        self
    }

    /// Validates the accumulated config and assembles a `GroupConsumer`
    /// around `coord`/`fetch_manager`/`decoder`. The `ConsumerId` is derived
    /// from `client_id` plus a random suffix, mirroring `go_kafka_client`'s
    /// `consumerId = clientId + "_" + uuid`.
    pub fn build<C, F, D>(self, handle: Handle, coord: Rc<C>, fetch_manager: Rc<F>, decoder: Rc<D>) -> Result<GroupConsumer<C, F, D>>
    where
        C: CoordGateway + 'static,
        F: FetchManager + 'static,
        D: BlockDecoder + 'static,
    {
        self.config.validate()?;

        let assignor = assign::assignor_for(self.config.partition_assignment_strategy);
        let consumer_id = generate_consumer_id(&self.config.client_id);

        Ok(GroupConsumer::new(
            handle,
            consumer_id,
            self.config.group_id,
            self.config.rebalance_max_retries,
            self.config.rebalance_backoff,
            self.config.queued_max_messages,
            self.config.fetch_message_max_bytes,
            self.config.num_consumer_fetchers,
            self.config.auto_offset_reset,
            self.config.exclude_internal_topics,
            self.config.ack_flush_interval,
            vec![assignor],
            coord,
            fetch_manager,
            decoder,
        ))
    }
}

fn generate_consumer_id(client_id: &str) -> String {
    let suffix: String = ::rand::thread_rng().gen_ascii_chars().take(8).collect();
    format!("{}_{}", client_id, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_consumer_ids_are_unique_and_prefixed() {
        let a = generate_consumer_id("c");
        let b = generate_consumer_id("c");

        assert!(a.starts_with("c_"));
        assert!(b.starts_with("c_"));
        assert_ne!(a, b);
    }

    #[test]
    fn build_rejects_an_invalid_config() {
        let builder = ConsumerBuilder::new(String::new(), vec![]);
        let core = ::tokio_core::reactor::Core::new().unwrap();

        let result = builder.build(
            core.handle(),
            Rc::new(::coord::tests::NullGateway),
            Rc::new(::fetch::tests::NullFetchManager),
            Rc::new(::stream::tests::NullDecoder),
        );

        assert!(result.is_err());
    }
}
