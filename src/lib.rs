//! A high-level consumer client for a partitioned, distributed log-style
//! messaging system, coordinated through an external hierarchical metadata
//! store with ephemeral nodes and change notifications.
//!
//! This crate is the group-coordination core only: it registers a consumer
//! in a named group, watches the coordination store for membership/topic/
//! broker changes, runs a deterministic rebalance protocol, claims partition
//! ownership, fetches starting offsets, and drives a downstream fetch
//! manager through ownership transitions. The broker wire protocol, the
//! fetch loop itself, and the coordination-store client are out of scope:
//! they are consumed here as plain traits (`FetchManager`, `CoordGateway`)
//! the same way `tokio-kafka`'s consumer coordinator consumes `Client`
//! without bundling a broker transport.

#![allow(dead_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate bytes;
extern crate time;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

extern crate futures;
extern crate tokio_core;
extern crate tokio_timer;
extern crate tokio_retry;

#[cfg(test)]
extern crate pretty_env_logger;

#[macro_use]
pub mod errors;
pub mod types;
pub mod support;
pub mod config;
pub mod coord;
pub mod assign;
pub mod topic_count;
pub mod registry;
pub mod stream;
pub mod fetch;
pub mod coordinator;
pub mod builder;

pub use builder::ConsumerBuilder;
pub use config::ConsumerConfig;
pub use coord::{Broker, CoordGateway, Watch, WatchOutcome};
pub use coordinator::{Consumer, Coordinator as GroupConsumer};
pub use errors::{Error, ErrorKind, Result};
pub use fetch::FetchManager;
pub use stream::{Block, BlockDecoder, ConsumerStream, Message};
pub use topic_count::TopicFilter;
pub use types::{
    AutoOffsetReset, ConsumerId, ConsumerInfo, GroupId, OffsetFetchResult, Pattern, ThreadId,
    TopicPartition, INVALID_OFFSET, SWITCH_TO_PATTERN_PREFIX,
};
