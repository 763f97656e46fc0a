//! Fanout Core - Concurrent publish/subscribe broadcaster
//!
//! This crate contains the broadcaster implementation including:
//! - Publisher: subscriber registry and broadcast engine
//! - Subscription: the consumer side of one subscriber queue
//! - Delivery outcomes and per-publish reports

pub mod delivery;
pub mod publisher;
mod registry;
pub mod subscription;

// Re-exports
pub use delivery::{DeliveryOutcome, DeliveryReport};
pub use publisher::{Publisher, PublisherStats};
pub use subscription::Subscription;

pub use fanout_types::{topic, PublisherConfig, SubscriberId, TopicFilter, Value, ValueKind};
