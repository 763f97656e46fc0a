//! Fanout Types - Shared domain types for the broadcaster
//!
//! This crate contains the payload, identifier, filter and configuration
//! types used across Fanout components.

pub mod config;
pub mod error;
pub mod subscriber;
pub mod topic;
pub mod value;

// Re-export commonly used types
pub use config::PublisherConfig;
pub use error::{Error, Result};
pub use subscriber::SubscriberId;
pub use topic::TopicFilter;
pub use value::{Value, ValueKind};
