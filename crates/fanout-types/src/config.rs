//! Publisher configuration
//!
//! Defines construction parameters for a publisher and how they are
//! loaded from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the delivery timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "FANOUT_TIMEOUT_MS";
/// Environment variable holding the per-subscriber queue capacity
pub const ENV_BUFFER_SIZE: &str = "FANOUT_BUFFER_SIZE";
/// Environment variable holding the fan-out concurrency bound
pub const ENV_MAX_CONCURRENT_DELIVERIES: &str = "FANOUT_MAX_CONCURRENT_DELIVERIES";

/// Publisher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Maximum wait for one subscriber to accept one value
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,

    /// Capacity of each subscriber queue (0 = rendezvous)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum deliveries in flight across all publishes (0 = unbounded)
    #[serde(default)]
    pub max_concurrent_deliveries: usize,
}

fn default_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_buffer_size() -> usize {
    10
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            buffer_size: default_buffer_size(),
            max_concurrent_deliveries: 0,
        }
    }
}

impl PublisherConfig {
    /// Create a config with the given timeout and buffer size
    pub fn new(timeout: Duration, buffer_size: usize) -> Self {
        Self {
            timeout,
            buffer_size,
            ..Default::default()
        }
    }

    /// Set the delivery timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the subscriber queue capacity
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Bound the number of deliveries in flight across all publishes
    pub fn with_max_concurrent_deliveries(mut self, max: usize) -> Self {
        self.max_concurrent_deliveries = max;
        self
    }

    /// Load overrides from `FANOUT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup.
    ///
    /// Missing keys keep their defaults; present keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_TIMEOUT_MS)? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var(&lookup, ENV_BUFFER_SIZE)? {
            config.buffer_size = size;
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_CONCURRENT_DELIVERIES)? {
            config.max_concurrent_deliveries = max;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Duration as whole milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
