//! Error types for Fanout
//!
//! Publishing and subscribing never fail; these errors cover the
//! surrounding configuration surface.

use thiserror::Error;

/// Main error type for Fanout operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for Fanout operations
pub type Result<T> = std::result::Result<T, Error>;
