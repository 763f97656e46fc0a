//! Fanout Sieve - Prime sieve pipeline
//!
//! A generator stage emits the natural numbers from 2 upwards; each prime
//! found appends a filter stage that drops its multiples. Every stage is a
//! task sharing one cancellation signal, and the pipeline owner can wait for
//! all stages to finish.

pub mod pipeline;

// Re-exports
pub use pipeline::{primes, Pipeline};
