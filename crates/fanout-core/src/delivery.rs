//! Per-subscriber delivery
//!
//! One delivery offers one value to one subscriber queue:
//!
//! ```text
//! deliver(value)
//!     │
//!     ├── receiver gone ───────────────► Disconnected
//!     ├── filter rejects ──────────────► Skipped
//!     ├── filter panics ───────────────► FilterPanicked
//!     └── send_async ─┬─ accepted ─────► Delivered
//!                     ├─ timeout ──────► TimedOut   (value lost for this subscriber)
//!                     └─ receiver gone ► Disconnected
//! ```
//!
//! Outcomes are informational. None of them is an error for the publisher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use fanout_types::{SubscriberId, TopicFilter};
use tracing::{trace, warn};

/// Result of offering one value to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryOutcome {
    /// The value was enqueued
    Delivered,
    /// The topic filter rejected the value
    Skipped,
    /// The queue stayed full for the whole timeout window
    TimedOut,
    /// The consumer dropped its subscription
    Disconnected,
    /// The topic filter panicked while evaluating the value
    FilterPanicked,
}

/// Aggregated outcomes of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers in the registry snapshot
    pub attempted: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub disconnected: usize,
    /// Filter panics and delivery tasks that did not complete
    pub failed: usize,
}

impl DeliveryReport {
    /// Account for one delivery outcome
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        self.attempted += 1;
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::TimedOut => self.timed_out += 1,
            DeliveryOutcome::Disconnected => self.disconnected += 1,
            DeliveryOutcome::FilterPanicked => self.failed += 1,
        }
    }

    /// Account for a delivery task that never reported an outcome
    pub(crate) fn record_failure(&mut self) {
        self.attempted += 1;
        self.failed += 1;
    }

    /// True when the publish reached no subscriber at all
    pub fn is_empty(&self) -> bool {
        self.attempted == 0
    }
}

/// Offer `value` to one subscriber queue, waiting at most `timeout` for space
pub(crate) async fn deliver<T>(
    id: SubscriberId,
    sender: flume::Sender<T>,
    topic: Option<TopicFilter<T>>,
    value: T,
    timeout: Duration,
) -> DeliveryOutcome {
    if sender.is_disconnected() {
        return DeliveryOutcome::Disconnected;
    }

    if let Some(topic) = topic {
        match catch_unwind(AssertUnwindSafe(|| topic(&value))) {
            Ok(true) => {}
            Ok(false) => return DeliveryOutcome::Skipped,
            Err(payload) => {
                warn!(
                    subscriber = %id,
                    panic = %panic_message(payload.as_ref()),
                    "Topic filter panicked"
                );
                return DeliveryOutcome::FilterPanicked;
            }
        }
    }

    let outcome = match tokio::time::timeout(timeout, sender.send_async(value)).await {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(_)) => DeliveryOutcome::Disconnected,
        Err(_) => DeliveryOutcome::TimedOut,
    };

    trace!(subscriber = %id, ?outcome, "Delivery finished");
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
