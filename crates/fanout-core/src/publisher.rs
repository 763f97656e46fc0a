//! Publisher - Subscriber registry and broadcast engine
//!
//! The Publisher fans each published value out to every matching
//! subscriber. Delivery attempts run concurrently, one task per subscriber,
//! each bounded by the configured timeout:
//!
//! ```text
//! publish(v) ── read lock ──┬──► task 1: filter? ─► send (≤ timeout) ─► queue 1
//!                           ├──► task 2: filter? ─► send (≤ timeout) ─► queue 2
//!                           └──► task N: filter? ─► send (≤ timeout) ─► queue N
//!                                      │
//!                   join all ◄─────────┘  (publish resolves here)
//! ```
//!
//! ## Rules
//! - `publish` holds the registry read lock for the whole fan-out; publishes
//!   run concurrently with each other.
//! - `subscribe`, `evict` and `close` take the write lock, so they never
//!   overlap a delivery. A queue is never written after it is closed.
//! - A slow subscriber costs at most `timeout` and only for itself.
//! - Filter panics and dropped consumers are contained per subscriber.
//!
//! ## Operations after close
//! - `subscribe*` returns a subscription that is already terminated
//! - `publish` is a no-op returning an empty [`DeliveryReport`]
//! - `evict` returns `false`, `close` returns `0`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fanout_types::{PublisherConfig, SubscriberId, TopicFilter, Value};
use parking_lot::Mutex;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::delivery::{deliver, DeliveryOutcome, DeliveryReport};
use crate::registry::{Entry, Registry};
use crate::subscription::Subscription;

/// Point-in-time counters for a publisher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Live subscribers
    pub subscribers: usize,
    /// Publish calls that reached the fan-out stage
    pub published: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub timed_out: u64,
    pub disconnected: u64,
    pub failed: u64,
    pub closed: bool,
    pub last_published_at: Option<DateTime<Utc>>,
}

/// Cumulative delivery counters, independent of the registry lock
#[derive(Debug, Default)]
struct Counters {
    published: u64,
    delivered: u64,
    skipped: u64,
    timed_out: u64,
    disconnected: u64,
    failed: u64,
    last_published_at: Option<DateTime<Utc>>,
}

impl Counters {
    fn absorb(&mut self, report: &DeliveryReport) {
        self.published += 1;
        self.delivered += report.delivered as u64;
        self.skipped += report.skipped as u64;
        self.timed_out += report.timed_out as u64;
        self.disconnected += report.disconnected as u64;
        self.failed += report.failed as u64;
        self.last_published_at = Some(Utc::now());
    }
}

/// Concurrent publish/subscribe broadcaster
pub struct Publisher<T = Value> {
    config: PublisherConfig,
    registry: RwLock<Registry<T>>,
    /// Fan-out bound shared by every publish, present when
    /// `max_concurrent_deliveries > 0`
    permits: Option<Arc<Semaphore>>,
    counters: Mutex<Counters>,
}

impl<T> Publisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a publisher with the given delivery timeout and queue capacity
    pub fn new(timeout: std::time::Duration, buffer_size: usize) -> Self {
        Self::with_config(PublisherConfig::new(timeout, buffer_size))
    }

    /// Create a publisher from a full configuration
    pub fn with_config(config: PublisherConfig) -> Self {
        info!(
            timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
            buffer_size = config.buffer_size,
            max_concurrent_deliveries = config.max_concurrent_deliveries,
            "Initializing publisher"
        );

        let permits = (config.max_concurrent_deliveries > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_deliveries)));

        Self {
            config,
            registry: RwLock::new(Registry::new()),
            permits,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Get the publisher configuration
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    // ==================== Registry ====================

    /// Subscribe to every published value
    pub async fn subscribe(&self) -> Subscription<T> {
        self.subscribe_filtered(None).await
    }

    /// Subscribe to values accepted by `filter`
    pub async fn subscribe_topic<F>(&self, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let topic: TopicFilter<T> = Arc::new(filter);
        self.subscribe_filtered(Some(topic)).await
    }

    /// Subscribe with an optional filter; `None` matches everything
    pub async fn subscribe_filtered(&self, topic: Option<TopicFilter<T>>) -> Subscription<T> {
        let id = SubscriberId::new();
        let (sender, receiver) = flume::bounded(self.config.buffer_size);
        let filtered = topic.is_some();

        let mut registry = self.registry.write().await;
        match registry.insert(id, Entry { sender, topic }) {
            Ok(()) => debug!(subscriber = %id, filtered, "Subscriber added"),
            // The rejected entry drops here, so the subscription is born terminated
            Err(_) => debug!(subscriber = %id, "Subscribe after close, returning closed subscription"),
        }

        Subscription::new(id, receiver)
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Returns `false` when the id is not registered (already evicted,
    /// dropped, or the publisher is closed).
    pub async fn evict(&self, id: &SubscriberId) -> bool {
        let removed = self.registry.write().await.remove(id);
        if removed {
            debug!(subscriber = %id, "Subscriber evicted");
        }
        removed
    }

    /// Close every subscriber queue and stop accepting subscriptions.
    ///
    /// Returns the number of subscriptions closed.
    pub async fn close(&self) -> usize {
        let mut registry = self.registry.write().await;
        if registry.is_closed() {
            return 0;
        }
        let closed = registry.close();
        info!(subscribers = closed, "Publisher closed");
        closed
    }

    pub async fn is_closed(&self) -> bool {
        self.registry.read().await.is_closed()
    }

    /// Number of live subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Get cumulative publisher statistics
    pub async fn stats(&self) -> PublisherStats {
        let (subscribers, closed) = {
            let registry = self.registry.read().await;
            (registry.len(), registry.is_closed())
        };
        let counters = self.counters.lock();

        PublisherStats {
            subscribers,
            published: counters.published,
            delivered: counters.delivered,
            skipped: counters.skipped,
            timed_out: counters.timed_out,
            disconnected: counters.disconnected,
            failed: counters.failed,
            closed,
            last_published_at: counters.last_published_at,
        }
    }

    // ==================== Broadcast ====================

    /// Offer `value` to every matching subscriber.
    ///
    /// Resolves once every delivery attempt has been delivered, skipped,
    /// or abandoned after the timeout. Must be called within a tokio runtime.
    pub async fn publish(&self, value: T) -> DeliveryReport {
        let registry = self.registry.read().await;
        if registry.is_closed() {
            debug!("Publish after close ignored");
            return DeliveryReport::default();
        }

        let mut deliveries = JoinSet::new();
        for (id, entry) in registry.iter() {
            let id = *id;
            let sender = entry.sender.clone();
            let topic = entry.topic.clone();
            let value = value.clone();
            let timeout = self.config.timeout;
            let permits = self.permits.clone();

            deliveries.spawn(async move {
                // Held until the delivery finishes
                let _permit = match permits {
                    Some(permits) => permits.acquire_owned().await.ok(),
                    None => None,
                };
                (id, deliver(id, sender, topic, value, timeout).await)
            });
        }

        let mut report = DeliveryReport::default();
        let mut stale = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((id, outcome)) => {
                    if outcome == DeliveryOutcome::Disconnected {
                        stale.push(id);
                    }
                    report.record(outcome);
                }
                Err(e) => {
                    warn!(error = %e, "Delivery task failed");
                    report.record_failure();
                }
            }
        }
        drop(registry);

        self.counters.lock().absorb(&report);
        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            skipped = report.skipped,
            timed_out = report.timed_out,
            "Value published"
        );

        if !stale.is_empty() {
            self.prune(&stale).await;
        }

        report
    }

    /// Remove subscribers whose consumer dropped its subscription
    async fn prune(&self, stale: &[SubscriberId]) {
        let mut registry = self.registry.write().await;
        for id in stale {
            if registry.remove(id) {
                debug!(subscriber = %id, "Pruned disconnected subscriber");
            }
        }
    }
}

impl Default for Publisher<Value> {
    fn default() -> Self {
        Self::with_config(PublisherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_types::topic;
    use std::time::Duration;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn create_test_publisher(buffer_size: usize) -> Publisher {
        Publisher::new(TIMEOUT, buffer_size)
    }

    fn drain<T>(sub: &Subscription<T>) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(v) = sub.try_recv() {
            values.push(v);
        }
        values
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let publisher = create_test_publisher(10);
        let all = publisher.subscribe().await;
        assert_eq!(publisher.subscriber_count().await, 1);

        let report = publisher.publish(Value::from("hello")).await;
        assert_eq!(report.delivered, 1);

        assert_eq!(all.recv().await, Some(Value::from("hello")));
    }

    #[tokio::test]
    async fn test_topic_subscriber_sees_only_matches() {
        let publisher = create_test_publisher(10);
        let golang = publisher
            .subscribe_filtered(Some(topic::contains("golang")))
            .await;

        let report = publisher.publish(Value::from("hello, I am")).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.skipped, 1);

        let report = publisher.publish(Value::from("learning golang")).await;
        assert_eq!(report.delivered, 1);

        publisher.close().await;
        assert_eq!(drain(&golang), vec![Value::from("learning golang")]);
        assert_eq!(golang.recv().await, None);
    }

    #[tokio::test]
    async fn test_no_cross_talk() {
        let publisher = Publisher::<i64>::new(TIMEOUT, 16);
        let evens = publisher.subscribe_topic(|v: &i64| v % 2 == 0).await;
        let odds = publisher.subscribe_topic(|v: &i64| v % 2 != 0).await;
        let all = publisher.subscribe().await;

        for i in 0..10 {
            publisher.publish(i).await;
        }
        publisher.close().await;

        assert_eq!(drain(&evens), vec![0, 2, 4, 6, 8]);
        assert_eq!(drain(&odds), vec![1, 3, 5, 7, 9]);
        assert_eq!(drain(&all), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_zero_subscribers() {
        let publisher = create_test_publisher(1);
        let report = publisher.publish(Value::from(1i64)).await;
        assert!(report.is_empty());

        let stats = publisher.stats().await;
        assert_eq!(stats.published, 1);
        assert_eq!(stats.subscribers, 0);
        assert!(stats.last_published_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_after_timeout() {
        // Buffer 1, two subscribers, publish "a" then "b" without draining
        let publisher = create_test_publisher(1);
        let first = publisher.subscribe().await;
        let second = publisher.subscribe().await;

        let report = publisher.publish(Value::from("a")).await;
        assert_eq!(report.delivered, 2);

        let start = Instant::now();
        let report = publisher.publish(Value::from("b")).await;
        let elapsed = start.elapsed();

        assert_eq!(report.timed_out, 2);
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT * 2);

        publisher.close().await;
        assert_eq!(drain(&first), vec![Value::from("a")]);
        assert_eq!(drain(&second), vec![Value::from("a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_bounded_by_timeout_not_subscriber_count() {
        let publisher = create_test_publisher(1);
        let mut subs = Vec::new();
        for _ in 0..32 {
            subs.push(publisher.subscribe().await);
        }
        publisher.publish(Value::from("fill")).await;

        let start = Instant::now();
        let report = publisher.publish(Value::from("overflow")).await;
        let elapsed = start.elapsed();

        assert_eq!(report.timed_out, 32);
        assert!(elapsed < TIMEOUT * 2, "publish took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_does_not_block_others() {
        let publisher = create_test_publisher(1);
        let stalled = publisher.subscribe().await;
        let healthy = publisher.subscribe().await;

        publisher.publish(Value::from(1i64)).await;
        assert_eq!(healthy.recv().await, Some(Value::from(1i64)));

        let report = publisher.publish(Value::from(2i64)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(healthy.try_recv(), Some(Value::from(2i64)));
        assert_eq!(stalled.try_recv(), Some(Value::from(1i64)));
        assert_eq!(stalled.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_delivery_lands_when_space_frees() {
        let publisher = create_test_publisher(1);
        let sub = publisher.subscribe().await;
        publisher.publish(Value::from(1i64)).await;

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(TIMEOUT / 2).await;
            let first = sub.recv().await;
            let second = sub.recv().await;
            (first, second)
        });

        let report = publisher.publish(Value::from(2i64)).await;
        assert_eq!(report.delivered, 1);

        let (first, second) = consumer.await.unwrap();
        assert_eq!(first, Some(Value::from(1i64)));
        assert_eq!(second, Some(Value::from(2i64)));
    }

    #[tokio::test]
    async fn test_close_terminates_streams() {
        let publisher = create_test_publisher(4);
        let a = publisher.subscribe().await;
        let b = publisher.subscribe_topic(|v: &Value| v.is_null()).await;

        publisher.publish(Value::from("queued")).await;
        assert_eq!(publisher.close().await, 2);

        assert_eq!(a.recv().await, Some(Value::from("queued")));
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);
        assert!(a.is_terminated());
        assert!(b.is_terminated());
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let publisher = create_test_publisher(4);
        let existing = publisher.subscribe().await;
        publisher.close().await;

        let late = publisher.subscribe().await;
        assert!(late.is_terminated());
        assert_eq!(late.recv().await, None);

        let report = publisher.publish(Value::from("ignored")).await;
        assert!(report.is_empty());

        assert!(!publisher.evict(&existing.id()).await);
        assert_eq!(publisher.close().await, 0);
        assert!(publisher.is_closed().await);
        assert_eq!(publisher.subscriber_count().await, 0);

        let stats = publisher.stats().await;
        assert!(stats.closed);
        assert_eq!(stats.published, 0);
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let publisher = create_test_publisher(4);
        let evicted = publisher.subscribe().await;
        let kept = publisher.subscribe().await;

        publisher.publish(Value::from(1i64)).await;
        assert!(publisher.evict(&evicted.id()).await);
        assert!(!publisher.evict(&evicted.id()).await);
        assert_eq!(publisher.subscriber_count().await, 1);

        publisher.publish(Value::from(2i64)).await;

        assert_eq!(evicted.recv().await, Some(Value::from(1i64)));
        assert_eq!(evicted.recv().await, None);
        assert_eq!(drain(&kept), vec![Value::from(1i64), Value::from(2i64)]);
    }

    #[tokio::test]
    async fn test_panicking_filter_is_isolated() {
        let publisher = create_test_publisher(4);
        let _broken = publisher
            .subscribe_topic(|v: &Value| {
                if v.as_str().is_some() {
                    panic!("filter bug");
                }
                false
            })
            .await;
        let healthy = publisher.subscribe().await;

        let report = publisher.publish(Value::from("boom")).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(healthy.recv().await, Some(Value::from("boom")));

        // The broken subscriber stays registered and keeps being evaluated
        let report = publisher.publish(Value::from(3i64)).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let publisher = create_test_publisher(4);
        let dropped = publisher.subscribe().await;
        let _kept = publisher.subscribe().await;
        drop(dropped);

        let report = publisher.publish(Value::from("x")).await;
        assert_eq!(report.disconnected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(publisher.subscriber_count().await, 1);

        let stats = publisher.stats().await;
        assert_eq!(stats.disconnected, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_order_preserved_per_subscriber() {
        let publisher = Publisher::<u32>::new(TIMEOUT, 128);
        let sub = publisher.subscribe().await;

        for i in 0..100 {
            publisher.publish(i).await;
        }
        publisher.close().await;

        assert_eq!(drain(&sub), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_fan_out() {
        let config = PublisherConfig::new(TIMEOUT, 1).with_max_concurrent_deliveries(2);
        let publisher = Publisher::<u32>::with_config(config);
        let mut subs = Vec::new();
        for _ in 0..4 {
            subs.push(publisher.subscribe().await);
        }

        let report = publisher.publish(1).await;
        assert_eq!(report.delivered, 4);

        // Four full queues, two at a time: two timeout rounds
        let start = Instant::now();
        let report = publisher.publish(2).await;
        assert_eq!(report.timed_out, 4);
        assert!(start.elapsed() >= TIMEOUT * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_bound_is_shared_between_publishes() {
        let config = PublisherConfig::new(TIMEOUT, 0).with_max_concurrent_deliveries(2);
        let publisher = Publisher::<u32>::with_config(config);
        let mut subs = Vec::new();
        for _ in 0..4 {
            subs.push(publisher.subscribe().await);
        }

        // Eight stalled deliveries through two permits: four timeout rounds
        let start = Instant::now();
        let (first, second) = tokio::join!(publisher.publish(1), publisher.publish(2));
        assert_eq!(first.timed_out + second.timed_out, 8);
        assert!(start.elapsed() >= TIMEOUT * 4);
        assert_eq!(first.failed + second.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendezvous_queue() {
        let publisher = Publisher::<u32>::new(TIMEOUT, 0);
        let sub = publisher.subscribe().await;

        // Nobody waiting: the value is abandoned after the timeout
        let report = publisher.publish(1).await;
        assert_eq!(report.timed_out, 1);

        let consumer = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        let report = publisher.publish(2).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(consumer.await.unwrap(), Some(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_publish_evict() {
        let publisher = Arc::new(Publisher::<u64>::new(Duration::from_millis(5), 8));
        let mut tasks = JoinSet::new();

        for worker in 0..8u64 {
            let publisher = Arc::clone(&publisher);
            tasks.spawn(async move {
                for i in 0..25u64 {
                    let sub = publisher.subscribe_topic(move |v: &u64| v % 8 == worker).await;
                    publisher.publish(worker * 1000 + i).await;
                    if i % 2 == 0 {
                        publisher.evict(&sub.id()).await;
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        // Odd iterations skip eviction; their dropped handles linger until pruned
        let remaining = publisher.subscriber_count().await;
        assert!(remaining <= 8 * 12);
        assert_eq!(publisher.close().await, remaining);
        assert!(publisher.is_closed().await);
    }

    #[tokio::test]
    async fn test_publisher_drop_closes_subscriptions() {
        let publisher = create_test_publisher(2);
        let sub = publisher.subscribe().await;
        publisher.publish(Value::from("last")).await;
        drop(publisher);

        assert_eq!(sub.recv().await, Some(Value::from("last")));
        assert_eq!(sub.recv().await, None);
    }
}
