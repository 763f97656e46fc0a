//! Consumer side of a subscriber queue
//!
//! A [`Subscription`] is a lazy sequence of delivered values. It ends once
//! the subscriber is evicted or the publisher closes, after the values
//! already queued have been drained.

use fanout_types::SubscriberId;

/// Handle to one subscriber queue
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: flume::Receiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: SubscriberId, receiver: flume::Receiver<T>) -> Self {
        Self { id, receiver }
    }

    /// Identifier used to evict this subscription
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next value.
    ///
    /// Returns `None` once the subscription has terminated.
    pub async fn recv(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }

    /// Blocking variant of [`recv`](Self::recv) for use outside the runtime
    pub fn recv_blocking(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Take the next value if one is already queued
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Blocking iterator over delivered values
    pub fn iter(&self) -> flume::Iter<'_, T> {
        self.receiver.iter()
    }

    /// Convert into an async stream of delivered values
    pub fn into_stream(self) -> flume::r#async::RecvStream<'static, T> {
        self.receiver.into_stream()
    }

    /// Number of values waiting in the queue
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Queue capacity
    pub fn capacity(&self) -> Option<usize> {
        self.receiver.capacity()
    }

    /// True when no value will ever be received again
    pub fn is_terminated(&self) -> bool {
        self.receiver.is_disconnected() && self.receiver.is_empty()
    }
}

impl<T> IntoIterator for Subscription<T> {
    type Item = T;
    type IntoIter = flume::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.receiver.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Subscription<T> {
    type Item = T;
    type IntoIter = flume::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.receiver.iter()
    }
}
