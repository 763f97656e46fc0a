//! Subscriber registry
//!
//! Bookkeeping of live subscribers and their topic filters. The registry
//! itself is not synchronized; [`crate::Publisher`] guards it with a
//! reader/writer lock.

use std::collections::HashMap;

use fanout_types::{SubscriberId, TopicFilter};

/// Registry entry for one live subscriber
pub(crate) struct Entry<T> {
    /// Producer side of the subscriber queue
    pub(crate) sender: flume::Sender<T>,
    /// Optional filter; `None` matches everything
    pub(crate) topic: Option<TopicFilter<T>>,
}

/// Mapping from subscriber to its queue and filter.
///
/// Every entry holds a still-open queue. Removing an entry drops its sender,
/// which closes the queue once no delivery holds a clone of it.
pub(crate) struct Registry<T> {
    subscribers: HashMap<SubscriberId, Entry<T>>,
    closed: bool,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            closed: false,
        }
    }

    /// Register a subscriber.
    ///
    /// Returns the entry back when the registry is closed.
    pub(crate) fn insert(&mut self, id: SubscriberId, entry: Entry<T>) -> Result<(), Entry<T>> {
        if self.closed {
            return Err(entry);
        }
        self.subscribers.insert(id, entry);
        Ok(())
    }

    /// Remove a subscriber, closing its queue
    pub(crate) fn remove(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Remove every subscriber and mark the registry terminal
    pub(crate) fn close(&mut self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        self.closed = true;
        count
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SubscriberId, &Entry<T>)> {
        self.subscribers.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
