//! In-process typed pub/sub for newly-saved entities.
//!
//! Subscribers register a set of event tokens and receive payloads through a
//! bounded broadcast channel. Triggering with a space-separated event string
//! delivers to every subscriber whose token set intersects it, so
//! `"saved hash-XYZ"` reaches both the `"saved"` firehose and the watcher of
//! one transaction. Delivery never blocks the trigger path: a subscriber
//! that lags simply loses its oldest events.

use concord_ledger::BlockTransaction;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of each subscriber's channel before drop-oldest kicks in.
const SUBSCRIBER_CAPACITY: usize = 256;

/// The observer carried by the node runner for block transactions.
pub type BlockTransactionObserver = Observer<Arc<BlockTransaction>>;

struct Subscriber<T> {
    tokens: HashSet<String>,
    sender: broadcast::Sender<T>,
}

struct ObserverInner<T> {
    subscribers: RwLock<HashMap<u64, Subscriber<T>>>,
    next_id: AtomicU64,
}

/// A typed event bus. Cheap to clone; clones share subscribers.
pub struct Observer<T: Clone> {
    inner: Arc<ObserverInner<T>>,
}

impl<T: Clone> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Observer {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Observer<T> {
    pub fn new() -> Self {
        Observer {
            inner: Arc::new(ObserverInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register for every event matching one of the space-separated tokens
    /// in `events`. The subscription unregisters itself on drop.
    pub fn subscribe(&self, events: &str) -> Subscription<T> {
        let (sender, receiver) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let tokens: HashSet<String> = events.split_whitespace().map(str::to_string).collect();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .insert(id, Subscriber { tokens, sender });
        Subscription {
            id,
            receiver,
            observer: self.clone(),
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().remove(&id);
    }

    /// Deliver `payload` to every subscriber whose tokens intersect the
    /// space-separated `event`. Returns the number of subscribers reached.
    pub fn trigger(&self, event: &str, payload: T) -> usize {
        let tokens: Vec<&str> = event.split_whitespace().collect();
        let subscribers = self.inner.subscribers.read();
        let mut delivered = 0;
        for subscriber in subscribers.values() {
            if tokens.iter().any(|t| subscriber.tokens.contains(*t)) {
                // receivers may have gone away between unsubscribe and drop
                if subscriber.sender.send(payload.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(event, delivered, "observer triggered");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

/// A live registration on an [`Observer`].
pub struct Subscription<T: Clone> {
    pub id: u64,
    pub receiver: broadcast::Receiver<T>,
    observer: Observer<T>,
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.observer.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_on_token_intersection() {
        let observer: Observer<u32> = Observer::new();
        let mut saved = observer.subscribe("saved");
        let mut watcher = observer.subscribe("hash-abc");
        let mut other = observer.subscribe("hash-zzz");

        let delivered = observer.trigger("saved hash-abc", 7);
        assert_eq!(delivered, 2);

        assert_eq!(saved.receiver.recv().await.unwrap(), 7);
        assert_eq!(watcher.receiver.recv().await.unwrap(), 7);
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn multi_token_subscription_matches_any() {
        let observer: Observer<u32> = Observer::new();
        let mut sub = observer.subscribe("saved iterate-1");
        observer.trigger("iterate-1", 1);
        observer.trigger("saved", 2);
        assert_eq!(sub.receiver.recv().await.unwrap(), 1);
        assert_eq!(sub.receiver.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let observer: Observer<u32> = Observer::new();
        let sub = observer.subscribe("saved");
        assert_eq!(observer.subscriber_count(), 1);
        drop(sub);
        assert_eq!(observer.subscriber_count(), 0);
        assert_eq!(observer.trigger("saved", 1), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest() {
        let observer: Observer<u64> = Observer::new();
        let mut sub = observer.subscribe("saved");
        for i in 0..(SUBSCRIBER_CAPACITY as u64 + 16) {
            observer.trigger("saved", i);
        }
        // the first recv reports the lag, subsequent ones yield newest data
        match sub.receiver.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 16),
            other => panic!("expected lag, got {other:?}"),
        }
        let next = sub.receiver.recv().await.unwrap();
        assert!(next >= 16);
    }
}
