//! Subscription Registry (§4.1): a thread-safe map from routing key to the set of live
//! subscriber queues registered under it.
//!
//! Grounded on the teacher's `data/topics/pubsub.rs` `PubSubManager`/`ManagedSubscription`:
//! double-checked-locking on the map, a stable snapshot taken under the lock and used lock-free
//! afterwards, and detach-on-drop so a connection can never leak its queue.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Matching policy the Stream Dispatcher uses to resolve a message's routing key against
/// registered subscription keys (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// `key == message.routing_key`. Default for worker services.
    Exact,
    /// `key` is a prefix of `message.routing_key`. Legacy mode.
    Prefix,
}

/// A handle to one subscriber's bounded queue, cheap to clone and compared by identity so the
/// registry can store and later remove exactly one registration (R1).
#[derive(Clone)]
pub struct QueueHandle {
    id: Uuid,
    sender: mpsc::Sender<Vec<u8>>,
}

impl QueueHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Async enqueue, bounded by `timeout`. Used from the dispatcher's dedicated thread via a
    /// small current-thread runtime (§5 suspension points).
    pub async fn send_timeout(&self, payload: Vec<u8>, timeout: Duration) -> Result<(), EnqueueTimeout> {
        tokio::time::timeout(timeout, self.sender.send(payload))
            .await
            .map_err(|_| EnqueueTimeout)?
            .map_err(|_| EnqueueTimeout)
    }
}

#[derive(Debug)]
pub struct EnqueueTimeout;

/// Create a fresh bounded subscriber queue (§3 SubscriberQueue). Returns the handle the registry
/// stores and the receiver the SSE Endpoint drains.
pub fn new_subscriber(capacity: usize) -> (QueueHandle, mpsc::Receiver<Vec<u8>>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (
        QueueHandle {
            id: Uuid::new_v4(),
            sender,
        },
        receiver,
    )
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<HashMap<String, Vec<QueueHandle>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `queue` to the set for `key`, creating the entry if absent.
    pub fn attach(&self, key: &str, queue: QueueHandle) {
        self.inner.lock().entry(key.to_string()).or_default().push(queue);
    }

    /// Removes the queue identified by `id` from `key`'s set; deletes the entry when the set
    /// becomes empty (R2).
    pub fn detach(&self, key: &str, id: Uuid) {
        let mut inner = self.inner.lock();
        if let Some(queues) = inner.get_mut(key) {
            queues.retain(|q| q.id() != id);
            if queues.is_empty() {
                inner.remove(key);
            }
        }
    }

    /// Stable snapshot of subscribers whose registered key matches `message_key` under `mode`.
    /// The snapshot is independent of concurrent mutation: it is cloned while the lock is held
    /// and the lock is released before any queue I/O happens (§5 Shared-resource policy).
    pub fn fanout(&self, message_key: &str, mode: MatchMode) -> Vec<QueueHandle> {
        let inner = self.inner.lock();
        match mode {
            MatchMode::Exact => inner.get(message_key).cloned().unwrap_or_default(),
            MatchMode::Prefix => inner
                .iter()
                .filter(|(registered_key, _)| message_key.starts_with(registered_key.as_str()))
                .flat_map(|(_, queues)| queues.iter().cloned())
                .collect(),
        }
    }

    /// Snapshot of currently-subscribed keys.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    #[cfg(test)]
    fn queue_count(&self, key: &str) -> usize {
        self.inner.lock().get(key).map(Vec::len).unwrap_or(0)
    }
}
