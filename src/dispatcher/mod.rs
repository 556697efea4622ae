//! Stream Dispatcher (§4.2): one dedicated OS thread per worker process that drives a
//! blocking bus consumer and fans each message out to the Subscription Registry.
//!
//! Grounded on `original_source/app/core/kafka_dispatcher.py`'s `start_kafka_dispatcher` for the
//! thread shape and the poll/dispatch/commit loop, and on the teacher's `core/shutdown.rs` for
//! cooperative-stop wiring. The per-subscriber enqueue uses a small current-thread Tokio runtime
//! so `QueueHandle::send_timeout`'s bounded wait can run from a thread that owns no runtime of
//! its own (§5 Scheduling model).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::bus::{BusConsumer, Message};
use crate::core::constants::{DISPATCH_ASSIGNMENT_TIMEOUT_MS, DISPATCH_ENQUEUE_TIMEOUT_MS, DISPATCH_POLL_TIMEOUT_MS};
use crate::registry::{MatchMode, SubscriptionRegistry};

/// Lifecycle of a single dispatcher thread (§4.2 State machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Init,
    AwaitingAssignment,
    Running,
    Stopping,
    Closed,
}

/// Owns the shared state a dispatcher thread reports through; cheap to clone and hand to callers
/// that need to observe (but not drive) the dispatcher.
#[derive(Clone)]
pub struct StreamDispatcher {
    registry: Arc<SubscriptionRegistry>,
    match_mode: MatchMode,
    state: Arc<Mutex<DispatcherState>>,
    drops: Arc<DashMap<Uuid, AtomicU64>>,
}

impl StreamDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, match_mode: MatchMode) -> Self {
        Self {
            registry,
            match_mode,
            state: Arc::new(Mutex::new(DispatcherState::Init)),
            drops: Arc::new(DashMap::new()),
        }
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    /// Number of back-pressure drops recorded for subscriber `id` so far.
    pub fn drop_count(&self, id: Uuid) -> u64 {
        self.drops.get(&id).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Spawns the dedicated OS thread that owns `consumer` for its whole lifetime and runs the
    /// poll/fan-out/commit loop until `shutdown` is triggered or the assignment wait fails.
    pub fn spawn(&self, consumer: Box<dyn BusConsumer>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let match_mode = self.match_mode;
        let state = self.state.clone();
        let drops = self.drops.clone();

        std::thread::spawn(move || {
            *state.lock() = DispatcherState::AwaitingAssignment;
            let assignment_deadline = Duration::from_millis(DISPATCH_ASSIGNMENT_TIMEOUT_MS);
            if let Err(e) = consumer.wait_for_assignment(assignment_deadline) {
                tracing::error!(error = %e, "dispatcher failed to obtain partition assignment, shutting down");
                *state.lock() = DispatcherState::Closed;
                return;
            }

            *state.lock() = DispatcherState::Running;
            tracing::info!("dispatcher running");

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("failed to build dispatcher enqueue runtime");

            let poll_timeout = Duration::from_millis(DISPATCH_POLL_TIMEOUT_MS);
            let enqueue_timeout = Duration::from_millis(DISPATCH_ENQUEUE_TIMEOUT_MS);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                match consumer.poll(poll_timeout) {
                    None => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "bus poll error, skipping");
                        continue;
                    }
                    Some(Ok(message)) => {
                        dispatch_one(&registry, match_mode, &rt, &drops, &*consumer, message, enqueue_timeout);
                    }
                }
            }

            *state.lock() = DispatcherState::Stopping;
            tracing::info!("dispatcher stopping");
            drop(consumer);
            *state.lock() = DispatcherState::Closed;
        })
    }
}

/// Fans one message out to every matching subscriber and commits its offset iff at least one of
/// them actually received it (§9 Resolved open questions: offset-commit policy).
fn dispatch_one(
    registry: &SubscriptionRegistry,
    match_mode: MatchMode,
    rt: &tokio::runtime::Runtime,
    drops: &DashMap<Uuid, AtomicU64>,
    consumer: &dyn BusConsumer,
    message: Message,
    enqueue_timeout: Duration,
) {
    let subscribers = registry.fanout(&message.routing_key, match_mode);
    if subscribers.is_empty() {
        return;
    }

    let mut delivered_any = false;
    for queue in &subscribers {
        let result = rt.block_on(queue.send_timeout(message.payload.clone(), enqueue_timeout));
        match result {
            Ok(()) => delivered_any = true,
            Err(_) => {
                drops.entry(queue.id()).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
                tracing::debug!(subscriber = %queue.id(), routing_key = %message.routing_key, "dropped message for slow subscriber");
            }
        }
    }

    if delivered_any {
        if let Err(e) = consumer.commit(&message) {
            tracing::warn!(error = %e, offset = message.offset, "failed to commit offset");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::bus::consumer::fake::FakeConsumer;
    use crate::bus::Message;
    use crate::registry::new_subscriber;

    fn msg(routing_key: &str, payload: &[u8], offset: i64) -> Message {
        Message {
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
            offset,
            topic: "assets".to_string(),
            partition: 0,
        }
    }

    async fn run_until_drained(
        dispatcher: &StreamDispatcher,
        consumer: Box<dyn BusConsumer>,
        settle: Duration,
    ) -> JoinHandle<()> {
        let (tx, rx) = watch::channel(false);
        let handle = dispatcher.spawn(consumer, rx.clone());
        tokio::time::sleep(settle).await;
        tx.send(true).unwrap();
        drop(rx);
        handle
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_matching_subscriber() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (q1, mut rx1) = new_subscriber(4);
        let (q2, mut rx2) = new_subscriber(4);
        registry.attach("A1", q1);
        registry.attach("A1", q2);

        let committed = Arc::new(AtomicUsize::new(0));
        let consumer = Box::new(FakeConsumer::new(vec![msg("A1", b"payload", 0)], true, committed));

        let dispatcher = StreamDispatcher::new(registry, MatchMode::Exact);
        let handle = run_until_drained(&dispatcher, consumer, Duration::from_millis(200)).await;
        tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();

        assert_eq!(rx1.recv().await, Some(b"payload".to_vec()));
        assert_eq!(rx2.recv().await, Some(b"payload".to_vec()));
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
    }

    #[tokio::test]
    async fn unmatched_routing_key_is_not_delivered_to_other_groups() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (q1, mut rx1) = new_subscriber(4);
        registry.attach("A1", q1);

        let committed = Arc::new(AtomicUsize::new(0));
        let consumer = Box::new(FakeConsumer::new(vec![msg("A2", b"payload", 0)], true, committed));

        let dispatcher = StreamDispatcher::new(registry, MatchMode::Exact);
        let handle = run_until_drained(&dispatcher, consumer, Duration::from_millis(200)).await;
        tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();

        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_blocking_others() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (slow, _rx_slow) = new_subscriber(1);
        let (fast, mut rx_fast) = new_subscriber(4);
        let slow_id = slow.id();
        // Fill the slow queue so the dispatcher's send to it must time out.
        slow.send_timeout(vec![0], Duration::from_millis(50)).await.unwrap();
        registry.attach("A1", slow);
        registry.attach("A1", fast);

        let committed = Arc::new(AtomicUsize::new(0));
        let consumer = Box::new(FakeConsumer::new(vec![msg("A1", b"payload", 0)], true, committed));

        let dispatcher = StreamDispatcher::new(registry, MatchMode::Exact);
        let handle = run_until_drained(&dispatcher, consumer, Duration::from_millis(300)).await;
        tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();

        assert_eq!(rx_fast.recv().await, Some(b"payload".to_vec()));
        assert_eq!(dispatcher.drop_count(slow_id), 1);
    }

    #[tokio::test]
    async fn prefix_mode_fans_out_across_data_items_of_an_asset() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (q1, mut rx1) = new_subscriber(4);
        registry.attach("A1|", q1);

        let committed = Arc::new(AtomicUsize::new(0));
        let consumer = Box::new(FakeConsumer::new(vec![msg("A1|temp", b"payload", 0)], true, committed));

        let dispatcher = StreamDispatcher::new(registry, MatchMode::Prefix);
        let handle = run_until_drained(&dispatcher, consumer, Duration::from_millis(200)).await;
        tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();

        assert_eq!(rx1.recv().await, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn crash_between_delivery_and_commit_causes_redelivery() {
        let committed = Arc::new(AtomicUsize::new(0));
        let message = msg("A1", b"payload", 0);

        // First dispatcher: delivers the message but its commit is lost (simulated crash).
        let registry_a = Arc::new(SubscriptionRegistry::new());
        let (qa, mut rxa) = new_subscriber(4);
        registry_a.attach("A1", qa);
        let consumer_a = Box::new(FakeConsumer::new(vec![message.clone()], true, committed.clone()).crashing());
        let dispatcher_a = StreamDispatcher::new(registry_a, MatchMode::Exact);
        let handle_a = run_until_drained(&dispatcher_a, consumer_a, Duration::from_millis(200)).await;
        tokio::task::spawn_blocking(move || handle_a.join().unwrap()).await.unwrap();
        assert_eq!(rxa.recv().await, Some(b"payload".to_vec()));
        assert_eq!(committed.load(Ordering::SeqCst), 0, "commit must not have persisted");

        // Second dispatcher resumes from the same committed cursor and redelivers the message.
        let registry_b = Arc::new(SubscriptionRegistry::new());
        let (qb, mut rxb) = new_subscriber(4);
        registry_b.attach("A1", qb);
        let consumer_b = Box::new(FakeConsumer::new(vec![message], true, committed.clone()));
        let dispatcher_b = StreamDispatcher::new(registry_b, MatchMode::Exact);
        let handle_b = run_until_drained(&dispatcher_b, consumer_b, Duration::from_millis(200)).await;
        tokio::task::spawn_blocking(move || handle_b.join().unwrap()).await.unwrap();
        assert_eq!(rxb.recv().await, Some(b"payload".to_vec()));
        assert_eq!(committed.load(Ordering::SeqCst), 1, "redelivered message was committed this time");
    }

    #[tokio::test]
    async fn failed_assignment_closes_without_running() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let committed = Arc::new(AtomicUsize::new(0));
        let consumer = Box::new(FakeConsumer::new(vec![], false, committed));
        let dispatcher = StreamDispatcher::new(registry, MatchMode::Exact);
        let (_tx, rx) = watch::channel(false);
        let handle = dispatcher.spawn(consumer, rx);
        tokio::task::spawn_blocking(move || handle.join().unwrap()).await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
    }
}
