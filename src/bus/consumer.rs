//! Abstraction over the message bus client, plus the `rdkafka`-backed implementation.
//!
//! Grounded on the teacher's `data/topics/backend.rs` `TopicBackend` trait (one trait, one real
//! backend) and on `original_source/app/core/kafka_dispatcher.py`'s `build_shared_consumer` for
//! the partition-assignment wait loop and manual-commit mechanics.

use std::time::{Duration, Instant};

use rdkafka::ClientConfig;
use rdkafka::Message as _;
use rdkafka::TopicPartitionList;
use rdkafka::consumer::{BaseConsumer, Consumer, CommitMode};
use rdkafka::Offset;

use crate::core::error::AppError;

use super::message::Message;

/// Blocking bus consumer, driven entirely from a dedicated OS thread (§5 Scheduling model).
pub trait BusConsumer: Send {
    /// Block until the consumer has a partition assignment or `deadline` elapses.
    fn wait_for_assignment(&self, deadline: Duration) -> Result<(), AppError>;

    /// Poll for the next message, bounded by `timeout`. `None` means the bounded wait elapsed
    /// with nothing to deliver; `Some(Err(_))` is a bus-level error for this poll only.
    fn poll(&self, timeout: Duration) -> Option<Result<Message, AppError>>;

    /// Commit the offset immediately following `message`.
    fn commit(&self, message: &Message) -> Result<(), AppError>;
}

pub struct RdkafkaConsumer {
    consumer: BaseConsumer,
}

impl RdkafkaConsumer {
    pub fn new(broker: &str, topic: &str, group_id: &str) -> Result<Self, AppError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("group.id", group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| AppError::PreconditionFailed(format!("failed to create kafka consumer: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| AppError::PreconditionFailed(format!("failed to subscribe to {topic}: {e}")))?;

        Ok(Self { consumer })
    }
}

impl BusConsumer for RdkafkaConsumer {
    fn wait_for_assignment(&self, deadline: Duration) -> Result<(), AppError> {
        let start = Instant::now();
        loop {
            self.consumer.poll(Duration::from_millis(100));
            let assignment = self
                .consumer
                .assignment()
                .map_err(|e| AppError::PreconditionFailed(format!("failed to read assignment: {e}")))?;
            if !assignment.elements().is_empty() {
                tracing::debug!(partitions = assignment.elements().len(), "partition assignment obtained");
                return Ok(());
            }
            if start.elapsed() >= deadline {
                return Err(AppError::PreconditionFailed(
                    "kafka consumer failed to get partition assignment".into(),
                ));
            }
        }
    }

    fn poll(&self, timeout: Duration) -> Option<Result<Message, AppError>> {
        match self.consumer.poll(timeout) {
            None => None,
            Some(Ok(borrowed)) => {
                let routing_key = borrowed
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .unwrap_or_default();
                let payload = borrowed.payload().map(|p| p.to_vec()).unwrap_or_default();
                Some(Ok(Message {
                    routing_key,
                    payload,
                    offset: borrowed.offset(),
                    topic: borrowed.topic().to_string(),
                    partition: borrowed.partition(),
                }))
            }
            Some(Err(e)) => Some(Err(AppError::UpstreamUnavailable(format!("kafka poll error: {e}")))),
        }
    }

    fn commit(&self, message: &Message) -> Result<(), AppError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| AppError::UpstreamUnavailable(format!("failed to build commit offset: {e}")))?;
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| AppError::UpstreamUnavailable(format!("kafka commit failed: {e}")))
    }
}

#[cfg(test)]
pub mod fake {
    //! An in-memory `BusConsumer` used by dispatcher tests to exercise fan-out, back-pressure
    //! and crash-redelivery without a real Kafka broker.
    //!
    //! Models a Kafka-like log: messages are delivered from a per-instance position that starts
    //! at the *shared* committed offset, independently of whether this instance's own polls have
    //! been committed yet — so a second instance built on the same `committed` cursor after a
    //! simulated crash re-delivers exactly the messages the first instance never committed.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    pub struct FakeConsumer {
        messages: Vec<Message>,
        deliver_cursor: AtomicUsize,
        committed: Arc<AtomicUsize>,
        assigned: bool,
        /// When false, `commit` is a no-op — simulates a crash between enqueue and commit.
        persist_commits: bool,
    }

    impl FakeConsumer {
        pub fn new(messages: Vec<Message>, assigned: bool, committed: Arc<AtomicUsize>) -> Self {
            let start = committed.load(Ordering::SeqCst);
            Self {
                messages,
                deliver_cursor: AtomicUsize::new(start),
                committed,
                assigned,
                persist_commits: true,
            }
        }

        pub fn crashing(mut self) -> Self {
            self.persist_commits = false;
            self
        }
    }

    impl BusConsumer for FakeConsumer {
        fn wait_for_assignment(&self, _deadline: Duration) -> Result<(), AppError> {
            if self.assigned {
                Ok(())
            } else {
                Err(AppError::PreconditionFailed("no partitions assigned".into()))
            }
        }

        fn poll(&self, _timeout: Duration) -> Option<Result<Message, AppError>> {
            let idx = self.deliver_cursor.fetch_add(1, Ordering::SeqCst);
            self.messages.get(idx).cloned().map(Ok)
        }

        fn commit(&self, message: &Message) -> Result<(), AppError> {
            if self.persist_commits {
                self.committed.store(message.offset as usize + 1, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
