//! Payload handoff to the consumer application.
//!
//! The consumer may not be running (or connected) when a reminder is
//! escalated. Payloads that cannot be forwarded are buffered in a
//! process-lifetime FIFO queue and flushed when the channel connects.
//! The persisted last-unseen slot in the store is the cross-restart
//! equivalent, consumed separately via the command interface.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::payload::ReminderPayload;

/// The consumer rejected or could not receive a forward.
#[derive(Debug, Error)]
#[error("consumer channel error: {0}")]
pub struct ConsumerError(pub String);

/// The command channel into the consumer application.
pub trait ConsumerChannel: Send + Sync {
    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;
    /// Deliver a reminder reference: the task id when the payload has
    /// one, otherwise the raw payload string.
    fn show_reminder(&self, reference: &str) -> Result<(), ConsumerError>;
}

/// Forwards payloads to the consumer, queueing while disconnected.
pub struct HandoffQueue {
    consumer: Arc<dyn ConsumerChannel>,
    queue: Mutex<VecDeque<String>>,
}

impl HandoffQueue {
    pub fn new(consumer: Arc<dyn ConsumerChannel>) -> Self {
        Self {
            consumer,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Forward the payload if the consumer is connected, otherwise
    /// queue it. A forward failure queues the payload as well.
    pub async fn forward_or_queue(&self, payload: String) {
        if !self.consumer.is_connected() {
            debug!("consumer not connected, queueing payload");
            self.queue.lock().await.push_back(payload);
            return;
        }
        if let Err(e) = self.forward(&payload) {
            warn!(error = %e, "forward failed, queueing payload");
            self.queue.lock().await.push_back(payload);
        }
    }

    /// Flush the queue in FIFO order. Each payload is attempted once;
    /// successes are removed, failures are retained in order for the
    /// next flush. Never drops and never reorders.
    pub async fn flush(&self) {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return;
        }
        info!(pending = queue.len(), "flushing queued payloads");

        let mut retained = VecDeque::new();
        while let Some(payload) = queue.pop_front() {
            if !self.consumer.is_connected() {
                retained.push_back(payload);
                retained.extend(queue.drain(..));
                break;
            }
            if let Err(e) = self.forward(&payload) {
                warn!(error = %e, "flush forward failed, keeping payload queued");
                retained.push_back(payload);
            }
        }
        *queue = retained;
    }

    /// Number of payloads awaiting handoff.
    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    fn forward(&self, payload: &str) -> Result<(), ConsumerError> {
        let parsed = ReminderPayload::parse(Some(payload));
        match parsed.task_id() {
            Some(task_id) => {
                debug!(task_id, "forwarding reminder by task id");
                self.consumer.show_reminder(task_id)
            }
            None => {
                debug!("payload has no task id, forwarding raw");
                self.consumer.show_reminder(payload)
            }
        }
    }
}

/// Consumer stand-in for the daemon binary: always connected, delivery
/// is a structured log line. Real consumers attach at this trait.
pub struct LoggingConsumer;

impl ConsumerChannel for LoggingConsumer {
    fn is_connected(&self) -> bool {
        true
    }

    fn show_reminder(&self, reference: &str) -> Result<(), ConsumerError> {
        info!(reference, "showReminder");
        Ok(())
    }
}
