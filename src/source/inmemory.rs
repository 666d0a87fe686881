use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::message::RawMessage;
use crate::source::{DeleteEntry, DeleteFailure, DeleteMessages, DeleteReport, ReceiveMessages, ReceiveOptions};

/// An in-memory queue source for testing or local pipelines.
///
/// Fetched messages move to an in-flight set keyed by a freshly assigned
/// receipt handle, mimicking a visibility timeout: they are not handed out
/// again until [`release_inflight`](InMemorySource::release_inflight) puts
/// them back, the way a real queue would after the timeout elapses. Deleting
/// an entry whose receipt handle is unknown is reported as a per-entry
/// failure, which exercises the consumer's partial-failure path.
#[derive(Clone, Default)]
pub struct InMemorySource {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    ready: VecDeque<RawMessage>,
    in_flight: HashMap<String, RawMessage>,
    receipt_counter: u64,
}

impl InMemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message for delivery.
    ///
    /// The receipt handle is assigned at fetch time; whatever the message
    /// carries here is ignored.
    pub async fn push(&self, message: RawMessage) {
        self.inner.lock().await.ready.push_back(message);
    }

    /// Number of messages waiting to be fetched.
    pub async fn ready(&self) -> usize {
        self.inner.lock().await.ready.len()
    }

    /// Number of messages fetched but not yet deleted.
    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Return all in-flight messages to the queue, as if their visibility
    /// timeout expired.
    pub async fn release_inflight(&self) {
        let mut inner = self.inner.lock().await;
        let released: Vec<RawMessage> = inner.in_flight.drain().map(|(_, m)| m).collect();
        inner.ready.extend(released);
    }
}

#[async_trait::async_trait]
impl ReceiveMessages for InMemorySource {
    type Error = std::convert::Infallible;

    /// Fetch up to `max_messages` ready messages, moving them in flight.
    ///
    /// Never waits: an empty queue returns an empty batch immediately.
    async fn receive_messages(
        &self,
        options: ReceiveOptions,
    ) -> Result<Vec<RawMessage>, Self::Error> {
        let mut inner = self.inner.lock().await;
        let mut batch = Vec::new();

        while batch.len() < options.max_messages {
            let Some(mut message) = inner.ready.pop_front() else {
                break;
            };
            inner.receipt_counter += 1;
            message.receipt_handle = format!("rcpt-{}", inner.receipt_counter);
            inner
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
            batch.push(message);
        }

        Ok(batch)
    }
}

#[async_trait::async_trait]
impl DeleteMessages for InMemorySource {
    type Error = std::convert::Infallible;

    /// Remove in-flight messages by receipt handle.
    ///
    /// Unknown receipt handles are reported as per-entry failures.
    async fn delete_messages(
        &self,
        entries: Vec<DeleteEntry>,
    ) -> Result<DeleteReport, Self::Error> {
        let mut inner = self.inner.lock().await;
        let mut report = DeleteReport::default();

        for entry in entries {
            if inner.in_flight.remove(&entry.receipt_handle).is_some() {
                report.deleted.push(entry.id);
            } else {
                report.failed.push(DeleteFailure {
                    id: entry.id,
                    code: Some("ReceiptHandleIsInvalid".to_owned()),
                    reason: Some("no in-flight message for receipt handle".to_owned()),
                });
            }
        }

        Ok(report)
    }
}
