//! Consumer loop pulling queue messages through the routing pipeline.
//!
//! This module implements a generic *queue consumer* that:
//!
//! - Fetches batches of messages from a queue source
//! - Resolves every message concurrently through classify → decode → dispatch
//! - Acknowledges consumed and discarded messages with one bulk delete
//! - Exposes lifecycle hooks for observability and customization
//!
//! The consumer runs until its [`CancellationToken`] is triggered. Nothing
//! else stops it: receive errors, handler failures, and acknowledgement
//! failures are logged and the loop carries on with the next cycle.
//! Messages that resolve to a retry are simply not deleted; the queue
//! redelivers them once their visibility timeout elapses, so delivery is
//! at-least-once and handlers own their idempotence.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::message::RawMessage;
use crate::router::{DispatchOutcome, Router};
use crate::source::{DeleteEntry, DeleteFailure, DeleteMessages, ReceiveMessages, ReceiveOptions};

/// Queue consumer.
///
/// The `Consumer` continuously fetches messages from a source and routes
/// them through a [`Router`]. Messages whose outcome removes them are
/// deleted in bulk at the end of each cycle.
///
/// Generic parameters:
/// - `S`: queue source implementation
/// - `HK`: hook implementation for lifecycle events
pub struct Consumer<S, HK> {
    source: S,
    router: Arc<Router>,
    hook: HK,
    receive: ReceiveOptions,
    poll_interval: Duration,
}

impl<S> Consumer<S, DefaultConsumerHook>
where
    S: ReceiveMessages + DeleteMessages,
{
    /// Create a new consumer with the default hook implementation.
    pub fn new(source: S, router: Router) -> Self {
        Self {
            source,
            router: Arc::new(router),
            hook: DefaultConsumerHook,
            receive: ReceiveOptions::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl<S, HK> Consumer<S, HK>
where
    S: ReceiveMessages + DeleteMessages,
    HK: ConsumerHook,
{
    /// Replace the consumer hook while keeping all other generics unchanged.
    ///
    /// This allows customizing behavior (logging, metrics, etc.) without
    /// rebuilding the consumer.
    pub fn with_hook<HK2: ConsumerHook>(self, hook: HK2) -> Consumer<S, HK2> {
        Consumer {
            source: self.source,
            router: self.router,
            hook,
            receive: self.receive,
            poll_interval: self.poll_interval,
        }
    }

    /// Set the receive options used for every fetch.
    pub fn with_receive_options(mut self, options: ReceiveOptions) -> Self {
        self.receive = options;
        self
    }

    /// Set the pause between poll cycles.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the consumer loop.
    ///
    /// Each cycle fetches a batch, resolves it, acknowledges it, and pauses
    /// for the poll interval. The fetch and the pause race against the
    /// [`CancellationToken`]; once a batch is in hand, processing and
    /// acknowledgement always run to completion so cancellation never strands
    /// an in-flight deletion.
    #[tracing::instrument(skip_all)]
    pub async fn run(self, cancel: CancellationToken) {
        self.hook.on_startup();

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = self.source.receive_messages(self.receive) => fetched,
            };

            self.run_cycle(fetched).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.hook.on_shutdown();
    }

    /// Fetch, resolve, and acknowledge a single batch.
    ///
    /// [`run`](Consumer::run) drives the same steps in a loop; this is the
    /// entry point for callers that want to pace the pipeline themselves.
    pub async fn poll_once(&self) {
        let fetched = self.source.receive_messages(self.receive).await;
        self.run_cycle(fetched).await;
    }

    async fn run_cycle(&self, fetched: Result<Vec<RawMessage>, <S as ReceiveMessages>::Error>) {
        match fetched {
            Ok(messages) if !messages.is_empty() => {
                self.hook.on_batch_received(messages.len());
                let outcomes = self.process_batch(messages).await;
                self.acknowledge(outcomes).await;
            }
            Ok(_) => {}
            Err(error) => {
                let error: tower::BoxError = error.into();
                self.hook.on_receive_error(error.as_ref());
            }
        }
    }

    /// Resolve every message in the batch concurrently.
    ///
    /// Messages are independent: each pipeline runs on its own task and a
    /// panic in one resolves that message to a retry without touching its
    /// siblings. All outcomes are collected before returning, so
    /// acknowledgement never observes a half-resolved batch.
    async fn process_batch(&self, messages: Vec<RawMessage>) -> Vec<(RawMessage, DispatchOutcome)> {
        let mut tasks = Vec::with_capacity(messages.len());
        for message in messages {
            let router = Arc::clone(&self.router);
            let task = tokio::spawn({
                let message = message.clone();
                async move { router.process(&message).await }
            });
            tasks.push((message, task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (message, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(id = %message.id, %error, "message pipeline aborted");
                    DispatchOutcome::Retry
                }
            };

            match outcome {
                DispatchOutcome::Consumed => self.hook.on_message_consumed(&message.id),
                DispatchOutcome::Retry => self.hook.on_message_retained(&message.id),
                DispatchOutcome::Discard => self.hook.on_message_discarded(&message.id),
            }
            outcomes.push((message, outcome));
        }

        outcomes
    }

    /// Issue one bulk delete for every message resolved as removable.
    ///
    /// Retained messages are left untouched. Per-entry rejections and a
    /// failing delete call are both logged and swallowed; the affected
    /// messages reappear after their visibility timeout and the next cycle
    /// picks them up again.
    async fn acknowledge(&self, outcomes: Vec<(RawMessage, DispatchOutcome)>) {
        let entries: Vec<DeleteEntry> = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.removes_message())
            .map(|(message, _)| DeleteEntry::from(message))
            .collect();

        if entries.is_empty() {
            return;
        }

        match self.source.delete_messages(entries).await {
            Ok(report) => {
                for failure in &report.failed {
                    self.hook.on_delete_failure(failure);
                }
                self.hook.on_acknowledged(report.deleted.len());
            }
            Err(error) => {
                let error: tower::BoxError = error.into();
                self.hook.on_acknowledge_error(error.as_ref());
            }
        }
    }
}

/// Hook trait for observing consumer lifecycle events.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking work.
/// Typical use cases include logging, metrics, and tracing integration.
pub trait ConsumerHook: Send + Sync {
    fn on_startup(&self);
    fn on_shutdown(&self);
    fn on_batch_received(&self, count: usize);
    fn on_receive_error(&self, error: &dyn std::error::Error);
    fn on_message_consumed(&self, id: &str);
    fn on_message_retained(&self, id: &str);
    fn on_message_discarded(&self, id: &str);
    fn on_delete_failure(&self, failure: &DeleteFailure);
    fn on_acknowledged(&self, deleted: usize);
    fn on_acknowledge_error(&self, error: &dyn std::error::Error);
}

/// Default consumer hook implementation.
///
/// Logs lifecycle events using `tracing`.
pub struct DefaultConsumerHook;

impl ConsumerHook for DefaultConsumerHook {
    fn on_startup(&self) {
        tracing::info!("Consumer is starting up");
    }

    fn on_shutdown(&self) {
        tracing::info!("Consumer is shutting down");
    }

    fn on_batch_received(&self, count: usize) {
        tracing::debug!(count, "Fetched batch of messages");
    }

    fn on_receive_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Error receiving messages");
    }

    fn on_message_consumed(&self, id: &str) {
        tracing::debug!(id, "Message consumed");
    }

    fn on_message_retained(&self, id: &str) {
        tracing::debug!(id, "Message retained for redelivery");
    }

    fn on_message_discarded(&self, id: &str) {
        tracing::debug!(id, "Message discarded");
    }

    fn on_delete_failure(&self, failure: &DeleteFailure) {
        tracing::error!(
            id = %failure.id,
            code = failure.code.as_deref().unwrap_or("unknown"),
            reason = failure.reason.as_deref().unwrap_or("n/a"),
            "Failed to delete message; it will be redelivered",
        );
    }

    fn on_acknowledged(&self, deleted: usize) {
        tracing::info!(deleted, "Deleted messages from queue");
    }

    fn on_acknowledge_error(&self, error: &dyn std::error::Error) {
        tracing::error!(?error, "Error deleting messages");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::message::AttributeValue;
    use crate::payload::Payload;
    use crate::router::HandlerError;
    use crate::source::InMemorySource;

    async fn ok_handler(_message: RawMessage, _payload: Payload) -> Result<(), HandlerError> {
        Ok(())
    }

    fn json_message(id: &str, message_type: &str, body: &str) -> RawMessage {
        RawMessage::new(id, "", body)
            .with_attribute("Message-Type", AttributeValue::string(message_type))
            .with_attribute("Content-Type", AttributeValue::string("application/json"))
    }

    #[tokio::test]
    async fn mixed_batch_deletes_only_resolved_messages() {
        let source = InMemorySource::new();
        source.push(json_message("m-1", "template", "{\"user\": 7}")).await;
        source.push(RawMessage::new("m-2", "", "no type here")).await;

        let handled = Arc::new(AtomicUsize::new(0));
        let handled_by_handler = Arc::clone(&handled);
        let handler = move |_message: RawMessage, _payload: Payload| {
            let handled = Arc::clone(&handled_by_handler);
            async move {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        // Unroutable messages are retained, so only the handled one is
        // deleted from the queue.
        let router = Router::new().route("template", handler).keep_unknown();
        let consumer = Consumer::new(source.clone(), router);

        consumer.poll_once().await;

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(source.in_flight().await, 1);
        assert_eq!(source.ready().await, 0);
    }

    #[tokio::test]
    async fn bus_wrapped_unknown_type_is_discarded_by_policy() {
        let body = serde_json::json!({
            "Type": "Notification",
            "MessageId": "n-1",
            "Message": "payload",
            "MessageAttributes": {
                "MessageType": {"Type": "String", "Value": "unknown"}
            }
        })
        .to_string();

        let source = InMemorySource::new();
        source.push(RawMessage::new("m-1", "", body)).await;

        let consumer = Consumer::new(source.clone(), Router::new().route("template", ok_handler));
        consumer.poll_once().await;

        // Discarded by the delete-unknown default: gone from the queue.
        assert_eq!(source.ready().await, 0);
        assert_eq!(source.in_flight().await, 0);
    }

    #[tokio::test]
    async fn failing_handler_retains_message_until_redelivery_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_by_handler = Arc::clone(&attempts);
        let handler = move |_message: RawMessage, _payload: Payload| {
            let attempts = Arc::clone(&attempts_by_handler);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err("downstream unavailable".into());
                }
                Ok(())
            }
        };

        let source = InMemorySource::new();
        source.push(json_message("m-1", "template", "{\"user\": 7}")).await;

        let consumer = Consumer::new(source.clone(), Router::new().route("template", handler));

        // First cycle fails the handler: the message stays in flight.
        consumer.poll_once().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.in_flight().await, 1);

        // Visibility timeout expires; the next cycle consumes it.
        source.release_inflight().await;
        consumer.poll_once().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(source.in_flight().await, 0);
        assert_eq!(source.ready().await, 0);
    }

    async fn panicking_handler(_message: RawMessage, _payload: Payload) -> Result<(), HandlerError> {
        panic!("handler bug");
    }

    #[tokio::test]
    async fn panicking_pipeline_does_not_abort_siblings() {
        let source = InMemorySource::new();
        source.push(json_message("m-1", "broken", "{}")).await;
        source.push(json_message("m-2", "template", "{}")).await;

        let router = Router::new()
            .route("broken", panicking_handler)
            .route("template", ok_handler);
        let consumer = Consumer::new(source.clone(), router);

        consumer.poll_once().await;

        // The healthy message was consumed; the panicked one is retained.
        assert_eq!(source.in_flight().await, 1);
        assert_eq!(source.ready().await, 0);
    }

    #[tokio::test]
    async fn empty_fetch_skips_acknowledgement() {
        let source = InMemorySource::new();
        let consumer = Consumer::new(source.clone(), Router::new().route("template", ok_handler));

        consumer.poll_once().await;

        assert_eq!(source.ready().await, 0);
        assert_eq!(source.in_flight().await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let source = InMemorySource::new();
        source.push(json_message("m-1", "template", "{\"user\": 7}")).await;

        let consumer = Consumer::new(source.clone(), Router::new().route("template", ok_handler))
            .with_poll_interval(Duration::from_millis(5));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(consumer.run(cancel.clone()));

        // Give the loop a few cycles to consume the message, then cancel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(source.ready().await, 0);
        assert_eq!(source.in_flight().await, 0);
    }
}
