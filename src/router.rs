//! Message routing and dispatch.
//!
//! The router is a flat capability table: a static, case-sensitive mapping
//! from message-type string to a handler. Dispatch resolves every message to
//! exactly one outcome (consume, retry, or discard) and never lets a
//! handler error escape.
//!
//! ## Dispatch policy
//!
//! Applied in order, before the handler runs:
//!
//! 1. A message with no type (or an empty one) is unroutable.
//! 2. A payload that failed to decode is unroutable; a malformed body will
//!    not become well-formed on redelivery.
//! 3. A type with no registered handler is unroutable.
//! 4. Otherwise the handler runs; a handler error leaves the message in the
//!    queue for redelivery after the visibility timeout.
//!
//! Unroutable messages are discarded by default; `keep_unknown` leaves them
//! in the queue instead.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::message::RawMessage;
use crate::payload::{DecodeError, Payload};

/// Error type returned by message handlers.
pub type HandlerError = tower::BoxError;

/// Capability invoked for one logical message type.
///
/// Implemented for any plain async function of the right shape, so a
/// routing table reads as a list of `(type, handler_fn)` pairs.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one message.
    ///
    /// Errors are caught by the dispatcher; the message stays queued and is
    /// redelivered, so handlers are responsible for their own idempotence.
    async fn handle(&self, message: RawMessage, payload: Payload) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(RawMessage, Payload) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: RawMessage, payload: Payload) -> Result<(), HandlerError> {
        (self)(message, payload).await
    }
}

/// Resolution of a single dispatch attempt.
///
/// Every message resolves to exactly one of these; errors never surface as
/// outcomes of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled successfully; the message can be removed from the queue.
    Consumed,
    /// Transient failure; the message stays queued for redelivery.
    Retry,
    /// Unroutable message discarded by policy; removed without handling.
    Discard,
}

impl DispatchOutcome {
    /// Whether the message should be removed from the queue.
    pub fn removes_message(&self) -> bool {
        matches!(self, DispatchOutcome::Consumed | DispatchOutcome::Discard)
    }
}

/// Routing table mapping message types to handlers.
pub struct Router {
    routes: HashMap<String, Box<dyn Handler>>,
    delete_unknown: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            delete_unknown: true,
        }
    }
}

impl Router {
    /// Create an empty router that discards unroutable messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a message type.
    ///
    /// Lookup is an exact, case-sensitive match. Registering the same type
    /// twice replaces the previous handler.
    pub fn route(mut self, message_type: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.routes.insert(message_type.into(), Box::new(handler));
        self
    }

    /// Leave unroutable messages in the queue instead of discarding them.
    pub fn keep_unknown(mut self) -> Self {
        self.delete_unknown = false;
        self
    }

    /// Classify, decode, and dispatch a single message.
    pub async fn process(&self, message: &RawMessage) -> DispatchOutcome {
        let envelope = Envelope::classify(message);
        let payload = Payload::decode(envelope.payload(), envelope.content_type());
        self.dispatch(message, &envelope, payload).await
    }

    /// Dispatch a classified message to its handler.
    ///
    /// See the module documentation for the resolution order.
    #[tracing::instrument(skip_all, fields(id = %message.id))]
    pub async fn dispatch(
        &self,
        message: &RawMessage,
        envelope: &Envelope,
        payload: Result<Payload, DecodeError>,
    ) -> DispatchOutcome {
        // An empty type attribute routes nowhere; treat it as absent.
        let Some(message_type) = envelope.message_type().filter(|t| !t.is_empty()) else {
            tracing::warn!(id = %message.id, "message carries no type attribute");
            return self.unroutable();
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(id = %message.id, %error, "failed to decode message payload");
                return self.unroutable();
            }
        };

        let Some(handler) = self.routes.get(message_type) else {
            tracing::warn!(id = %message.id, message_type, "no handler registered for message type");
            return self.unroutable();
        };

        match handler.handle(message.clone(), payload).await {
            Ok(()) => DispatchOutcome::Consumed,
            Err(error) => {
                tracing::error!(
                    id = %message.id,
                    message_type,
                    %error,
                    "handler failed; message left queued for redelivery",
                );
                DispatchOutcome::Retry
            }
        }
    }

    fn unroutable(&self) -> DispatchOutcome {
        if self.delete_unknown {
            DispatchOutcome::Discard
        } else {
            DispatchOutcome::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::message::AttributeValue;

    async fn ok_handler(_message: RawMessage, _payload: Payload) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn failing_handler(_message: RawMessage, _payload: Payload) -> Result<(), HandlerError> {
        Err("downstream unavailable".into())
    }

    fn typed_message(message_type: &str, body: &str) -> RawMessage {
        RawMessage::new("m-1", "rcpt-1", body)
            .with_attribute("Message-Type", AttributeValue::string(message_type))
    }

    #[tokio::test]
    async fn registered_handler_consumes_message() {
        let router = Router::new().route("greeting", ok_handler);
        let outcome = router.process(&typed_message("greeting", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Consumed);
    }

    #[tokio::test]
    async fn handler_receives_decoded_payload() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_handler = Arc::clone(&seen);
        let handler = move |_message: RawMessage, payload: Payload| {
            let seen = Arc::clone(&seen_by_handler);
            async move {
                let value = payload.as_json().ok_or("expected a structured payload")?;
                seen.store(value["count"].as_u64().unwrap_or(0) as usize, Ordering::SeqCst);
                Ok(())
            }
        };

        let router = Router::new().route("counter", handler);
        let message = typed_message("counter", "{\"count\": 3}")
            .with_attribute("Content-Type", AttributeValue::string("application/json"));

        assert_eq!(router.process(&message).await, DispatchOutcome::Consumed);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handler_failure_retries() {
        let router = Router::new().route("greeting", failing_handler);
        let outcome = router.process(&typed_message("greeting", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Retry);
    }

    #[tokio::test]
    async fn missing_type_is_discarded_by_default() {
        let router = Router::new().route("greeting", ok_handler);
        let outcome = router.process(&RawMessage::new("m-1", "rcpt-1", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Discard);
    }

    #[tokio::test]
    async fn missing_type_is_retained_when_keeping_unknown() {
        let router = Router::new().route("greeting", ok_handler).keep_unknown();
        let outcome = router.process(&RawMessage::new("m-1", "rcpt-1", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Retry);
    }

    #[tokio::test]
    async fn empty_type_is_treated_as_missing() {
        let router = Router::new().route("", ok_handler);
        let outcome = router.process(&typed_message("", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Discard);
    }

    #[tokio::test]
    async fn unregistered_type_follows_policy() {
        let router = Router::new().route("greeting", ok_handler);
        let outcome = router.process(&typed_message("unknown", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Discard);

        let router = Router::new().route("greeting", ok_handler).keep_unknown();
        let outcome = router.process(&typed_message("unknown", "hello")).await;
        assert_eq!(outcome, DispatchOutcome::Retry);
    }

    #[tokio::test]
    async fn malformed_json_payload_is_unroutable_not_transient() {
        let router = Router::new().route("greeting", ok_handler);
        let message = typed_message("greeting", "{not json")
            .with_attribute("Content-Type", AttributeValue::string("application/json"));

        assert_eq!(router.process(&message).await, DispatchOutcome::Discard);

        let router = Router::new().route("greeting", ok_handler).keep_unknown();
        assert_eq!(router.process(&message).await, DispatchOutcome::Retry);
    }

    #[tokio::test]
    async fn decode_check_precedes_registry_lookup() {
        // Even a type that routes nowhere resolves via the decode arm first,
        // so a valid type with a broken payload is never routed.
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_by_handler = Arc::clone(&calls);
        let handler = move |_message: RawMessage, _payload: Payload| {
            let calls = Arc::clone(&calls_by_handler);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };

        let router = Router::new().route("greeting", handler);
        let message = typed_message("greeting", "{not json")
            .with_attribute("Content-Type", AttributeValue::string("application/json"));

        assert_eq!(router.process(&message).await, DispatchOutcome::Discard);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bus_wrapped_message_routes_by_nested_type() {
        let body = serde_json::json!({
            "Type": "Notification",
            "Message": "hello",
            "MessageAttributes": {
                "Message-Type": {"Type": "String", "Value": "greeting"}
            }
        })
        .to_string();

        let router = Router::new().route("greeting", ok_handler);
        let outcome = router.process(&RawMessage::new("m-1", "rcpt-1", body)).await;
        assert_eq!(outcome, DispatchOutcome::Consumed);
    }
}
