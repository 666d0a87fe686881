//! Outbound publishing for queue and notification-bus messages.
//!
//! This module defines a Tower-compatible publishing layer used to send
//! labelled messages through different backends (e.g. in-memory, a queue,
//! a notification bus).
//!
//! Every outbound message carries a pair of routing [`Labels`] (the logical
//! message type and the payload content type) which backends stamp onto the
//! transport's message attributes under the same keys the inbound classifier
//! reads.
//!
//! ## Key components
//!
//! - [`Publisher`]: Public-facing wrapper implementing `tower::Service`
//! - [`SenderService`]: Adapter from a [`Sender`] to a Tower service
//! - [`Sender`]: Trait implemented by concrete sender backends
//! - [`PublishError`]: Unified error type with tracing context

mod inmemory;

pub mod layers;

#[cfg(feature = "sqs")]
pub mod sqs;

#[cfg(feature = "sns")]
pub mod sns;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use tracing_error::SpanTrace;

pub use inmemory::InMemorySender;

/// Attribute name carrying the logical message type.
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "Message-Type";

/// Attribute name carrying the payload content type.
pub const CONTENT_TYPE_ATTRIBUTE: &str = "Content-Type";

/// Routing labels stamped on every outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    /// Logical message type consumers route on.
    pub message_type: String,
    /// Content type describing the body encoding.
    pub content_type: String,
}

impl Labels {
    /// Create labels with an explicit content type.
    pub fn new(message_type: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            content_type: content_type.into(),
        }
    }

    /// Labels for a JSON-encoded body.
    pub fn json(message_type: impl Into<String>) -> Self {
        Self::new(message_type, crate::payload::JSON_CONTENT_TYPE)
    }

    /// Labels for a plain text body.
    pub fn text(message_type: impl Into<String>) -> Self {
        Self::new(message_type, "text/plain")
    }
}

/// Outbound message: routing labels plus a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound<M> {
    /// Routing labels.
    pub labels: Labels,
    /// Message body.
    pub body: M,
}

impl<M> From<(Labels, M)> for Outbound<M> {
    fn from(value: (Labels, M)) -> Self {
        Outbound {
            labels: value.0,
            body: value.1,
        }
    }
}

/// Generic Tower-compatible publisher wrapper.
///
/// `Publisher` is the main entry point for sending outbound messages. It
/// wraps an underlying Tower `Service` and:
///
/// - Normalizes errors into [`PublishError`]
/// - Supports Tower middleware via layers
/// - Provides a convenience [`send`](Publisher::send) API
///
/// Typically constructed from a concrete [`Sender`] implementation.
#[derive(Clone)]
pub struct Publisher<S> {
    service: S,
}

impl<D> Publisher<SenderService<D>> {
    /// Create a new publisher from a concrete sender backend.
    ///
    /// The sender will be wrapped in a [`SenderService`] to make it
    /// Tower-compatible.
    pub fn new(sender: D) -> Self {
        Self {
            service: SenderService::new(sender),
        }
    }
}

impl<S> Publisher<S> {
    /// Apply a Tower layer to the publisher.
    ///
    /// This enables composition with middleware such as encoding, retries,
    /// timeouts, or tracing.
    pub fn layer<L>(self, layer: L) -> Publisher<L::Service>
    where
        L: tower::Layer<S>,
    {
        Publisher {
            service: layer.layer(self.service),
        }
    }
}

/// Tower `Service` implementation for `Publisher`.
///
/// Delegates readiness and request handling to the inner service while
/// mapping all errors into [`PublishError`].
impl<R, S> Service<R> for Publisher<S>
where
    S: Service<R> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<tower::BoxError>,
    R: Send + 'static,
{
    type Response = ();
    type Error = PublishError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| PublishError::sender(e.into()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        let mut service = self.service.clone();

        Box::pin(async move {
            service
                .call(req)
                .await
                .map_err(|e| PublishError::sender(e.into()))?;
            Ok(())
        })
    }
}

impl<S> Publisher<S> {
    /// Send an [`Outbound`] message through the publisher.
    ///
    /// This is a convenience method for users that do not need direct access
    /// to the `tower::Service` API.
    pub async fn send<M>(&mut self, message: Outbound<M>) -> Result<(), PublishError>
    where
        M: Send + 'static,
        S: Service<Outbound<M>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<tower::BoxError>,
    {
        let mut service = self.service.clone();
        service
            .call(message)
            .await
            .map_err(|e| PublishError::sender(e.into()))?;
        Ok(())
    }
}

/// Error returned by publishing operations.
///
/// Each error captures:
/// - The underlying error kind
/// - A tracing span backtrace for improved diagnostics
#[derive(Debug)]
pub struct PublishError {
    context: SpanTrace,
    kind: PublishErrorKind,
}

/// Publish errors kind.
#[derive(Debug)]
pub enum PublishErrorKind {
    /// Errors originating from the sender backend.
    Sender(tower::BoxError),
    /// Errors related to body encoding.
    Encode(tower::BoxError),
}

impl PublishError {
    /// Create a sender-related publish error.
    pub fn sender(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: PublishErrorKind::Sender(err),
        }
    }

    /// Create an encoding-related publish error.
    pub fn encode(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: PublishErrorKind::Encode(err),
        }
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PublishErrorKind::Sender(err) => writeln!(f, "Sender error: {err}"),
            PublishErrorKind::Encode(err) => writeln!(f, "Encode error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            PublishErrorKind::Sender(err) => Some(err.as_ref()),
            PublishErrorKind::Encode(err) => Some(err.as_ref()),
        }
    }
}

/// Tower service adapter for a [`Sender`] backend.
///
/// This type bridges the [`Sender`] trait with Tower's `Service` abstraction.
#[derive(Clone)]
pub struct SenderService<D> {
    sender: D,
}

impl<D> SenderService<D> {
    /// Create a new sender service from a backend.
    pub fn new(sender: D) -> Self {
        Self { sender }
    }
}

/// `tower::Service` implementation delegating to a [`Sender`].
impl<M, D> Service<Outbound<M>> for SenderService<D>
where
    M: Send + 'static,
    D: Sender<M> + Clone + Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Outbound<M>) -> Self::Future {
        let mut sender = self.sender.clone();
        Box::pin(async move {
            sender.send(req).await.map_err(Into::into)?;
            Ok(())
        })
    }
}

/// Trait implemented by concrete sender backends.
///
/// A sender is responsible for delivering an [`Outbound`] message to an
/// external system (e.g. a queue, a notification bus, or an in-memory
/// channel), stamping its labels as transport attributes.
#[async_trait::async_trait]
pub trait Sender<M> {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Send an outbound message using the underlying transport.
    async fn send(&mut self, message: Outbound<M>) -> Result<(), Self::Error>;
}
