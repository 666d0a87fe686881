//! Queue source abstractions and backend drivers.
//!
//! A queue source is the inbound collaborator of the consumer: it hands out
//! batches of raw messages under a visibility timeout and removes the ones
//! the consumer resolved as done.
//!
//! ## Components
//!
//! - [`ReceiveMessages`]: trait for fetching a batch of messages
//! - [`DeleteMessages`]: trait for bulk-removing acknowledged messages
//! - [`ReceiveOptions`]: per-fetch tuning (batch size, long-poll wait,
//!   visibility timeout)
//! - [`DeleteReport`]: per-entry result of a bulk delete
//!
//! Concrete implementations are provided by backend modules such as
//! [`inmemory`] and [`sqs`] (feature-gated). Backends are expected to be
//! cheap to clone and to acquire any underlying client per operation rather
//! than holding it for the consumer's lifetime.

pub mod inmemory;

#[cfg(feature = "sqs")]
pub mod sqs;

use std::time::Duration;

use crate::message::RawMessage;

pub use inmemory::InMemorySource;

/// Options governing a single receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages fetched per call.
    pub max_messages: usize,
    /// How long the backend may long-poll waiting for messages.
    pub wait_time: Duration,
    /// Window during which fetched messages stay hidden from other consumers.
    pub visibility_timeout: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(20),
        }
    }
}

/// Entry identifying one message in a bulk delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    /// Identifier of the message being removed.
    pub id: String,
    /// Receipt handle from the fetch that produced the message.
    pub receipt_handle: String,
}

impl From<&RawMessage> for DeleteEntry {
    fn from(message: &RawMessage) -> Self {
        Self {
            id: message.id.clone(),
            receipt_handle: message.receipt_handle.clone(),
        }
    }
}

/// Per-entry failure reported by a bulk delete call.
///
/// A failed entry stays in the queue and is redelivered once its visibility
/// timeout elapses; the next cycle retries it naturally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    /// Identifier of the message that was not removed.
    pub id: String,
    /// Backend-specific failure code, when available.
    pub code: Option<String>,
    /// Human-readable detail, when available.
    pub reason: Option<String>,
}

/// Result of a bulk delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Identifiers of the messages that were removed.
    pub deleted: Vec<String>,
    /// Entries the backend rejected.
    pub failed: Vec<DeleteFailure>,
}

/// Trait for fetching a batch of messages from a queue.
#[async_trait::async_trait]
pub trait ReceiveMessages {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Fetch up to `options.max_messages` messages, waiting at most
    /// `options.wait_time` for any to become available.
    ///
    /// Fetched messages stay hidden for `options.visibility_timeout`; they
    /// reappear unless deleted before it elapses.
    async fn receive_messages(
        &self,
        options: ReceiveOptions,
    ) -> Result<Vec<RawMessage>, Self::Error>;
}

/// Trait for bulk-removing messages from a queue.
#[async_trait::async_trait]
pub trait DeleteMessages {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Remove the given entries in one request.
    ///
    /// Entries the backend rejects are reported in the returned
    /// [`DeleteReport`], not as an `Err`; `Err` is reserved for the request
    /// itself failing.
    async fn delete_messages(
        &self,
        entries: Vec<DeleteEntry>,
    ) -> Result<DeleteReport, Self::Error>;
}
