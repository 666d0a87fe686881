use std::sync::Arc;

use tokio::sync::Mutex;

use crate::publish::{Outbound, Sender};

/// In-memory sender for testing or local pipelines.
///
/// This sender stores messages in a shared queue instead of delivering them
/// anywhere. It is useful for:
/// - Unit and integration testing
/// - Simulating message delivery without a real transport
/// - Debugging message flows
///
/// ## Type Parameters
///
/// - `M`: type of the message body
pub struct InMemorySender<M> {
    /// Shared queue of sent messages.
    sent: Arc<Mutex<Vec<Outbound<M>>>>,
}

impl<M> InMemorySender<M> {
    /// Return all messages that have been "sent" and clear the internal
    /// queue.
    ///
    /// This consumes the internal queue and is primarily intended for
    /// testing purposes.
    pub async fn sent_messages(self) -> Vec<Outbound<M>> {
        let mut sent = self.sent.lock_owned().await;
        std::mem::take(&mut *sent)
    }
}

impl<M> Clone for InMemorySender<M> {
    fn clone(&self) -> Self {
        Self {
            sent: Arc::clone(&self.sent),
        }
    }
}

impl<M> Default for InMemorySender<M> {
    /// Create a new empty in-memory sender.
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl<M> Sender<M> for InMemorySender<M>
where
    M: Clone + std::fmt::Debug + Send,
{
    type Error = std::convert::Infallible;

    /// "Send" a message by appending it to the in-memory queue.
    #[tracing::instrument(skip_all)]
    async fn send(&mut self, message: Outbound<M>) -> Result<(), Self::Error> {
        let mut sent = self.sent.lock().await;
        tracing::info!(
            message_type = %message.labels.message_type,
            content_type = %message.labels.content_type,
            body = ?message.body,
            "Message sent to in-memory queue",
        );
        sent.push(message);
        Ok(())
    }
}
