use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::send_message::SendMessageError;
use aws_sdk_sqs::types::MessageAttributeValue;

use crate::publish::{CONTENT_TYPE_ATTRIBUTE, MESSAGE_TYPE_ATTRIBUTE, Outbound, Sender};

/// Amazon SQS sender.
///
/// Publishes labelled messages straight to a queue, stamping the labels as
/// string message attributes. The client is constructed per send from the
/// stored configuration.
#[derive(Debug, Clone)]
pub struct SqsSender {
    config: aws_config::SdkConfig,
    queue_url: String,
    delay: Option<Duration>,
}

impl SqsSender {
    /// Create a sender from an already-loaded AWS configuration.
    pub fn new(config: aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            config,
            queue_url: queue_url.into(),
            delay: None,
        }
    }

    /// Load AWS configuration (region, credentials) from the environment.
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(config, queue_url)
    }

    /// Override the service endpoint, for local development stacks.
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.config = self
            .config
            .to_builder()
            .endpoint_url(endpoint_url.into())
            .build();
        self
    }

    /// Delay delivery of every sent message.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn client(&self) -> Client {
        Client::new(&self.config)
    }
}

#[async_trait::async_trait]
impl<M> Sender<M> for SqsSender
where
    M: Into<String> + Send + 'static,
{
    type Error = Error;

    /// Send a message to the queue.
    ///
    /// Maps the [`Outbound`] fields as follows:
    /// - `labels.message_type` → `Message-Type` string attribute
    /// - `labels.content_type` → `Content-Type` string attribute
    /// - `body` → message body
    #[tracing::instrument(skip_all)]
    async fn send(&mut self, message: Outbound<M>) -> Result<(), Error> {
        let response = self
            .client()
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(message.body.into())
            .set_delay_seconds(self.delay.map(|delay| delay.as_secs() as i32))
            .message_attributes(
                MESSAGE_TYPE_ATTRIBUTE,
                string_attribute(&message.labels.message_type)?,
            )
            .message_attributes(
                CONTENT_TYPE_ATTRIBUTE,
                string_attribute(&message.labels.content_type)?,
            )
            .send()
            .await?;

        tracing::info!(
            message_id = response.message_id.as_deref().unwrap_or("unknown"),
            "Message sent to queue",
        );
        Ok(())
    }
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, aws_sdk_sqs::error::BuildError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
}

/// Errors returned by the SQS sender.
#[derive(Debug)]
pub struct Error {
    context: tracing_error::SpanTrace,
    kind: SqsSenderErrorKind,
}

/// Kinds of SQS sender errors.
#[derive(Debug)]
pub enum SqsSenderErrorKind {
    /// The send call failed.
    Send(SdkError<SendMessageError>),
    /// A message attribute could not be built.
    Attribute(aws_sdk_sqs::error::BuildError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SqsSenderErrorKind::Send(err) => writeln!(f, "Send error: {}", err),
            SqsSenderErrorKind::Attribute(err) => writeln!(f, "Attribute error: {}", err),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SqsSenderErrorKind::Send(err) => Some(err),
            SqsSenderErrorKind::Attribute(err) => Some(err),
        }
    }
}

impl From<SdkError<SendMessageError>> for Error {
    fn from(err: SdkError<SendMessageError>) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SqsSenderErrorKind::Send(err),
        }
    }
}

impl From<aws_sdk_sqs::error::BuildError> for Error {
    fn from(err: aws_sdk_sqs::error::BuildError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SqsSenderErrorKind::Attribute(err),
        }
    }
}
