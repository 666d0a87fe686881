use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::operation::delete_message_batch::DeleteMessageBatchError;
use aws_sdk_sqs::operation::receive_message::ReceiveMessageError;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;

use crate::message::{AttributeValue, RawMessage};
use crate::source::{DeleteEntry, DeleteFailure, DeleteMessages, DeleteReport, ReceiveMessages, ReceiveOptions};

/// The transport allows at most ten messages per receive or batch delete.
const MAX_BATCH: usize = 10;

/// Amazon SQS queue source.
///
/// ## Design
///
/// The source stores the loaded AWS configuration and constructs a client
/// per operation rather than holding one open across the consumer's
/// lifetime, so a cancelled consumer never strands a connection. Receive
/// requests ask for all message attributes; batch deletes are chunked at the
/// transport's ten-entry maximum and per-entry rejections surface in the
/// [`DeleteReport`] rather than as errors.
#[derive(Debug, Clone)]
pub struct SqsSource {
    config: aws_config::SdkConfig,
    queue_url: String,
}

impl SqsSource {
    /// Create a source from an already-loaded AWS configuration.
    pub fn new(config: aws_config::SdkConfig, queue_url: impl Into<String>) -> Self {
        Self {
            config,
            queue_url: queue_url.into(),
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

    fn client(&self) -> Client {
        Client::new(&self.config)
    }
}

#[async_trait::async_trait]
impl ReceiveMessages for SqsSource {
    type Error = Error;

    #[tracing::instrument(skip_all)]
    async fn receive_messages(
        &self,
        options: ReceiveOptions,
    ) -> Result<Vec<RawMessage>, Error> {
        let output = self
            .client()
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(options.max_messages.min(MAX_BATCH) as i32)
            .wait_time_seconds(options.wait_time.as_secs() as i32)
            .visibility_timeout(options.visibility_timeout.as_secs() as i32)
            .message_attribute_names("All")
            .send()
            .await?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(raw_message)
            .collect())
    }
}

#[async_trait::async_trait]
impl DeleteMessages for SqsSource {
    type Error = Error;

    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    async fn delete_messages(&self, entries: Vec<DeleteEntry>) -> Result<DeleteReport, Error> {
        let mut report = DeleteReport::default();

        for chunk in entries.chunks(MAX_BATCH) {
            let batch: Vec<DeleteMessageBatchRequestEntry> = chunk
                .iter()
                .map(|entry| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(&entry.id)
                        .receipt_handle(&entry.receipt_handle)
                        .build()
                })
                .collect::<Result<_, _>>()?;

            let output = self
                .client()
                .delete_message_batch()
                .queue_url(&self.queue_url)
                .set_entries(Some(batch))
                .send()
                .await?;

            report
                .deleted
                .extend(output.successful().iter().map(|entry| entry.id().to_owned()));
            report.failed.extend(output.failed().iter().map(|entry| DeleteFailure {
                id: entry.id().to_owned(),
                code: Some(entry.code().to_owned()),
                reason: entry.message().map(str::to_owned),
            }));
        }

        Ok(report)
    }
}

/// Convert a transport message into the pipeline's raw message.
///
/// Messages missing an id or receipt handle cannot be acknowledged and are
/// skipped.
fn raw_message(message: aws_sdk_sqs::types::Message) -> Option<RawMessage> {
    let id = message.message_id?;
    let receipt_handle = message.receipt_handle?;

    let attributes = message
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(name, value)| {
            (
                name,
                AttributeValue {
                    data_type: value.data_type,
                    string_value: value.string_value,
                },
            )
        })
        .collect();

    Some(RawMessage {
        id,
        receipt_handle,
        body: message.body.unwrap_or_default(),
        attributes,
    })
}

/// Errors returned by the SQS source.
///
/// Wraps the underlying SDK error and captures a tracing span backtrace for
/// improved diagnostics.
#[derive(Debug)]
pub struct Error {
    context: tracing_error::SpanTrace,
    kind: SqsErrorKind,
}

/// Kinds of SQS source errors.
#[derive(Debug)]
pub enum SqsErrorKind {
    /// The receive call failed.
    Receive(SdkError<ReceiveMessageError>),
    /// The batch delete call failed.
    Delete(SdkError<DeleteMessageBatchError>),
    /// A delete entry could not be built.
    Entry(aws_sdk_sqs::error::BuildError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SqsErrorKind::Receive(err) => writeln!(f, "Receive error: {}", err),
            SqsErrorKind::Delete(err) => writeln!(f, "Delete error: {}", err),
            SqsErrorKind::Entry(err) => writeln!(f, "Delete entry error: {}", err),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SqsErrorKind::Receive(err) => Some(err),
            SqsErrorKind::Delete(err) => Some(err),
            SqsErrorKind::Entry(err) => Some(err),
        }
    }
}

impl From<SdkError<ReceiveMessageError>> for Error {
    fn from(err: SdkError<ReceiveMessageError>) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SqsErrorKind::Receive(err),
        }
    }
}

impl From<SdkError<DeleteMessageBatchError>> for Error {
    fn from(err: SdkError<DeleteMessageBatchError>) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SqsErrorKind::Delete(err),
        }
    }
}

impl From<aws_sdk_sqs::error::BuildError> for Error {
    fn from(err: aws_sdk_sqs::error::BuildError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SqsErrorKind::Entry(err),
        }
    }
}
