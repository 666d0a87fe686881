use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns::Client;
use aws_sdk_sns::error::SdkError;
use aws_sdk_sns::operation::publish::PublishError as SnsPublishError;
use aws_sdk_sns::types::MessageAttributeValue;

use crate::publish::{CONTENT_TYPE_ATTRIBUTE, MESSAGE_TYPE_ATTRIBUTE, Outbound, Sender};

/// Amazon SNS sender.
///
/// Publishes labelled messages to a notification-bus topic; subscribed
/// queues receive them bus-wrapped, which the inbound classifier unwraps.
/// The labels are stamped as string message attributes under the same keys
/// the classifier reads from the nested attribute map.
#[derive(Debug, Clone)]
pub struct SnsSender {
    config: aws_config::SdkConfig,
    topic_arn: String,
    subject: Option<String>,
}

impl SnsSender {
    /// Create a sender from an already-loaded AWS configuration.
    pub fn new(config: aws_config::SdkConfig, topic_arn: impl Into<String>) -> Self {
        Self {
            config,
            topic_arn: topic_arn.into(),
            subject: None,
        }
    }

    /// Load AWS configuration from the environment.
    ///
    /// When the environment supplies no region, it is derived from the topic
    /// ARN (`arn:aws:sns:region:account:topic`).
    pub async fn from_env(topic_arn: impl Into<String>) -> Self {
        let topic_arn = topic_arn.into();
        let mut config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        if config.region().is_none() {
            if let Some(region) = region_from_arn(&topic_arn) {
                config = config.to_builder().region(Region::new(region)).build();
            }
        }

        Self::new(config, topic_arn)
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

    /// Attach a subject to every published message (useful for email
    /// subscriptions).
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn client(&self) -> Client {
        Client::new(&self.config)
    }
}

#[async_trait::async_trait]
impl<M> Sender<M> for SnsSender
where
    M: Into<String> + Send + 'static,
{
    type Error = Error;

    /// Publish a message to the topic.
    #[tracing::instrument(skip_all)]
    async fn send(&mut self, message: Outbound<M>) -> Result<(), Error> {
        let response = self
            .client()
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message.body.into())
            .set_subject(self.subject.clone())
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
            "Message published to topic",
        );
        Ok(())
    }
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, aws_sdk_sns::error::BuildError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
}

/// Extract the region segment from a topic ARN.
fn region_from_arn(arn: &str) -> Option<String> {
    let region = arn.split(':').nth(3)?;
    (!region.is_empty()).then(|| region.to_owned())
}

/// Errors returned by the SNS sender.
#[derive(Debug)]
pub struct Error {
    context: tracing_error::SpanTrace,
    kind: SnsSenderErrorKind,
}

/// Kinds of SNS sender errors.
#[derive(Debug)]
pub enum SnsSenderErrorKind {
    /// The publish call failed.
    Publish(SdkError<SnsPublishError>),
    /// A message attribute could not be built.
    Attribute(aws_sdk_sns::error::BuildError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SnsSenderErrorKind::Publish(err) => writeln!(f, "Publish error: {}", err),
            SnsSenderErrorKind::Attribute(err) => writeln!(f, "Attribute error: {}", err),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SnsSenderErrorKind::Publish(err) => Some(err),
            SnsSenderErrorKind::Attribute(err) => Some(err),
        }
    }
}

impl From<SdkError<SnsPublishError>> for Error {
    fn from(err: SdkError<SnsPublishError>) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SnsSenderErrorKind::Publish(err),
        }
    }
}

impl From<aws_sdk_sns::error::BuildError> for Error {
    fn from(err: aws_sdk_sns::error::BuildError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: SnsSenderErrorKind::Attribute(err),
        }
    }
}
