use std::time::Duration;

use mailstop::publish::layers::JsonLayer;
use mailstop::publish::sqs::SqsSender;
use mailstop::source::sqs::SqsSource;
use mailstop::{Consumer, HandlerError, Labels, Outbound, Payload, Publisher, RawMessage, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Template {
    message: String,
}

async fn handle_template(message: RawMessage, payload: Payload) -> Result<(), HandlerError> {
    let value = payload.as_json().ok_or("expected a JSON payload")?;
    let template: Template = serde_json::from_value(value.clone())?;
    tracing::info!(id = %message.id, message = %template.message, "handled template message");
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    let queue_url = std::env::var("SQS_QUEUE_URL").expect("SQS_QUEUE_URL must be set");

    let cancel = CancellationToken::new();
    let cancel_signal = cancel.clone();
    let cancel_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        cancel_signal.cancel();
    });

    let sender = SqsSender::from_env(queue_url.clone()).await;
    let cancel_publisher = cancel.clone();
    let publisher_handle = tokio::spawn(async move {
        let mut publisher = Publisher::new(sender).layer(JsonLayer);

        let mut id = 0;
        loop {
            let template = Template {
                message: format!("Hello #{id}"),
            };
            publisher
                .send(Outbound {
                    labels: Labels::json("template"),
                    body: template,
                })
                .await
                .expect("Failed to publish message");
            id += 1;
            tokio::time::sleep(Duration::from_millis(200)).await;
            if cancel_publisher.is_cancelled() {
                break;
            }
        }
    });

    let source = SqsSource::from_env(queue_url).await;
    let router = Router::new().route("template", handle_template);
    let consumer_handle = tokio::spawn(async move {
        Consumer::new(source, router).run(cancel).await;
    });

    tokio::try_join!(cancel_handle, publisher_handle, consumer_handle).unwrap();
}
