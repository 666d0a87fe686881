use std::{future::Future, pin::Pin};

use tower::{Layer, Service};

use crate::payload::JSON_CONTENT_TYPE;
use crate::publish::{Labels, Outbound};

/// Tower `Service` wrapper that serializes message bodies to JSON.
///
/// This service converts any body type `M` that implements
/// `serde::Serialize` into a JSON string before passing it to the inner
/// service, and rewrites the content-type label to `application/json` so the
/// label can never disagree with the encoding.
#[derive(Clone)]
pub struct JsonService<T> {
    inner: T,
}

impl<T, M> Service<Outbound<M>> for JsonService<T>
where
    M: serde::Serialize + Send + 'static,
    T: Service<Outbound<String>> + Clone + Send + 'static,
    <T as Service<Outbound<String>>>::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    type Response = T::Response;
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Outbound<M>) -> Self::Future {
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let body = serde_json::to_string(&req.body).map_err(Box::new)?;
            let message = Outbound {
                labels: Labels::new(req.labels.message_type, JSON_CONTENT_TYPE),
                body,
            };

            inner.call(message).await.map_err(Into::into)
        })
    }
}

/// Tower `Layer` that applies `JsonService` to a service stack.
///
/// Wraps an existing service so that all outgoing bodies are serialized to
/// JSON and labelled accordingly.
pub struct JsonLayer;

impl<S> Layer<S> for JsonLayer {
    type Service = JsonService<S>;

    fn layer(&self, service: S) -> Self::Service {
        JsonService { inner: service }
    }
}
