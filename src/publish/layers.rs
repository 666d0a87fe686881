//! Tower layers for outbound message pipelines.

mod json;

pub use json::{JsonLayer, JsonService};
