//! Payload decoding for classified envelopes.
//!
//! A payload declared as `application/json` is parsed into a structured
//! value; every other content type passes through as an opaque string.
//! Decoding is pure: the same input always produces the same result.

use tracing_error::SpanTrace;

/// Content type that triggers structured decoding.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Decoded message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Structured payload decoded from a JSON body.
    Json(serde_json::Value),
    /// Opaque payload passed through unchanged.
    Text(String),
}

impl Payload {
    /// Decode a payload according to its declared content type.
    ///
    /// Only a non-empty payload declared as [`JSON_CONTENT_TYPE`] is parsed;
    /// a parse failure is reported as a [`DecodeError`], never a panic.
    pub fn decode(payload: &str, content_type: Option<&str>) -> Result<Payload, DecodeError> {
        match content_type {
            Some(content_type) if content_type == JSON_CONTENT_TYPE && !payload.is_empty() => {
                serde_json::from_str(payload)
                    .map(Payload::Json)
                    .map_err(DecodeError::new)
            }
            _ => Ok(Payload::Text(payload.to_owned())),
        }
    }

    /// The structured value, when the payload was decoded from JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    /// The opaque text, when the payload passed through undecoded.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }
}

/// Error returned when a structured payload fails to parse.
///
/// Captures a tracing span backtrace for improved diagnostics.
#[derive(Debug)]
pub struct DecodeError {
    context: SpanTrace,
    source: serde_json::Error,
}

impl DecodeError {
    fn new(source: serde_json::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            source,
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Malformed payload: {}", self.source)?;
        self.context.fmt(f)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_content_type_decodes_structured_value() {
        let payload = Payload::decode("{\"user\": 7}", Some(JSON_CONTENT_TYPE)).unwrap();
        assert_eq!(payload.as_json().unwrap()["user"], 7);
    }

    #[test]
    fn invalid_json_is_a_decode_error_not_a_panic() {
        let error = Payload::decode("{not json", Some(JSON_CONTENT_TYPE)).unwrap_err();
        assert!(error.to_string().contains("Malformed payload"));
    }

    #[test]
    fn other_content_types_pass_through() {
        let payload = Payload::decode("{not json", Some("text/plain")).unwrap();
        assert_eq!(payload.as_text(), Some("{not json"));
    }

    #[test]
    fn missing_content_type_passes_through() {
        let payload = Payload::decode("{\"user\": 7}", None).unwrap();
        assert_eq!(payload.as_text(), Some("{\"user\": 7}"));
    }

    #[test]
    fn empty_json_payload_passes_through() {
        let payload = Payload::decode("", Some(JSON_CONTENT_TYPE)).unwrap();
        assert_eq!(payload.as_text(), Some(""));
    }

    #[test]
    fn decoding_is_idempotent() {
        let first = Payload::decode("{\"a\": [1, 2]}", Some(JSON_CONTENT_TYPE)).unwrap();
        let second = Payload::decode("{\"a\": [1, 2]}", Some(JSON_CONTENT_TYPE)).unwrap();
        assert_eq!(first, second);
    }
}
