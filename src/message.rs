use std::collections::HashMap;

/// Typed attribute attached to a queue message.
///
/// Queue transports carry attributes as `(data type, value)` pairs; only
/// string values are meaningful to the routing pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    /// Transport-level data type, e.g. `"String"`.
    pub data_type: String,
    /// String form of the attribute, when present.
    pub string_value: Option<String>,
}

impl AttributeValue {
    /// Create a string attribute.
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_owned(),
            string_value: Some(value.into()),
        }
    }
}

/// Raw message fetched from a queue.
///
/// A `RawMessage` is immutable once fetched and owned by the consumer for the
/// duration of one poll cycle; the `receipt_handle` is the opaque token the
/// transport requires to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Transport-assigned message identifier.
    pub id: String,
    /// Opaque token required to delete the message.
    pub receipt_handle: String,
    /// Message body, verbatim.
    pub body: String,
    /// Message attributes by name.
    pub attributes: HashMap<String, AttributeValue>,
}

impl RawMessage {
    /// Create a message with no attributes.
    pub fn new(
        id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Attach an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Look up the string value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|attribute| attribute.string_value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_lookup_returns_string_value() {
        let message = RawMessage::new("m-1", "rcpt-1", "hello")
            .with_attribute("Message-Type", AttributeValue::string("template"));

        assert_eq!(message.attribute("Message-Type"), Some("template"));
        assert_eq!(message.attribute("Content-Type"), None);
    }

    #[test]
    fn attribute_without_string_value_is_none() {
        let message = RawMessage::new("m-1", "rcpt-1", "hello").with_attribute(
            "Message-Type",
            AttributeValue {
                data_type: "Binary".to_owned(),
                string_value: None,
            },
        );

        assert_eq!(message.attribute("Message-Type"), None);
    }
}
