//! Webhook payload decoding.
//!
//! Inbound relays POST either form-urlencoded or JSON. Decoding is the one
//! place a request can be hard-rejected (HTTP 400): everything after this
//! point is total. The decoded result is a flat field map; JSON scalars are
//! stringified, JSON null dropped and nested JSON kept as compact text so
//! the normalizer only ever deals in strings.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::IngestError;

/// Decoded vendor payload: field name → string value.
#[derive(Debug, Clone, Default)]
pub struct WebhookPayload {
    fields: BTreeMap<String, String>,
}

impl WebhookPayload {
    /// Decode a raw request body according to its Content-Type.
    ///
    /// JSON and form-urlencoded are dispatched by header; with no usable
    /// header the body is sniffed (leading `{` means JSON) since some
    /// vendors omit or mangle the header on retries.
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self, IngestError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| IngestError::MalformedBody("request body is not valid UTF-8".into()))?;

        let content_type = content_type.unwrap_or("").to_ascii_lowercase();
        if content_type.contains("json") {
            Self::decode_json(text)
        } else if content_type.contains("x-www-form-urlencoded") {
            Self::decode_form(text)
        } else if text.trim_start().starts_with('{') {
            Self::decode_json(text)
        } else {
            Self::decode_form(text)
        }
    }

    fn decode_form(text: &str) -> Result<Self, IngestError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text)
            .map_err(|e| IngestError::MalformedBody(format!("invalid form body: {e}")))?;

        let mut fields = BTreeMap::new();
        for (key, value) in pairs {
            fields.insert(key, value);
        }
        Ok(Self { fields })
    }

    fn decode_json(text: &str) -> Result<Self, IngestError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| IngestError::MalformedBody(format!("invalid JSON body: {e}")))?;

        let Value::Object(object) = value else {
            return Err(IngestError::MalformedBody(
                "JSON body must be an object".into(),
            ));
        };

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
            };
            fields.insert(key, text);
        }
        Ok(Self { fields })
    }

    /// The decoded field map.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}
