//! Document-creation events
//!
//! Events arrive as CloudEvents over HTTP, in either content mode:
//! - structured: the body is the whole event, the payload under `data`
//! - binary: attributes in `ce-*` headers, the body is the payload
//!
//! The payload is JSON `{"value": {"name": ..., "fields": {...}}}` with
//! Firestore-typed field values. Protobuf payloads are not accepted.

use axum::http::{header::CONTENT_TYPE, HeaderMap};
use recipe_suggest_common::{
    errors::{AppError, Result},
    store::{decode_fields, DocumentRef, Fields},
};
use serde_json::Value;

/// A decoded document-creation event
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    pub id: String,
    pub event_type: String,
    /// Resource name of the created document, as sent
    pub document_name: Option<String>,
    /// Field values of the created document as plain JSON
    pub fields: Fields,
}

impl DocumentEvent {
    /// Decode an HTTP delivery
    pub fn decode(headers: &HeaderMap, body: &[u8]) -> Result<Self> {
        let content_type = header_str(headers, CONTENT_TYPE.as_str()).unwrap_or_default();
        if content_type.contains("protobuf") {
            return Err(invalid("protobuf event payloads are not supported"));
        }

        let body: Value = serde_json::from_slice(body)
            .map_err(|e| invalid(&format!("event body is not JSON: {}", e)))?;

        let (id, event_type, data) = match header_str(headers, "ce-id") {
            Some(id) => (
                id.to_string(),
                header_str(headers, "ce-type").unwrap_or_default().to_string(),
                body,
            ),
            None => {
                let id = body.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                let event_type = body
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let data = body
                    .get("data")
                    .cloned()
                    .ok_or_else(|| invalid("structured event has no data"))?;
                (id, event_type, data)
            }
        };

        // Some senders wrap the payload in a JSON string
        let data = match data {
            Value::String(raw) => serde_json::from_str(&raw)
                .map_err(|e| invalid(&format!("event data string is not JSON: {}", e)))?,
            other => other,
        };

        let value = data.get("value");
        Ok(Self {
            id,
            event_type,
            document_name: value
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            fields: decode_fields(value.and_then(|v| v.get("fields"))),
        })
    }

    /// The created document, if the name is a valid document path
    pub fn document(&self) -> Option<DocumentRef> {
        self.document_name.as_deref().and_then(DocumentRef::parse)
    }

    /// A string field, empty when absent or not a string
    pub fn string_field(&self, name: &str) -> String {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// A list field with every entry as a string; non-string entries become empty
    pub fn string_list_field(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn invalid(message: &str) -> AppError {
    AppError::Validation {
        message: message.to_string(),
        field: None,
    }
}
