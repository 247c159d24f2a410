//! Firestore REST client
//!
//! Documents travel as typed values (`stringValue`, `arrayValue`, ...); the
//! rest of the crate works with plain JSON fields and converts at this edge.

use super::{DocumentStore, Fields};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Number, Value};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Firestore REST client
pub struct FirestoreClient {
    client: reqwest::Client,
    base_url: String,
    /// `projects/{project}/databases/{database}`
    database: String,
    access_token: Option<String>,
}

impl FirestoreClient {
    /// Create a new Firestore client
    pub fn new(
        base_url: &str,
        project_id: &str,
        database_id: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            database: format!("projects/{}/databases/{}", project_id, database_id),
            access_token,
        })
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}/documents/{}", self.base_url, self.database, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn failure(response: reqwest::Response) -> AppError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(status, "Firestore request failed");
        AppError::upstream("firestore", Some(status), &body)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get(&self, path: &str) -> Result<Option<Fields>> {
        let response = self
            .authorize(self.client.get(self.document_url(path)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let body: Value = response.json().await?;
        Ok(Some(decode_fields(body.get("fields"))))
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        let mut query: Vec<(&str, &str)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.as_str()))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let response = self
            .authorize(self.client.patch(self.document_url(path)))
            .query(&query)
            .json(&json!({ "fields": encode_fields(&fields) }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::DocumentVanished {
                path: path.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        debug!(path, fields = fields.len(), "Document updated");
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        fields: Fields,
        server_timestamps: &[&str],
    ) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let name = format!("{}/documents/{}/{}", self.database, collection, id);
        let transforms: Vec<Value> = server_timestamps
            .iter()
            .map(|field| json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" }))
            .collect();

        let body = json!({
            "writes": [{
                "update": { "name": name, "fields": encode_fields(&fields) },
                "currentDocument": { "exists": false },
                "updateTransforms": transforms,
            }]
        });

        let url = format!("{}/{}/documents:commit", self.base_url, self.database);
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        debug!(collection, id = %id, "Document created");
        Ok(id)
    }
}

/// Encode plain JSON fields as Firestore typed values
pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decode Firestore typed `fields` into plain JSON
pub fn decode_fields(fields: Option<&Value>) -> Fields {
    fields
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|i| Value::Number(i.into()))
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trigger_fields() {
        let raw = json!({
            "name": { "stringValue": "トマト" },
            "steps": { "arrayValue": { "values": [
                { "stringValue": "切る" },
                { "stringValue": "" }
            ]}},
            "servings": { "integerValue": "2" },
            "tags": { "arrayValue": {} },
            "meta": { "mapValue": { "fields": { "ok": { "booleanValue": true } } } }
        });

        let fields = decode_fields(Some(&raw));
        assert_eq!(fields["name"], "トマト");
        assert_eq!(fields["steps"], json!(["切る", ""]));
        assert_eq!(fields["servings"], 2);
        assert_eq!(fields["tags"], json!([]));
        assert_eq!(fields["meta"], json!({"ok": true}));
    }

    #[test]
    fn test_encode_update_payload() {
        let fields = json!({"kana": "とまと", "synonyms": ["トマト"], "count": 3})
            .as_object()
            .cloned()
            .unwrap();
        let encoded = encode_fields(&fields);
        assert_eq!(encoded["kana"], json!({"stringValue": "とまと"}));
        assert_eq!(
            encoded["synonyms"],
            json!({"arrayValue": {"values": [{"stringValue": "トマト"}]}})
        );
        assert_eq!(encoded["count"], json!({"integerValue": "3"}));
    }

    #[test]
    fn test_decode_missing_fields() {
        assert!(decode_fields(None).is_empty());
    }
}
