use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::traits::{require_record_id, HealthStatus, StorageProvider};

/// Hosted document database reached over a JSON REST interface.
///
/// `GET {base}/{collection}` lists, `POST` inserts, and
/// `PUT`/`DELETE {base}/{collection}/{id}` replace and remove.
#[derive(Debug, Clone)]
pub struct DocumentStorage {
    client: Client,
    collection_url: String,
    api_key: Option<String>,
}

impl DocumentStorage {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>) -> Result<Self> {
        url::Url::parse(base_url).map_err(|_| Error::InvalidUrl(base_url.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(format!("nairobi-tea/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Persistence(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            collection_url: format!("{}/{}", base_url.trim_end_matches('/'), collection),
            api_key,
        })
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("{} request failed: {}", what, e)))
    }

    fn check_status(response: &Response, what: &str) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Error::Persistence(format!(
            "{} failed with HTTP {}: {}",
            what,
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("Unknown error")
        )))
    }
}

/// Accepts a bare array or a `{ "documents": [...] }` envelope.
fn unwrap_documents(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("documents") {
            Some(Value::Array(records)) => Ok(records),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(Error::Persistence("documents is not an array".to_string())),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err(Error::Persistence("unexpected list response shape".to_string())),
    }
}

fn created_at(record: &Value) -> &str {
    record.get("createdAt").and_then(Value::as_str).unwrap_or("")
}

#[async_trait]
impl StorageProvider for DocumentStorage {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn list(&self) -> Result<Vec<Value>> {
        debug!("Listing documents from {}", self.collection_url);
        let response = self.send(self.client.get(&self.collection_url), "List").await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Self::check_status(&response, "List")?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Persistence(format!("Invalid list response: {}", e)))?;

        let mut records = unwrap_documents(body)?;
        // RFC 3339 UTC timestamps sort lexicographically
        records.sort_by(|a, b| created_at(b).cmp(created_at(a)));
        Ok(records)
    }

    async fn insert(&self, record: Value) -> Result<()> {
        let id = require_record_id(&record)?.to_string();
        debug!("Inserting document {}", id);
        let response = self
            .send(self.client.post(&self.collection_url).json(&record), "Insert")
            .await?;
        Self::check_status(&response, "Insert")
    }

    async fn replace(&self, id: &str, record: Value) -> Result<()> {
        debug!("Replacing document {}", id);
        let response = self
            .send(self.client.put(self.document_url(id)).json(&record), "Replace")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("article {}", id)));
        }
        Self::check_status(&response, "Replace")
    }

    async fn remove(&self, id: &str) -> Result<()> {
        debug!("Removing document {}", id);
        let response = self
            .send(self.client.delete(self.document_url(id)), "Remove")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(&response, "Remove")
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.authorize(self.client.get(&self.collection_url)).send().await {
            Ok(r) if r.status().is_success() || r.status() == StatusCode::NOT_FOUND => {
                Ok(HealthStatus::Healthy)
            }
            Ok(r) => Ok(HealthStatus::Warning(format!("HTTP {}", r.status().as_u16()))),
            Err(e) => Ok(HealthStatus::Unavailable(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_unwrap_documents_shapes() {
        assert_eq!(unwrap_documents(json!([{ "id": "1" }])).unwrap().len(), 1);
        assert_eq!(unwrap_documents(json!({ "documents": [{ "id": "1" }] })).unwrap().len(), 1);
        assert!(unwrap_documents(json!({})).unwrap().is_empty());
        assert!(unwrap_documents(json!("nope")).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            DocumentStorage::new("not a url", "news", None),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_list_sorts_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "old", "createdAt": "2024-01-01T00:00:00Z" },
                { "id": "new", "createdAt": "2024-06-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let storage = DocumentStorage::new(&server.uri(), "news", Some("secret".into())).unwrap();
        let records = storage.list().await.unwrap();
        assert_eq!(records[0]["id"], "new");
        assert_eq!(records[1]["id"], "old");
    }

    #[tokio::test]
    async fn test_write_failures_map_to_persistence_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/news/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/news/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = DocumentStorage::new(&server.uri(), "news", None).unwrap();
        assert!(matches!(
            storage.insert(json!({ "id": "x" })).await,
            Err(Error::Persistence(_))
        ));
        storage.remove("gone").await.unwrap();
        assert!(matches!(
            storage.replace("gone", json!({ "id": "gone" })).await,
            Err(Error::NotFound(_))
        ));
    }
}
