//! HTTP document store client.

use super::{DocumentStore, SearchRequest};
use crate::error::{EngineError, Result};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Document store reached over the search engine's REST API.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, username: Option<String>, password: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = if base_url.starts_with("http://") || base_url.starts_with("https://") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            credentials: username.map(|u| (u, password)),
        })
    }

    async fn post(&self, path: &str, content_type: &str, body: String) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, pass.as_ref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Transport(format!("{} timed out", url))
            } else {
                EngineError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(EngineError::Transport(format!("{} returned {}: {}", url, status, text)));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Render a multi-search request as newline-delimited JSON.
pub fn msearch_body(requests: &[SearchRequest]) -> String {
    let mut body = String::new();
    for request in requests {
        body.push_str(&json!({ "index": request.index }).to_string());
        body.push('\n');
        body.push_str(&request.body.to_string());
        body.push('\n');
    }
    body
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        self.post(&format!("{}/_search", index), "application/json", body.to_string())
            .await
    }

    async fn count(&self, index: &str, body: &Value) -> Result<Value> {
        self.post(&format!("{}/_count", index), "application/json", body.to_string())
            .await
    }

    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<Value>> {
        let response = self
            .post("_msearch", "application/x-ndjson", msearch_body(requests))
            .await?;
        match response.get("responses") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(EngineError::BadAggregationShape("responses".to_string())),
        }
    }
}
