//! Search transport over the document store.
//!
//! The store itself sits behind [`DocumentStore`]; [`SearchTransport`] adds
//! request-scoped cancellation and the labelled multi-search used by
//! producers that need several indices in one round trip.

mod http;
mod response;

pub use http::*;
pub use response::*;

use crate::error::{EngineError, Result};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One request of a multi-search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index: String,
    pub body: Value,
}

/// A read-only document store speaking the search engine's JSON protocol.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;
    async fn count(&self, index: &str, body: &Value) -> Result<Value>;
    /// Responses come back in request order. A failed item is an object
    /// carrying an `error` key.
    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<Value>>;
}

/// Race a future against the request's cancellation token.
pub async fn cancelable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Canceled),
        res = fut => res,
    }
}

/// Document-store access bound to one request.
#[derive(Clone)]
pub struct SearchTransport {
    store: Arc<dyn DocumentStore>,
    cancel: CancellationToken,
}

impl SearchTransport {
    pub fn new(store: Arc<dyn DocumentStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn search(&self, query: &Value, index: &str) -> Result<Value> {
        tracing::debug!("search on {}", index);
        cancelable(&self.cancel, self.store.search(index, query)).await
    }

    /// Count matching documents; the response is `{"count": N}`.
    pub async fn count(&self, query: &Value, index: &str) -> Result<Value> {
        tracing::debug!("count on {}", index);
        // The count API accepts only the query clause.
        let body = match query.get("query") {
            Some(q) => serde_json::json!({ "query": q }),
            None => query.clone(),
        };
        cancelable(&self.cancel, self.store.count(index, &body)).await
    }

    /// Run labelled queries in one round trip and return `{label: response}`
    /// in request order. Every label is present; failed items carry their
    /// embedded error.
    pub async fn multi_search(&self, queries: Vec<(&str, &str, Value)>) -> Result<Map<String, Value>> {
        let labels: Vec<String> = queries.iter().map(|(label, _, _)| label.to_string()).collect();
        let requests: Vec<SearchRequest> = queries
            .into_iter()
            .map(|(_, index, body)| SearchRequest {
                index: index.to_string(),
                body,
            })
            .collect();

        tracing::debug!("multi-search with {} requests", requests.len());
        let responses = cancelable(&self.cancel, self.store.multi_search(&requests)).await?;

        let mut out = Map::new();
        let mut responses = responses.into_iter();
        for label in labels {
            let response = responses.next().unwrap_or_else(|| {
                serde_json::json!({ "error": { "reason": "missing response" } })
            });
            if let Some(err) = response.get("error") {
                tracing::warn!("multi-search item {} failed: {}", label, err);
            }
            out.insert(label, response);
        }
        Ok(out)
    }
}
