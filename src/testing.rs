//! In-crate fakes for the external collaborators.

use crate::error::{EngineError, Result};
use crate::probe::VersionProbe;
use crate::resources::{Endpoint, Property, Resource, ResourceTree, Service, ServiceDirectory};
use crate::search::{DocumentStore, SearchRequest};
use crate::widgets::{Engine, WidgetContext};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Reply {
    Ok(Value),
    Err(String),
}

struct Stub {
    index: String,
    agg: Option<String>,
    reply: Reply,
}

/// Document store scripted by index and, optionally, by the name of a
/// top-level aggregation in the request. Unmatched searches answer `{}`.
#[derive(Default)]
pub struct FakeStore {
    stubs: Vec<Stub>,
    counts: HashMap<String, u64>,
    requests: Mutex<Vec<(String, Value)>>,
    slow: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(mut self, index: &str, agg: Option<&str>, response: Value) -> Self {
        self.stubs.push(Stub {
            index: index.to_string(),
            agg: agg.map(str::to_string),
            reply: Reply::Ok(response),
        });
        self
    }

    pub fn on_search_error(mut self, index: &str, reason: &str) -> Self {
        self.stubs.push(Stub {
            index: index.to_string(),
            agg: None,
            reply: Reply::Err(reason.to_string()),
        });
        self
    }

    pub fn on_count(mut self, index: &str, count: u64) -> Self {
        self.counts.insert(index.to_string(), count);
        self
    }

    /// Never answer.
    pub fn slow(mut self) -> Self {
        self.slow = true;
        self
    }

    /// Every `(index, body)` received, in order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    fn find(&self, index: &str, body: &Value) -> Option<&Reply> {
        self.stubs
            .iter()
            .find(|s| {
                s.index == index
                    && s.agg
                        .as_deref()
                        .map_or(true, |agg| body.get("aggs").and_then(|a| a.get(agg)).is_some())
            })
            .map(|s| &s.reply)
    }

    async fn record(&self, index: &str, body: &Value) {
        self.requests
            .lock()
            .unwrap()
            .push((index.to_string(), body.clone()));
        if self.slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        self.record(index, body).await;
        match self.find(index, body) {
            Some(Reply::Ok(v)) => Ok(v.clone()),
            Some(Reply::Err(e)) => Err(EngineError::Transport(e.clone())),
            None => Ok(json!({})),
        }
    }

    async fn count(&self, index: &str, body: &Value) -> Result<Value> {
        self.record(index, body).await;
        Ok(json!({ "count": self.counts.get(index).copied().unwrap_or(0) }))
    }

    async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for request in requests {
            self.record(&request.index, &request.body).await;
            out.push(match self.find(&request.index, &request.body) {
                Some(Reply::Ok(v)) => v.clone(),
                Some(Reply::Err(e)) => json!({ "error": { "reason": e } }),
                None => json!({}),
            });
        }
        Ok(out)
    }
}

pub struct FakeDirectory {
    services: Vec<Service>,
    endpoints: Vec<Endpoint>,
}

impl FakeDirectory {
    pub fn new(services: Vec<Service>, endpoints: Vec<Endpoint>) -> Self {
        Self { services, endpoints }
    }
}

#[async_trait]
impl ServiceDirectory for FakeDirectory {
    async fn list_services(&self, _sub_org_id: &str) -> Result<Vec<Service>> {
        Ok(self.services.clone())
    }

    async fn list_endpoints(
        &self,
        _sub_org_id: &str,
        contribution_ids: &[String],
        _parents_only: bool,
    ) -> Result<Vec<Endpoint>> {
        Ok(self
            .endpoints
            .iter()
            .filter(|e| contribution_ids.is_empty() || contribution_ids.contains(&e.contribution_id))
            .cloned()
            .collect())
    }
}

/// Serves one canned release index and remembers the URLs asked for.
pub struct FakeVersionProbe {
    body: Option<String>,
    slow: bool,
    urls: Mutex<Vec<String>>,
}

impl FakeVersionProbe {
    pub fn new(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            slow: false,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            body: None,
            slow: false,
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Never answer.
    pub fn slow() -> Self {
        Self {
            body: None,
            slow: true,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionProbe for FakeVersionProbe {
    async fn fetch_index(&self, url: &str) -> Result<String> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.slow {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.body
            .clone()
            .ok_or_else(|| EngineError::Transport("connection refused".to_string()))
    }
}

fn resource(id: &str, parent: &str, name: &str, kind: &str, disabled: bool) -> Resource {
    Resource {
        id: id.to_string(),
        parent_id: Some(parent.to_string()),
        name: name.to_string(),
        resource_type: kind.to_string(),
        is_disabled: disabled,
        ..Default::default()
    }
}

/// org1 -> comp1 (main: auto1, feature: auto2), comp2 (main: auto3, auto4 disabled).
pub fn sample_tree() -> ResourceTree {
    ResourceTree::from_resources(vec![
        Resource {
            id: "org1".to_string(),
            name: "Org".to_string(),
            resource_type: "ORG".to_string(),
            ..Default::default()
        },
        resource("comp1", "org1", "payments-api", "COMPONENT", false),
        resource("comp2", "org1", "web-ui", "COMPONENT", false),
        resource("branch1", "comp1", "main", "BRANCH", false),
        resource("branch2", "comp1", "feature", "BRANCH", false),
        resource("branch3", "comp2", "main", "BRANCH", false),
        resource("auto1", "branch1", "build", "AUTOMATION", false),
        resource("auto2", "branch2", "build", "AUTOMATION", false),
        resource("auto3", "branch3", "deploy", "AUTOMATION", false),
        resource("auto4", "branch3", "legacy", "AUTOMATION", true),
    ])
}

pub fn sample_services() -> Vec<Service> {
    vec![
        Service {
            id: "comp1".to_string(),
            name: "payments-api".to_string(),
            repository_url: "https://git.example.com/payments-api".to_string(),
        },
        Service {
            id: "comp2".to_string(),
            name: "web-ui".to_string(),
            repository_url: "https://git.example.com/web-ui".to_string(),
        },
    ]
}

fn cbci(id: &str, cjoc: &str, url: &str, status: Option<&str>) -> Endpoint {
    let mut properties = vec![
        Property {
            name: "cjocId".to_string(),
            value: cjoc.to_string(),
            audit: None,
        },
        Property {
            name: "tool_url".to_string(),
            value: url.to_string(),
            audit: None,
        },
    ];
    if let Some(status) = status {
        properties.push(Property {
            name: "status".to_string(),
            value: status.to_string(),
            audit: None,
        });
    }
    Endpoint {
        id: id.to_string(),
        name: format!("{}-name", id),
        contribution_id: crate::resources::CBCI_CONTRIBUTION_ID.to_string(),
        resource_id: "org1".to_string(),
        properties,
    }
}

/// Three controllers under cjoc1 (two seen in telemetry) and one elsewhere.
pub fn cjoc_endpoints() -> Vec<Endpoint> {
    vec![
        cbci("ctrl1", "cjoc1", "https://c1.example.com", Some("INSTALLED")),
        cbci("ctrl2", "cjoc1", "https://c2.example.com/", None),
        cbci("ctrl3", "cjoc1", "https://c3.example.com", Some("INSTALLED")),
        cbci("ctrl4", "cjoc2", "https://c4.example.com", Some("INSTALLED")),
    ]
}

/// 2024-02-01T00:00:00Z
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
}

pub fn engine(store: Arc<FakeStore>) -> Engine {
    Engine::new(
        store,
        Arc::new(FakeDirectory::new(sample_services(), cjoc_endpoints())),
        Arc::new(sample_tree()),
        Arc::new(FakeVersionProbe::new(r#"<a href="2.452.2/">2.452.2</a>"#)),
    )
}

/// A request context over the sample fixtures, pinned to [`fixed_now`].
pub fn context(store: FakeStore) -> WidgetContext {
    recording_context(store).0
}

/// Like [`context`], keeping a handle on the store to inspect requests.
pub fn recording_context(store: FakeStore) -> (WidgetContext, Arc<FakeStore>) {
    let store = Arc::new(store);
    let mut ctx = engine(store.clone()).context(CancellationToken::new());
    ctx.now = fixed_now();
    (ctx, store)
}
