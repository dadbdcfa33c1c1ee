//! Widget registry and dispatch.
//!
//! A widget key maps to exactly one producer. Producers are plain async
//! functions over the request parameters and a [`WidgetContext`]; the
//! registry stores them as function pointers returning boxed futures.

mod automation;
mod ci;
mod code_quality;
mod components;
mod pipeline;
mod scope;
mod shape;
mod tests_overview;

pub use ci::prepare_run_stream;
pub use pipeline::*;
pub use shape::*;

use crate::error::{EngineError, Result};
use crate::probe::VersionProbe;
use crate::query::ParamBag;
use crate::resources::{ResourceCache, ResourceResolver, Service, ServiceDirectory};
use crate::search::{DocumentStore, SearchTransport};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

pub const ALL_DEPLOYED_ENVIRONMENTS: &str = "all-deployed-environments";
pub const ALL_BUILT_COMPONENTS: &str = "all-built-components";
pub const BUILT_COMPONENTS_SUMMARY: &str = "built-components-summary";
pub const DEPLOYED_COMPONENTS_SUMMARY: &str = "deployed-components-summary";
pub const SCANNED_COMPONENTS_SUMMARY: &str = "scanned-components-summary";
pub const WORKFLOW_RUNS_BY_COMPONENT: &str = "workflow-runs-by-component";
pub const DEFAULT_BRANCH_COMMITS: &str = "default-branch-commits";
pub const CODE_QUALITY_COMPONENTS: &str = "code-quality-components";
pub const CODE_QUALITY_ISSUE_TYPES: &str = "code-quality-issue-types";
pub const TEST_SUITES_OVERVIEW: &str = "test-suites-overview";
pub const CI_PROJECT_TYPES: &str = "ci-project-types";
pub const CI_SYSTEM_INFORMATION: &str = "ci-system-information";
pub const CI_SYSTEM_HEALTH: &str = "ci-system-health";
pub const CI_COMPLETED_RUNS: &str = "ci-completed-runs";
pub const CI_PROJECT_ACTIVITY: &str = "ci-project-activity";
pub const CI_CJOC_CONTROLLERS: &str = "ci-cjoc-controllers";
pub const CI_RUNS_OVERVIEW: &str = "ci-runs-overview";
pub const CI_USAGE_PATTERNS: &str = "ci-usage-patterns";

/// Everything a producer may touch while serving one request.
pub struct WidgetContext {
    pub transport: SearchTransport,
    pub resolver: ResourceResolver,
    pub versions: Arc<dyn VersionProbe>,
    pub now: DateTime<Utc>,
}

impl WidgetContext {
    pub fn cancel_token(&self) -> &CancellationToken {
        self.transport.cancel_token()
    }
}

/// Long-lived handles to the external collaborators.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn ServiceDirectory>,
    cache: Arc<dyn ResourceCache>,
    versions: Arc<dyn VersionProbe>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn ServiceDirectory>,
        cache: Arc<dyn ResourceCache>,
        versions: Arc<dyn VersionProbe>,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
            versions,
        }
    }

    /// Build the context for one request bound to `cancel`.
    pub fn context(&self, cancel: CancellationToken) -> WidgetContext {
        let transport = SearchTransport::new(self.store.clone(), cancel);
        let resolver = ResourceResolver::new(self.directory.clone(), self.cache.clone(), transport.clone());
        WidgetContext {
            transport,
            resolver,
            versions: self.versions.clone(),
            now: Utc::now(),
        }
    }
}

pub type Producer = for<'a> fn(&'a ParamBag, &'a WidgetContext) -> BoxFuture<'a, Result<Value>>;

/// One page of a paginated producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub payload: Value,
    pub next_cursor: Option<usize>,
}

pub type PagedProducer = for<'a> fn(&'a ParamBag, usize, &'a WidgetContext) -> BoxFuture<'a, Result<Page>>;

macro_rules! producer {
    ($f:path) => {{
        fn run<'a>(params: &'a ParamBag, ctx: &'a WidgetContext) -> BoxFuture<'a, Result<Value>> {
            Box::pin($f(params, ctx))
        }
        run as Producer
    }};
}

macro_rules! paged_producer {
    ($f:path) => {{
        fn run<'a>(params: &'a ParamBag, cursor: usize, ctx: &'a WidgetContext) -> BoxFuture<'a, Result<Page>> {
            Box::pin($f(params, cursor, ctx))
        }
        run as PagedProducer
    }};
}

fn registry() -> &'static HashMap<&'static str, Producer> {
    static REGISTRY: OnceLock<HashMap<&'static str, Producer>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        HashMap::from([
            (ALL_DEPLOYED_ENVIRONMENTS, producer!(scope::all_deployed_environments)),
            (ALL_BUILT_COMPONENTS, producer!(scope::all_built_components)),
            (BUILT_COMPONENTS_SUMMARY, producer!(components::built_components_summary)),
            (DEPLOYED_COMPONENTS_SUMMARY, producer!(components::deployed_components_summary)),
            (SCANNED_COMPONENTS_SUMMARY, producer!(components::scanned_components_summary)),
            (WORKFLOW_RUNS_BY_COMPONENT, producer!(automation::workflow_runs_by_component)),
            (DEFAULT_BRANCH_COMMITS, producer!(automation::default_branch_commits)),
            (CODE_QUALITY_COMPONENTS, producer!(code_quality::code_quality_components)),
            (CODE_QUALITY_ISSUE_TYPES, producer!(code_quality::code_quality_issue_types)),
            (TEST_SUITES_OVERVIEW, producer!(tests_overview::test_suites_overview)),
            (CI_PROJECT_TYPES, producer!(ci::project_types)),
            (CI_SYSTEM_INFORMATION, producer!(ci::system_information)),
            (CI_SYSTEM_HEALTH, producer!(ci::system_health)),
            (CI_COMPLETED_RUNS, producer!(ci::completed_runs)),
            (CI_PROJECT_ACTIVITY, producer!(ci::project_activity)),
            (CI_CJOC_CONTROLLERS, producer!(ci::cjoc_controllers)),
            (CI_RUNS_OVERVIEW, producer!(ci::runs_overview)),
            (CI_USAGE_PATTERNS, producer!(ci::usage_patterns)),
        ])
    })
}

fn paged_registry() -> &'static HashMap<&'static str, PagedProducer> {
    static REGISTRY: OnceLock<HashMap<&'static str, PagedProducer>> = OnceLock::new();
    REGISTRY.get_or_init(|| HashMap::from([(CI_COMPLETED_RUNS, paged_producer!(ci::completed_runs_page))]))
}

/// Run the producer registered under `widget_id` and serialize its output.
///
/// An unknown widget id yields an empty payload and no error.
pub async fn execute(widget_id: &str, params: &ParamBag, ctx: &WidgetContext) -> Result<Vec<u8>> {
    let producer = match registry().get(widget_id) {
        Some(p) => p,
        None => {
            tracing::warn!("No producer registered for widget {}", widget_id);
            return Ok(Vec::new());
        }
    };

    tracing::debug!("Executing widget {}", widget_id);
    let value = producer(params, ctx).await.inspect_err(|e| {
        tracing::error!("Widget {} failed: {}", widget_id, e);
    })?;
    Ok(serde_json::to_vec(&value)?)
}

/// Run one page of a paginated producer. Widgets without pagination are
/// served whole as the only page.
pub async fn execute_multi_page(
    widget_id: &str,
    params: &ParamBag,
    cursor: usize,
    ctx: &WidgetContext,
) -> Result<(Vec<u8>, Option<usize>)> {
    let producer = match paged_registry().get(widget_id) {
        Some(p) => p,
        None => return Ok((execute(widget_id, params, ctx).await?, None)),
    };

    tracing::debug!("Executing widget {} page {}", widget_id, cursor);
    let page = producer(params, cursor, ctx).await.inspect_err(|e| {
        tracing::error!("Widget {} page {} failed: {}", widget_id, cursor, e);
    })?;
    Ok((serde_json::to_vec(&page.payload)?, page.next_cursor))
}

/// The organization a component widget is scoped to.
pub(crate) fn required_org(params: &ParamBag) -> Result<&str> {
    params
        .scope_org()
        .ok_or_else(|| EngineError::InvalidParams("orgId or subOrgId is required".to_string()))
}

/// The two-row tile shape: `[{"header": ...}, {"section": [...]}]`.
pub(crate) fn header_and_section(header: Value, section: Vec<Value>) -> Value {
    json!([{ "header": header }, { "section": section }])
}

pub(crate) fn services_by_id(services: &[Service]) -> HashMap<&str, &Service> {
    services.iter().map(|s| (s.id.as_str(), s)).collect()
}
