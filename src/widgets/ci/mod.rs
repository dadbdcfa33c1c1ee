//! CI insights widgets.
//!
//! Every widget here is keyed by the CI tool in the request. For an
//! operations center the tool is expanded to its connected controllers
//! first, see [`resolve_tool`].

mod activity;
mod completed_runs;
mod controllers;
mod runs;
mod system;

pub use activity::project_activity;
pub use completed_runs::{completed_runs, completed_runs_page, prepare_run_stream};
pub use controllers::cjoc_controllers;
pub use runs::{runs_overview, usage_patterns};
pub use system::{project_types, system_health, system_information};

use super::WidgetContext;
use crate::error::{EngineError, Result};
use crate::query::{compose, ParamBag, Scope, TemplateId, JOB_INFO_INDEX};
use crate::resources::ControllerSet;
use crate::search::{decode, hits};

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Most job documents one search returns.
pub(crate) const MAX_JOB_PAGE: usize = 10000;

/// The request parameters retargeted at the tool's endpoints.
pub(crate) struct ToolScope {
    pub params: ParamBag,
    pub controllers: ControllerSet,
}

impl ToolScope {
    /// Controller display names by endpoint id; empty unless the tool is an
    /// operations center.
    pub fn controller_names(&self) -> HashMap<String, String> {
        self.controllers
            .controllers
            .iter()
            .map(|(id, c)| (id.clone(), c.name.clone()))
            .collect()
    }
}

/// Resolve the CI tool into endpoints. `None` when an operations center has
/// no connected controller, in which case there is nothing to query.
pub(crate) async fn resolve_tool(params: &ParamBag, ctx: &WidgetContext) -> Result<Option<ToolScope>> {
    let mut params = params.clone();
    let controllers = ctx
        .resolver
        .update_replacements_and_get_controllers(&mut params)
        .await?;
    if params.endpoint_ids.iter().all(|id| id.is_empty()) {
        tracing::debug!("No endpoints behind CI tool {:?}", params.ci_tool_id);
        return Ok(None);
    }
    Ok(Some(ToolScope { params, controllers }))
}

/// A multi-search item that must have succeeded.
pub(crate) fn labelled<'a>(responses: &'a Map<String, Value>, label: &str) -> Result<&'a Value> {
    let r = responses
        .get(label)
        .ok_or_else(|| EngineError::Transport(format!("no {} response", label)))?;
    match r.get("error") {
        Some(e) => Err(EngineError::Transport(format!("{} search failed: {}", label, e))),
        None => Ok(r),
    }
}

/// A job document of the job info index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct JobInfo {
    pub job_id: String,
    pub job_name: String,
    pub display_name: String,
    pub endpoint_id: String,
    pub job_type: String,
    pub url: String,
}

/// Job documents of a search response, by job id.
pub(crate) fn jobs_by_id(response: &Value) -> Result<HashMap<String, JobInfo>> {
    let mut jobs = HashMap::new();
    for hit in hits(response)? {
        if let Some(source) = hit.get("_source") {
            let job: JobInfo = decode(source, "job")?;
            jobs.insert(job.job_id.clone(), job);
        }
    }
    Ok(jobs)
}

/// Fetch the jobs named in `job_ids`, one search per [`MAX_JOB_PAGE`] ids so
/// that no search can be cut off by the page size.
pub(crate) async fn fetch_jobs(
    params: &ParamBag,
    job_ids: BTreeSet<String>,
    ctx: &WidgetContext,
) -> Result<HashMap<String, JobInfo>> {
    if job_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let ids: Vec<String> = job_ids.into_iter().collect();
    let chunks: Vec<&[String]> = ids.chunks(MAX_JOB_PAGE).collect();
    let labels: Vec<String> = (0..chunks.len()).map(|i| format!("jobs{}", i)).collect();

    let mut queries = Vec::with_capacity(chunks.len());
    for (label, chunk) in labels.iter().zip(&chunks) {
        let scope = Scope::endpoints(params).only_jobs(chunk.to_vec());
        queries.push((label.as_str(), JOB_INFO_INDEX, compose(TemplateId::CiJobs, params, &scope)?));
    }
    tracing::debug!("Fetching {} jobs in {} searches", ids.len(), queries.len());
    let responses = ctx.transport.multi_search(queries).await?;

    let mut jobs = HashMap::new();
    for label in &labels {
        jobs.extend(jobs_by_id(labelled(&responses, label)?)?);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CiToolType;
    use crate::testing::{context, recording_context, FakeStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_single_tool_is_its_own_endpoint() {
        let params = ParamBag {
            ci_tool_id: Some("jenkins1".to_string()),
            ci_tool_type: Some(CiToolType::Jenkins),
            ..Default::default()
        };
        let scope = resolve_tool(&params, &context(FakeStore::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scope.params.endpoint_ids, vec!["jenkins1"]);
        assert!(scope.controller_names().is_empty());
    }

    #[tokio::test]
    async fn test_cjoc_without_connected_controllers() {
        let params = ParamBag {
            org_id: Some("org1".to_string()),
            ci_tool_id: Some("cjoc1".to_string()),
            ci_tool_type: Some(CiToolType::Cjoc),
            ..Default::default()
        };
        let ctx = context(FakeStore::new().on_search(
            "cb_ci_cjoc_controller_info",
            Some("controller_urls"),
            json!({"aggregations": {"controller_urls": {"buckets": []}}}),
        ));
        assert!(resolve_tool(&params, &ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jobs_are_fetched_in_pages() {
        let store = FakeStore::new().on_search(
            "cb_ci_job_info",
            None,
            json!({"hits": {"hits": [{"_source": {"job_id": "j00001", "job_name": "build"}}]}}),
        );
        let (ctx, store) = recording_context(store);
        let params = ParamBag {
            endpoint_ids: vec!["jenkins1".to_string()],
            ..Default::default()
        };
        let ids: BTreeSet<String> = (0..=MAX_JOB_PAGE).map(|n| format!("j{:05}", n)).collect();

        let jobs = fetch_jobs(&params, ids, &ctx).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs["j00001"].job_name, "build");

        let requests = store.requests();
        assert_eq!(requests.len(), 2);
        let restricted = |i: usize| -> usize {
            requests[i].1["query"]["bool"]["must"]
                .as_array()
                .unwrap()
                .iter()
                .find_map(|c| c["terms"]["job_id"].as_array())
                .map_or(0, Vec::len)
        };
        assert_eq!(restricted(0), MAX_JOB_PAGE);
        assert_eq!(restricted(1), 1);
    }

    #[tokio::test]
    async fn test_no_jobs_no_search() {
        let (ctx, store) = recording_context(FakeStore::new());
        let jobs = fetch_jobs(&ParamBag::default(), BTreeSet::new(), &ctx).await.unwrap();
        assert!(jobs.is_empty());
        assert!(store.requests().is_empty());
    }
}
