//! Project activity: per-job execution history, with idle and fragile views.

use super::system::project_type;
use super::{fetch_jobs, jobs_by_id, resolve_tool, JobInfo, ToolScope, MAX_JOB_PAGE};
use crate::error::Result;
use crate::query::{
    compose, FilterType, ParamBag, Scope, TemplateId, RESULT_ABORTED, RESULT_FAILURE, RESULT_SUCCESS, RESULT_UNSTABLE,
};
use crate::search::{bucket_key, buckets, scripted};
use crate::widgets::{readable_duration, translate_all, WidgetContext};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const MIN_AVG_RUN_TIME: i64 = 1000;
const FRAGILE_LOW: f64 = 0.3;
const FRAGILE_HIGH: f64 = 0.7;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ResultClass {
    count: u64,
    last_active: i64,
}

/// One element of the `project_activity` scripted metric.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct JobActivity {
    job_id: String,
    endpoint_id: String,
    total_duration: i64,
    total_executed: u64,
    results: HashMap<String, ResultClass>,
}

impl JobActivity {
    fn count(&self, result: &str) -> u64 {
        self.results.get(result).map_or(0, |r| r.count)
    }

    fn last_active(&self) -> i64 {
        self.results.values().map(|r| r.last_active).max().unwrap_or(0)
    }

    fn is_fragile(&self) -> bool {
        if self.total_executed == 0 {
            return false;
        }
        let broken = (self.count(RESULT_FAILURE) + self.count(RESULT_UNSTABLE)) as f64;
        let ratio = broken / self.total_executed as f64;
        ratio > FRAGILE_LOW && ratio < FRAGILE_HIGH
    }

    /// Mean run time in milliseconds, never under a second.
    fn avg_run_time(&self) -> Option<i64> {
        if self.total_duration <= 0 || self.total_executed == 0 {
            return None;
        }
        let executed = self.total_executed as i64;
        let avg = (self.total_duration + executed - 1) / executed;
        Some(avg.max(MIN_AVG_RUN_TIME))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRow {
    job_id: String,
    job_name: String,
    display_name: String,
    job_type: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    controller_name: Option<String>,
    last_active: String,
    last_active_duration: i64,
    total_executed: u64,
    successful_runs: u64,
    failed_runs: u64,
    unstable_runs: u64,
    canceled_runs: u64,
    avg_run_time: String,
}

impl ActivityRow {
    fn idle(job: &JobInfo, controller_name: Option<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            display_name: if job.display_name.is_empty() {
                job.job_name.clone()
            } else {
                job.display_name.clone()
            },
            job_type: project_type(&job.job_type),
            url: job.url.clone(),
            controller_name,
            last_active: "-".to_string(),
            last_active_duration: 0,
            total_executed: 0,
            successful_runs: 0,
            failed_runs: 0,
            unstable_runs: 0,
            canceled_runs: 0,
            avg_run_time: "-".to_string(),
        }
    }
}

struct ActivityLookup {
    jobs: HashMap<String, JobInfo>,
    controllers: HashMap<String, String>,
    now_ms: i64,
    fragile_only: bool,
}

impl ActivityLookup {
    fn translate(&self, activity: JobActivity) -> Option<ActivityRow> {
        if self.fragile_only && !activity.is_fragile() {
            return None;
        }
        let job = self.jobs.get(&activity.job_id)?;

        let last_active = activity.last_active();
        let (last_active_text, since) = if last_active > 0 {
            let since = (self.now_ms - last_active).max(0);
            (readable_duration(since), since)
        } else {
            ("-".to_string(), 0)
        };

        let mut row = ActivityRow::idle(job, self.controllers.get(&activity.endpoint_id).cloned());
        row.last_active = last_active_text;
        row.last_active_duration = since;
        row.total_executed = activity.total_executed;
        row.successful_runs = activity.count(RESULT_SUCCESS);
        row.failed_runs = activity.count(RESULT_FAILURE);
        row.unstable_runs = activity.count(RESULT_UNSTABLE);
        row.canceled_runs = activity.count(RESULT_ABORTED);
        row.avg_run_time = activity
            .avg_run_time()
            .map(readable_duration)
            .unwrap_or_else(|| "-".to_string());
        Some(row)
    }
}

async fn active_jobs(tool: &ToolScope, ctx: &WidgetContext, fragile_only: bool) -> Result<Vec<ActivityRow>> {
    let params = &tool.params;
    let scope = Scope::endpoints(params);

    let id = TemplateId::CiProjectActivity;
    let response = ctx.transport.search(&compose(id, params, &scope)?, id.index()).await?;
    let activity: Vec<JobActivity> = scripted(&response, "project_activity")?;

    let job_ids: BTreeSet<String> = activity.iter().map(|a| a.job_id.clone()).collect();
    let lookup = Arc::new(ActivityLookup {
        jobs: fetch_jobs(params, job_ids, ctx).await?,
        controllers: tool.controller_names(),
        now_ms: ctx.now.timestamp_millis(),
        fragile_only,
    });
    translate_all(activity, move |a| lookup.translate(a), ctx.cancel_token()).await
}

/// Jobs without a single completed run in the window.
async fn idle_jobs(tool: &ToolScope, ctx: &WidgetContext) -> Result<Vec<ActivityRow>> {
    let params = &tool.params;
    let scope = Scope::endpoints(params);

    let id = TemplateId::CiExecutedJobIds;
    let response = ctx.transport.search(&compose(id, params, &scope)?, id.index()).await?;
    let mut excluded: Vec<String> = buckets(&response, "executed_jobs")?
        .iter()
        .map(bucket_key)
        .collect();
    excluded.extend(params.job_ids.iter().cloned());
    tracing::debug!("{} jobs executed in the window", excluded.len());

    let id = TemplateId::CiJobs;
    let query = compose(id, params, &scope.with_job_ids(excluded))?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let controllers = Arc::new(tool.controller_names());
    let jobs: Vec<JobInfo> = jobs_by_id(&response)?.into_values().collect();
    if jobs.len() >= MAX_JOB_PAGE {
        tracing::warn!("Idle job listing truncated at {} jobs", MAX_JOB_PAGE);
    }
    translate_all(
        jobs,
        move |job| Some(ActivityRow::idle(&job, controllers.get(&job.endpoint_id).cloned())),
        ctx.cancel_token(),
    )
    .await
}

pub async fn project_activity(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let tool = match resolve_tool(params, ctx).await? {
        Some(t) => t,
        None => return Ok(json!([])),
    };

    let mut rows = match params.filter_type {
        FilterType::None => active_jobs(&tool, ctx, false).await?,
        FilterType::FragileFilter => active_jobs(&tool, ctx, true).await?,
        FilterType::IdleFilter => idle_jobs(&tool, ctx).await?,
    };
    rows.sort_by(|a, b| {
        a.last_active_duration
            .cmp(&b.last_active_duration)
            .then_with(|| a.job_name.cmp(&b.job_name))
    });
    Ok(serde_json::to_value(rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CiToolType;
    use crate::testing::{context, fixed_now, recording_context, FakeStore};

    const HOUR: i64 = 3_600_000;

    fn params(filter_type: FilterType) -> ParamBag {
        ParamBag {
            org_id: Some("org1".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ci_tool_id: Some("jenkins1".to_string()),
            ci_tool_type: Some(CiToolType::Jenkins),
            filter_type,
            ..Default::default()
        }
    }

    fn jobs() -> Value {
        json!({"hits": {"hits": [
            {"_source": {"job_id": "j1", "job_name": "build", "job_type": "hudson.model.FreeStyleProject"}},
            {"_source": {"job_id": "j2", "job_name": "deploy", "job_type": "WorkflowJob"}},
            {"_source": {"job_id": "j3", "job_name": "nightly"}}
        ]}})
    }

    fn activity(job: &str, hours_ago: i64, duration: i64, results: Value) -> Value {
        let mut results = results;
        let last_active = fixed_now().timestamp_millis() - hours_ago * HOUR;
        for class in results.as_object_mut().unwrap().values_mut() {
            class["last_active"] = json!(last_active);
        }
        let executed: u64 = results
            .as_object()
            .unwrap()
            .values()
            .map(|c| c["count"].as_u64().unwrap())
            .sum();
        json!({
            "job_id": job, "endpoint_id": "jenkins1",
            "total_duration": duration, "total_executed": executed,
            "results": results
        })
    }

    fn store() -> FakeStore {
        FakeStore::new()
            .on_search(
                "cb_ci_run_info",
                Some("project_activity"),
                json!({"aggregations": {"project_activity": {"value": [
                    activity("j2", 24, 300, json!({"SUCCESS": {"count": 2}, "FAILURE": {"count": 1}})),
                    activity("j1", 2, 2500, json!({"SUCCESS": {"count": 1}, "FAILURE": {"count": 1}})),
                    activity("j3", 5, 0, json!({"FAILURE": {"count": 3}, "UNSTABLE": {"count": 4},
                                                 "SUCCESS": {"count": 3}})),
                    activity("gone", 1, 10, json!({"SUCCESS": {"count": 1}}))
                ]}}}),
            )
            .on_search("cb_ci_job_info", None, jobs())
    }

    #[test]
    fn test_avg_run_time() {
        let activity = JobActivity {
            total_duration: 2500,
            total_executed: 2,
            ..Default::default()
        };
        assert_eq!(activity.avg_run_time(), Some(1250));
        let activity = JobActivity {
            total_duration: 3001,
            total_executed: 3,
            ..Default::default()
        };
        assert_eq!(activity.avg_run_time(), Some(1001));
        let activity = JobActivity {
            total_duration: 300,
            total_executed: 3,
            ..Default::default()
        };
        assert_eq!(activity.avg_run_time(), Some(1000));
        assert_eq!(JobActivity::default().avg_run_time(), None);
    }

    #[tokio::test]
    async fn test_active_jobs_sorted_by_recency() {
        let out = project_activity(&params(FilterType::None), &context(store())).await.unwrap();
        let rows = out.as_array().unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["jobName"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["build", "nightly", "deploy"]);

        assert_eq!(rows[0]["lastActive"], "2h");
        assert_eq!(rows[0]["lastActiveDuration"], 2 * HOUR);
        assert_eq!(rows[0]["avgRunTime"], "1s");
        assert_eq!(rows[0]["jobType"], "Freestyle");
        assert_eq!(rows[1]["avgRunTime"], "-");
        assert_eq!(rows[1]["unstableRuns"], 4);
        assert_eq!(rows[2]["lastActive"], "1d");
    }

    #[tokio::test]
    async fn test_jobs_are_fetched_for_active_ids() {
        let (ctx, store) = recording_context(store());
        project_activity(&params(FilterType::None), &ctx).await.unwrap();

        let requests = store.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].0, "cb_ci_job_info");
        assert!(requests[1].1["query"]["bool"]["must"]
            .as_array()
            .unwrap()
            .contains(&json!({"terms": {"job_id": ["gone", "j1", "j2", "j3"]}})));
    }

    #[tokio::test]
    async fn test_fragile_filter_is_strict() {
        let out = project_activity(&params(FilterType::FragileFilter), &context(store()))
            .await
            .unwrap();
        let names: Vec<_> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["jobName"].as_str().unwrap())
            .collect();
        // build is 1/2 broken; deploy 1/3; nightly 7/10 sits on the bound.
        assert_eq!(names, vec!["build", "deploy"]);
    }

    #[tokio::test]
    async fn test_idle_filter_excludes_executed_jobs() {
        let store = FakeStore::new()
            .on_search(
                "cb_ci_run_info",
                Some("executed_jobs"),
                json!({"aggregations": {"executed_jobs": {"buckets": [
                    {"key": "j1", "doc_count": 4}
                ]}}}),
            )
            .on_search(
                "cb_ci_job_info",
                None,
                json!({"hits": {"hits": [
                    {"_source": {"job_id": "j3", "job_name": "nightly"}},
                    {"_source": {"job_id": "j2", "job_name": "deploy"}}
                ]}}),
            );
        let (ctx, store) = recording_context(store);
        let out = project_activity(&params(FilterType::IdleFilter), &ctx).await.unwrap();

        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["jobName"], "deploy");
        assert!(rows.iter().all(|r| r["lastActive"] == "-"));

        let requests = store.requests();
        assert!(requests[1].1["query"]["bool"]["must"]
            .as_array()
            .unwrap()
            .iter()
            .all(|c| c["terms"].get("job_id").is_none()));
        assert_eq!(
            requests[1].1["query"]["bool"]["must_not"],
            json!([{"terms": {"job_id": ["j1"]}}])
        );
    }
}
