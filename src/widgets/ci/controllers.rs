//! Controllers connected to an operations center.

use super::{labelled, resolve_tool};
use crate::error::{EngineError, Result};
use crate::query::{
    compose, ParamBag, Scope, TemplateId, CJOC_CONTROLLER_INFO_INDEX, JOB_INFO_INDEX, RESULT_FAILURE, RUN_INFO_INDEX,
};
use crate::search::{bucket_key, buckets, decode, doc_count, metric, sub_buckets, top_hit_source};
use crate::widgets::{floor_percent, readable_duration, WidgetContext};

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Latest status document of a controller, keyed by its URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ControllerStatus {
    status: String,
    last_updated_time: Value,
}

fn status_by_url(response: &Value) -> Result<HashMap<String, ControllerStatus>> {
    let mut out = HashMap::new();
    for bucket in buckets(response, "controllers")? {
        if let Some(source) = top_hit_source(bucket, "latest")? {
            let status: ControllerStatus = decode(source, "controller status")?;
            out.insert(bucket_key(bucket).trim_end_matches('/').to_string(), status);
        }
    }
    Ok(out)
}

fn time_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "-".to_string(),
    }
}

pub async fn cjoc_controllers(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    if !params.is_cjoc() {
        return Err(EngineError::InvalidParams(
            "controllers are only listed for an operations center".to_string(),
        ));
    }

    let tool = match resolve_tool(params, ctx).await? {
        Some(t) => t,
        None => {
            return Ok(json!({
                "header": {"totalControllers": 0, "connectedControllers": 0, "totalJobs": 0, "totalRuns": 0},
                "controllers": [],
            }))
        }
    };
    let params = &tool.params;
    let scope = Scope::endpoints(params);

    let responses = ctx
        .transport
        .multi_search(vec![
            ("jobs", JOB_INFO_INDEX, compose(TemplateId::CiControllerJobs, params, &scope)?),
            ("runs", RUN_INFO_INDEX, compose(TemplateId::CiControllerRuns, params, &scope)?),
            (
                "status",
                CJOC_CONTROLLER_INFO_INDEX,
                compose(TemplateId::CiControllerStatus, params, &Scope::default())?,
            ),
        ])
        .await?;

    let jobs: HashMap<String, u64> = buckets(labelled(&responses, "jobs")?, "controllers")?
        .iter()
        .map(|b| Ok((bucket_key(b), metric(b, "jobs")? as u64)))
        .collect::<Result<_>>()?;
    let runs = buckets(labelled(&responses, "runs")?, "controllers")?;
    let statuses = status_by_url(labelled(&responses, "status")?)?;

    let now_ms = ctx.now.timestamp_millis();
    let mut controllers = tool.controllers.controllers.clone();
    for (id, info) in controllers.iter_mut() {
        info.total_jobs = jobs.get(id).copied().unwrap_or(0);

        if let Some(bucket) = runs.iter().find(|b| bucket_key(b) == *id) {
            info.total_runs = doc_count(bucket);
            info.failed_runs = sub_buckets(bucket, "results")?
                .iter()
                .filter(|r| bucket_key(r) == RESULT_FAILURE)
                .map(doc_count)
                .sum();
            let last = metric(bucket, "last_active")? as i64;
            info.last_active = if last > 0 {
                readable_duration((now_ms - last).max(0))
            } else {
                "-".to_string()
            };
        } else {
            info.last_active = "-".to_string();
        }

        if info.total_runs > 0 {
            info.failure_rate = Some(floor_percent(info.failed_runs as f64, info.total_runs as f64));
        }

        match statuses.get(&info.url) {
            Some(s) => {
                if !s.status.is_empty() {
                    info.status = s.status.clone();
                }
                info.last_updated_time = time_text(&s.last_updated_time);
            }
            None => info.last_updated_time = "-".to_string(),
        }
    }

    let total_jobs: u64 = controllers.values().map(|c| c.total_jobs).sum();
    let total_runs: u64 = controllers.values().map(|c| c.total_runs).sum();
    let rows: Vec<_> = controllers.into_values().collect();

    Ok(json!({
        "header": {
            "totalControllers": tool.controllers.total,
            "connectedControllers": tool.controllers.connected,
            "totalJobs": total_jobs,
            "totalRuns": total_runs,
        },
        "controllers": rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CiToolType;
    use crate::testing::{context, fixed_now, FakeStore};

    fn params() -> ParamBag {
        ParamBag {
            org_id: Some("org1".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ci_tool_id: Some("cjoc1".to_string()),
            ci_tool_type: Some(CiToolType::Cjoc),
            ..Default::default()
        }
    }

    fn store() -> FakeStore {
        let last_active = fixed_now().timestamp_millis() - 3 * 24 * 3_600_000;
        FakeStore::new()
            .on_search(
                "cb_ci_cjoc_controller_info",
                Some("controller_urls"),
                json!({"aggregations": {"controller_urls": {"buckets": [
                    {"key": "https://c1.example.com/", "doc_count": 1},
                    {"key": "https://c2.example.com", "doc_count": 1}
                ]}}}),
            )
            .on_search(
                "cb_ci_cjoc_controller_info",
                Some("controllers"),
                json!({"aggregations": {"controllers": {"buckets": [
                    {"key": "https://c2.example.com/", "doc_count": 2, "latest": {"hits": {"hits": [
                        {"_source": {"controller_url": "https://c2.example.com/", "status": "INSTALLED",
                                     "last_updated_time": "2024-01-31 10:00:00"}}
                    ]}}}
                ]}}}),
            )
            .on_search(
                "cb_ci_job_info",
                None,
                json!({"aggregations": {"controllers": {"buckets": [
                    {"key": "ctrl1", "doc_count": 40, "jobs": {"value": 12}},
                    {"key": "ctrl2", "doc_count": 9, "jobs": {"value": 3}}
                ]}}}),
            )
            .on_search(
                "cb_ci_run_info",
                None,
                json!({"aggregations": {"controllers": {"buckets": [
                    {"key": "ctrl1", "doc_count": 200, "last_active": {"value": last_active},
                     "results": {"buckets": [
                        {"key": "SUCCESS", "doc_count": 150},
                        {"key": "FAILURE", "doc_count": 50}
                     ]}}
                ]}}}),
            )
    }

    #[tokio::test]
    async fn test_controllers_header_and_rows() {
        let out = cjoc_controllers(&params(), &context(store())).await.unwrap();

        assert_eq!(
            out["header"],
            json!({"totalControllers": 3, "connectedControllers": 2, "totalJobs": 15, "totalRuns": 200})
        );
        let rows = out["controllers"].as_array().unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0]["toolId"], "ctrl1");
        assert_eq!(rows[0]["failureRate"], 25);
        assert_eq!(rows[0]["lastActive"], "3d");
        assert_eq!(rows[0]["lastUpdatedTime"], "-");
        assert!(rows[0].get("url").is_none());

        assert_eq!(rows[1]["status"], "INSTALLED");
        assert_eq!(rows[1]["lastUpdatedTime"], "2024-01-31 10:00:00");
        assert_eq!(rows[1]["lastActive"], "-");
        assert!(rows[1].get("failureRate").is_none());
    }

    #[tokio::test]
    async fn test_requires_operations_center() {
        let params = ParamBag {
            ci_tool_type: Some(CiToolType::Jenkins),
            ..params()
        };
        let err = cjoc_controllers(&params, &context(store())).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidParams(_)));
    }
}
