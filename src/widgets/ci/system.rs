//! Project types and the tool's self-reported information and health.

use super::resolve_tool;
use crate::error::{EngineError, Result};
use crate::probe::check_for_update;
use crate::query::{compose, ParamBag, Scope, TemplateId};
use crate::search::{bucket_key, buckets, cancelable, decode, doc_count, hits};
use crate::widgets::{floor_percent, percent_string, WidgetContext};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const HEALTH_SUCCESS: &str = "success";
pub const HEALTH_WARNING: &str = "warning";
pub const HEALTH_FAILED: &str = "failed";

/// Display name of a raw job type. Multibranch projects are folders too,
/// so they are matched first.
pub(super) fn project_type(job_type: &str) -> &'static str {
    let t = job_type.to_ascii_lowercase();
    if t.contains("branch") {
        "Multi-branch"
    } else if t.contains("folder") {
        "Multi-folder"
    } else if t.contains("freestyle") {
        "Freestyle"
    } else if t.contains("workflow") || t.contains("pipeline") {
        "Pipeline"
    } else if t.contains("matrix") {
        "Multi-configuration"
    } else if t.contains("maven") {
        "Maven"
    } else {
        "Other"
    }
}

pub async fn project_types(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let tool = match resolve_tool(params, ctx).await? {
        Some(t) => t,
        None => return Ok(json!({ "total": 0, "projectTypes": [] })),
    };
    let id = TemplateId::CiProjectTypes;
    let query = compose(id, &tool.params, &Scope::endpoints(&tool.params))?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    for bucket in buckets(&response, "job_types")? {
        *counts.entry(project_type(&bucket_key(bucket))).or_default() += doc_count(bucket);
    }
    let total: u64 = counts.values().sum();

    let mut types: Vec<(&str, u64)> = counts.into_iter().collect();
    types.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let types: Vec<Value> = types
        .into_iter()
        .map(|(name, count)| json!({ "type": name, "count": count }))
        .collect();

    Ok(json!({ "total": total, "projectTypes": types }))
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
struct Plugin {
    #[serde(alias = "short_name")]
    name: String,
    version: String,
    #[serde(alias = "has_update")]
    has_update: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Gauges {
    total_executors: u64,
    free_executors: u64,
    total_nodes: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct HealthCheck {
    name: String,
    healthy: bool,
    message: String,
}

/// Latest self-report of a CI tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ToolInsight {
    version: String,
    plugins: Vec<Plugin>,
    metrics: Gauges,
    health_checks: Vec<HealthCheck>,
}

async fn latest_insight(params: &ParamBag, ctx: &WidgetContext) -> Result<Option<ToolInsight>> {
    let tool_id = params
        .ci_tool_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::InvalidParams("ciToolId is required".to_string()))?;

    // The insight document belongs to the tool itself, even for an operations center.
    let scope = Scope {
        endpoint_ids: vec![tool_id.to_string()],
        ..Default::default()
    };
    let id = TemplateId::CiToolInsight;
    let query = compose(id, params, &scope)?;
    let response = ctx.transport.search(&query, id.index()).await?;

    match hits(&response)?.first().and_then(|h| h.get("_source")) {
        Some(source) => Ok(Some(decode(source, "tool insight")?)),
        None => Ok(None),
    }
}

pub async fn system_information(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let insight = match latest_insight(params, ctx).await? {
        Some(i) => i,
        None => return Ok(json!({})),
    };
    let check = cancelable(ctx.cancel_token(), async {
        Ok(check_for_update(ctx.versions.as_ref(), params.ci_tool_type, &insight.version).await)
    })
    .await?;
    let with_updates = insight.plugins.iter().filter(|p| p.has_update).count();

    Ok(json!({
        "version": insight.version,
        "latestVersion": check.latest,
        "versionUpdateAvailable": check.update_available,
        "message": check.message,
        "totalPlugins": insight.plugins.len(),
        "pluginsWithUpdates": with_updates,
        "plugins": insight.plugins,
        "totalExecutors": insight.metrics.total_executors,
        "freeExecutors": insight.metrics.free_executors,
        "totalNodes": insight.metrics.total_nodes,
    }))
}

/// UI key and description of a raw health check name. Unknown checks keep
/// their raw name.
fn health_key(name: &str) -> (String, String) {
    let (key, description) = match name {
        "disk-space" => ("diskSpace", "Disk space"),
        "plugins" => ("plugins", "Plugins"),
        "temporary-space" => ("temporarySpace", "Temporary space"),
        "thread-deadlock" => ("threadDeadlock", "Thread deadlock"),
        other => (other, other),
    };
    (key.to_string(), description.to_string())
}

fn health_status(score: u64) -> &'static str {
    if score > 80 {
        HEALTH_SUCCESS
    } else if score > 50 {
        HEALTH_WARNING
    } else {
        HEALTH_FAILED
    }
}

pub async fn system_health(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let checks = latest_insight(params, ctx)
        .await?
        .map(|i| i.health_checks)
        .unwrap_or_default();

    let healthy = checks.iter().filter(|c| c.healthy).count();
    let list: Vec<Value> = checks
        .iter()
        .map(|c| {
            let (name, description) = health_key(&c.name);
            json!({
                "name": name,
                "description": description,
                "healthy": c.healthy,
                "message": c.message,
            })
        })
        .collect();

    if healthy == 0 {
        return Ok(json!({ "healthScore": percent_string(0), "healthList": list }));
    }
    let score = floor_percent(healthy as f64, checks.len() as f64);
    Ok(json!({
        "healthScore": percent_string(score),
        "healthStatus": health_status(score),
        "healthList": list,
    }))
}
