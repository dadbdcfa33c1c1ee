//! Automation widgets: workflow run statistics and default-branch activity.

use super::{drillable, failure_rate_bar, header_and_section, readable_duration, required_org, services_by_id, DrillDown, WidgetContext};
use crate::error::Result;
use crate::query::{
    compose, BranchClause, ParamBag, Scope, TemplateId, STATUS_CANCELED, STATUS_FAILED, STATUS_SKIPPED, STATUS_SUCCEEDED,
};
use crate::search::{at, bucket_key, buckets, doc_count, metric, sub_buckets, top_metric};

use serde_json::{json, Value};

/// Per-component workflow runs over the automations the resource tree
/// knows for the requested components and branch name.
pub async fn workflow_runs_by_component(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let org = required_org(params)?;
    let branch = params.branch.as_deref().filter(|b| !b.is_empty());
    let automations = ctx.resolver.automation_map(org, &params.component, branch);
    if automations.is_empty() {
        tracing::debug!("No automations under {} for the requested components", org);
        return Ok(json!([]));
    }

    let id = TemplateId::AutomationRunsByComponent;
    let scope = Scope::from_params(params).with_branch(Some(BranchClause::Automations(automations.into_iter().collect())));
    let query = compose(id, params, &scope)?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let mut rows = Vec::new();
    for bucket in buckets(&response, "components")? {
        let component_id = bucket_key(bucket);
        let (mut successful, mut failed, mut skipped) = (0, 0, 0);
        for status in sub_buckets(bucket, "status")? {
            let n = doc_count(status);
            match bucket_key(status).as_str() {
                STATUS_SUCCEEDED => successful += n,
                STATUS_FAILED => failed += n,
                STATUS_SKIPPED | STATUS_CANCELED => skipped += n,
                _ => {}
            }
        }

        let drill_down = DrillDown::new("workflow-runs", "Workflow runs")
            .with_type("component")
            .with_info(json!({ "componentId": component_id, "branch": branch }));

        rows.push(json!({
            "componentId": component_id,
            "componentName": ctx.resolver.resource_name(&component_id).unwrap_or_else(|| component_id.clone()),
            "runs": drillable(json!(doc_count(bucket)), &drill_down),
            "failureRate": failure_rate_bar(successful, failed, skipped),
            "avgDuration": readable_duration(metric(bucket, "avg_duration")? as i64),
        }));
    }
    Ok(Value::Array(rows))
}

async fn search_or_empty(ctx: &WidgetContext, params: &ParamBag, scope: &Scope, id: TemplateId) -> Result<Value> {
    let query = compose(id, params, scope)?;
    match ctx.transport.search(&query, id.index()).await {
        Ok(v) => Ok(v),
        Err(e) if ctx.cancel_token().is_cancelled() => Err(e),
        Err(e) => {
            tracing::warn!("{:?} failed, reporting it as empty: {}", id, e);
            Ok(json!({}))
        }
    }
}

/// Commits and automation runs on default branches.
pub async fn default_branch_commits(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let org = required_org(params)?;
    let scope = Scope::from_params(params);

    let (commits, automations, services) = tokio::join!(
        search_or_empty(ctx, params, &scope, TemplateId::DefaultBranchCommits),
        search_or_empty(ctx, params, &scope, TemplateId::DefaultBranchAutomations),
        ctx.resolver.list_services(org),
    );
    let (commits, automations, services) = (commits?, automations?, services?);
    let services_index = services_by_id(&services);

    let mut rows = Vec::new();
    let mut total_commits = 0u64;
    for bucket in buckets(&commits, "components")? {
        let id = bucket_key(bucket);
        let service = match services_index.get(id.as_str()) {
            Some(s) => s,
            None => continue,
        };
        let n = metric(bucket, "commits")? as u64;
        total_commits += n;
        rows.push(json!({
            "componentId": id,
            "componentName": service.name,
            "repositoryUrl": service.repository_url,
            "commits": n,
        }));
    }

    let mut automation_runs = top_metric(&automations, "automation_runs_count")? as u64;
    // Second assignment wins: the deployed count replaces the run count.
    if let Some(deployed) = at(&automations, &["aggregations", "deployed_automation_count"]) {
        automation_runs = metric(deployed, "automations")? as u64;
    }

    let header = json!({
        "componentsWithCommits": rows.len(),
        "totalCommits": total_commits,
        "automationRuns": automation_runs,
    });
    Ok(header_and_section(header, rows))
}
