//! Component header/section widgets and the security scan summary.
//!
//! Each tile intersects the components seen in telemetry with the services
//! registered for the organization; components without a service are not
//! shown.

use super::{drillable, format_millis, floor_percent, header_and_section, percent_string, required_org, services_by_id, DrillDown, WidgetContext};
use crate::error::Result;
use crate::query::{compose, ParamBag, Scope, TemplateId, RAW_SCAN_INDEX, SECURITY_SCAN_INDEX};
use crate::resources::BranchMode;
use crate::search::{bucket_key, buckets, doc_count, metric, sub_buckets};

use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

const SEVERITIES: [&str; 4] = ["CRITICAL", "HIGH", "MEDIUM", "LOW"];

/// Output keys of one activity tile.
struct ActivityKind {
    template: TemplateId,
    count_key: &'static str,
    failed_key: &'static str,
    active_key: &'static str,
    report_id: &'static str,
    report_title: &'static str,
}

const BUILDS: ActivityKind = ActivityKind {
    template: TemplateId::BuildActivityByComponent,
    count_key: "builds",
    failed_key: "failedBuilds",
    active_key: "builtComponents",
    report_id: "component-builds",
    report_title: "Builds",
};

const DEPLOYMENTS: ActivityKind = ActivityKind {
    template: TemplateId::DeployActivityByComponent,
    count_key: "deployments",
    failed_key: "failedDeployments",
    active_key: "deployedComponents",
    report_id: "component-deployments",
    report_title: "Deployments",
};

fn total_key(kind: &ActivityKind) -> String {
    let mut chars = kind.count_key.chars();
    match chars.next() {
        Some(first) => format!("total{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "total".to_string(),
    }
}

async fn activity_summary(kind: &ActivityKind, params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let org = required_org(params)?;
    let scope = Scope::from_params(params).with_branch(ctx.resolver.branch_scope(params, BranchMode::Name));
    let query = compose(kind.template, params, &scope)?;

    let (response, services) = tokio::try_join!(
        ctx.transport.search(&query, kind.template.index()),
        ctx.resolver.list_services(org),
    )?;
    let services_index = services_by_id(&services);

    let mut rows = Vec::new();
    let (mut total, mut failed_total) = (0u64, 0u64);
    for bucket in buckets(&response, "components")? {
        let id = bucket_key(bucket);
        let service = match services_index.get(id.as_str()) {
            Some(s) => s,
            None => continue,
        };

        let count = doc_count(bucket);
        let failed = bucket.get("failed").map(doc_count).unwrap_or(0);
        total += count;
        failed_total += failed;

        let drill_down = DrillDown::new(kind.report_id, kind.report_title)
            .with_type("component")
            .with_info(json!({ "componentId": id }));

        let mut row = Map::new();
        row.insert("componentId".into(), json!(id));
        row.insert("componentName".into(), json!(service.name));
        row.insert("repositoryUrl".into(), json!(service.repository_url));
        row.insert(kind.count_key.into(), drillable(json!(count), &drill_down));
        row.insert(kind.failed_key.into(), json!(failed));
        if bucket.get("environments").is_some() {
            row.insert("environments".into(), json!(metric(bucket, "environments")? as u64));
        }
        row.insert(
            "failureRate".into(),
            json!(percent_string(floor_percent(failed as f64, count as f64))),
        );
        row.insert(
            "lastActivity".into(),
            json!(format_millis(metric(bucket, "last_activity")? as i64)),
        );
        rows.push(Value::Object(row));
    }

    let mut header = Map::new();
    header.insert("totalComponents".into(), json!(services.len()));
    header.insert(kind.active_key.into(), json!(rows.len()));
    header.insert(total_key(kind), json!(total));
    header.insert(kind.failed_key.into(), json!(failed_total));
    header.insert(
        "failureRate".into(),
        json!(percent_string(floor_percent(failed_total as f64, total as f64))),
    );

    Ok(header_and_section(Value::Object(header), rows))
}

pub async fn built_components_summary(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    activity_summary(&BUILDS, params, ctx).await
}

pub async fn deployed_components_summary(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    activity_summary(&DEPLOYMENTS, params, ctx).await
}

/// Components scanned in the window, across both the processed scan index
/// and the raw scanner output.
pub async fn scanned_components_summary(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let org = required_org(params)?;
    let scope = Scope::from_params(params);
    let scan = compose(TemplateId::SecurityScanComponents, params, &scope)?;
    let raw_scan = compose(TemplateId::RawScanComponents, params, &scope)?;

    let (responses, services) = tokio::try_join!(
        ctx.transport.multi_search(vec![
            ("scan", SECURITY_SCAN_INDEX, scan),
            ("rawScan", RAW_SCAN_INDEX, raw_scan),
        ]),
        ctx.resolver.list_services(org),
    )?;
    let services_index = services_by_id(&services);

    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut severities: HashMap<String, HashMap<String, u64>> = HashMap::new();

    for label in ["scan", "rawScan"] {
        let response = match responses.get(label) {
            Some(r) => r,
            None => continue,
        };
        for bucket in buckets(response, "distinct_components")? {
            let id = bucket_key(bucket);
            for severity in sub_buckets(bucket, "severity")? {
                *severities
                    .entry(id.clone())
                    .or_default()
                    .entry(bucket_key(severity).to_ascii_uppercase())
                    .or_default() += doc_count(severity);
            }
            if seen.insert(id.clone()) {
                order.push(id);
            }
        }
    }

    let mut totals = [0u64; 4];
    let mut rows = Vec::new();
    for id in order {
        let service = match services_index.get(id.as_str()) {
            Some(s) => s,
            None => continue,
        };
        let counts = severities.get(&id);

        let mut row = Map::new();
        row.insert("componentId".into(), json!(id));
        row.insert("componentName".into(), json!(service.name));
        row.insert("repositoryUrl".into(), json!(service.repository_url));
        let mut findings = 0;
        for (i, severity) in SEVERITIES.iter().enumerate() {
            let n = counts.and_then(|c| c.get(*severity)).copied().unwrap_or(0);
            totals[i] += n;
            findings += n;
            row.insert(severity.to_ascii_lowercase(), json!(n));
        }
        let drill_down = DrillDown::new("security-findings", "Security findings")
            .with_type("component")
            .with_info(json!({ "componentId": id }));
        row.insert("findings".into(), drillable(json!(findings), &drill_down));
        rows.push(Value::Object(row));
    }

    let mut header = Map::new();
    header.insert("totalComponents".into(), json!(services.len()));
    header.insert("scannedComponents".into(), json!(rows.len()));
    for (i, severity) in SEVERITIES.iter().enumerate() {
        header.insert(severity.to_ascii_lowercase(), json!(totals[i]));
    }

    Ok(header_and_section(Value::Object(header), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, recording_context, FakeStore};

    fn params() -> ParamBag {
        ParamBag {
            org_id: Some("org1".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_built_summary_intersects_services() {
        let store = FakeStore::new().on_search(
            "build_events",
            Some("components"),
            json!({"aggregations": {"components": {"buckets": [
                {"key": "comp1", "doc_count": 10, "failed": {"doc_count": 3},
                 "last_activity": {"value": 1704067200000.0}},
                {"key": "unregistered", "doc_count": 5, "failed": {"doc_count": 5}}
            ]}}}),
        );
        let out = built_components_summary(&params(), &context(store)).await.unwrap();

        let header = &out[0]["header"];
        assert_eq!(header["totalComponents"], 2);
        assert_eq!(header["builtComponents"], 1);
        assert_eq!(header["totalBuilds"], 10);
        assert_eq!(header["failureRate"], "30%");

        let section = out[1]["section"].as_array().unwrap();
        assert_eq!(section.len(), 1);
        assert_eq!(section[0]["repositoryUrl"], "https://git.example.com/payments-api");
        assert_eq!(section[0]["builds"]["value"], 10);
        assert_eq!(section[0]["builds"]["drillDown"]["reportInfo"]["componentId"], "comp1");
        assert_eq!(section[0]["lastActivity"], "2024-01-01 00:00:00");
        assert!(section[0].get("environments").is_none());
    }

    #[tokio::test]
    async fn test_deployed_summary_counts_environments() {
        let store = FakeStore::new().on_search(
            "deploy_events",
            Some("components"),
            json!({"aggregations": {"components": {"buckets": [
                {"key": "comp2", "doc_count": 4, "failed": {"doc_count": 0},
                 "environments": {"value": 3}, "last_activity": {"value": null}}
            ]}}}),
        );
        let out = deployed_components_summary(&params(), &context(store)).await.unwrap();
        assert_eq!(out[0]["header"]["deployedComponents"], 1);
        assert_eq!(out[0]["header"]["totalDeployments"], 4);
        let row = &out[1]["section"][0];
        assert_eq!(row["environments"], 3);
        assert_eq!(row["lastActivity"], "-");
        assert_eq!(row["failureRate"], "0%");
    }

    #[tokio::test]
    async fn test_scanned_summary_unions_both_indices() {
        let store = FakeStore::new()
            .on_search(
                "security_scan",
                None,
                json!({"aggregations": {"distinct_components": {"buckets": [
                    {"key": "comp1", "doc_count": 3, "severity": {"buckets": [
                        {"key": "CRITICAL", "doc_count": 2},
                        {"key": "low", "doc_count": 1}
                    ]}}
                ]}}}),
            )
            .on_search(
                "raw_scan_result",
                None,
                json!({"aggregations": {"distinct_components": {"buckets": [
                    {"key": "comp2", "doc_count": 1},
                    {"key": "comp1", "doc_count": 1},
                    {"key": "ghost", "doc_count": 1}
                ]}}}),
            );
        let (ctx, store) = recording_context(store);
        let out = scanned_components_summary(&params(), &ctx).await.unwrap();

        assert_eq!(out[0]["header"]["scannedComponents"], 2);
        assert_eq!(out[0]["header"]["critical"], 2);
        assert_eq!(out[0]["header"]["low"], 1);
        let section = out[1]["section"].as_array().unwrap();
        assert_eq!(section[0]["componentId"], "comp1");
        assert_eq!(section[0]["findings"]["value"], 3);
        assert_eq!(section[1]["componentId"], "comp2");
        assert_eq!(section[1]["critical"], 0);

        let indices: Vec<_> = store.requests().into_iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec!["security_scan", "raw_scan_result"]);
    }

    #[tokio::test]
    async fn test_failed_scan_index_still_reports_the_other() {
        let store = FakeStore::new()
            .on_search_error("security_scan", "index_not_found_exception")
            .on_search(
                "raw_scan_result",
                None,
                json!({"aggregations": {"distinct_components": {"buckets": [
                    {"key": "comp2", "doc_count": 1}
                ]}}}),
            );
        let out = scanned_components_summary(&params(), &context(store)).await.unwrap();
        assert_eq!(out[0]["header"]["scannedComponents"], 1);
    }
}
