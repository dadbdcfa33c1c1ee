//! Code-quality widgets over scanner reports.

use super::{floor_percent, required_org, services_by_id, WidgetContext};
use crate::error::Result;
use crate::query::{compose, ParamBag, Scope, TemplateId};
use crate::search::{bucket_key, buckets, decode, doc_count, top_hit_source};

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QualityReport {
    code_lines: f64,
    lines_to_cover: f64,
    duplication_lines: f64,
    total_lines: f64,
}

impl QualityReport {
    fn coverage(&self) -> u64 {
        if self.code_lines <= 0.0 {
            return 0;
        }
        floor_percent(self.code_lines - self.lines_to_cover, self.code_lines)
    }

    fn duplication(&self) -> u64 {
        floor_percent(self.duplication_lines, self.total_lines)
    }
}

/// Issue classes in display order.
const ISSUE_TYPES: [(&str, &str); 4] = [
    ("CODE_SMELL", "Code smells"),
    ("BUG", "Bugs"),
    ("SECURITY_HOTSPOT", "Security hotspots"),
    ("VULNERABILITY", "Vulnerabilities"),
];

fn issue_class(issue_type: &str) -> Option<usize> {
    ISSUE_TYPES
        .iter()
        .position(|(prefix, _)| issue_type.starts_with(prefix))
}

/// Coverage and duplication from the latest report of each component.
pub async fn code_quality_components(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let org = required_org(params)?;
    let id = TemplateId::CodeQualityReports;
    let query = compose(id, params, &Scope::from_params(params))?;

    let (response, services) = tokio::try_join!(
        ctx.transport.search(&query, id.index()),
        ctx.resolver.list_services(org),
    )?;
    let services_index = services_by_id(&services);

    let mut rows = Vec::new();
    for bucket in buckets(&response, "components")? {
        let component_id = bucket_key(bucket);
        let service = match services_index.get(component_id.as_str()) {
            Some(s) => s,
            None => continue,
        };
        let report: QualityReport = match top_hit_source(bucket, "latest_report")? {
            Some(source) => decode(source, "latest_report")?,
            None => QualityReport::default(),
        };
        rows.push(json!({
            "componentId": component_id,
            "componentName": service.name,
            "repositoryUrl": service.repository_url,
            "linesOfCode": report.code_lines as u64,
            "coverage": report.coverage(),
            "duplicationDensity": report.duplication(),
        }));
    }
    Ok(Value::Array(rows))
}

/// Issue counts for the four issue classes, always all four.
pub async fn code_quality_issue_types(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let id = TemplateId::CodeQualityIssues;
    let query = compose(id, params, &Scope::from_params(params))?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let mut counts = [0u64; ISSUE_TYPES.len()];
    for bucket in buckets(&response, "issue_types")? {
        let key = bucket_key(bucket);
        match issue_class(&key) {
            Some(i) => counts[i] += doc_count(bucket),
            None => tracing::debug!("Ignoring issue type {}", key),
        }
    }

    let out: Vec<Value> = ISSUE_TYPES
        .iter()
        .zip(counts)
        .map(|((kind, name), count)| json!({ "type": kind, "name": name, "count": count }))
        .collect();
    Ok(Value::Array(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, FakeStore};

    fn params() -> ParamBag {
        ParamBag {
            org_id: Some("org1".to_string()),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_report_percentages() {
        let report = QualityReport {
            code_lines: 1000.0,
            lines_to_cover: 255.0,
            duplication_lines: 37.0,
            total_lines: 1200.0,
        };
        assert_eq!(report.coverage(), 74);
        assert_eq!(report.duplication(), 3);
        assert_eq!(QualityReport::default().coverage(), 0);
        assert_eq!(QualityReport::default().duplication(), 0);
    }

    #[test]
    fn test_issue_class_by_prefix() {
        assert_eq!(issue_class("CODE_SMELL"), Some(0));
        assert_eq!(issue_class("BUG_MAJOR"), Some(1));
        assert_eq!(issue_class("SECURITY_HOTSPOT"), Some(2));
        assert_eq!(issue_class("VULNERABILITY_CRITICAL"), Some(3));
        assert_eq!(issue_class("STYLE"), None);
    }

    #[tokio::test]
    async fn test_components_from_latest_report() {
        let store = FakeStore::new().on_search(
            "code_quality_reports",
            None,
            json!({"aggregations": {"components": {"buckets": [
                {"key": "comp1", "doc_count": 4, "latest_report": {"hits": {"hits": [
                    {"_source": {"code_lines": 200, "lines_to_cover": 50,
                                 "duplication_lines": 10, "total_lines": 400}}
                ]}}},
                {"key": "comp2", "doc_count": 1, "latest_report": {"hits": {"hits": []}}},
                {"key": "ghost", "doc_count": 1}
            ]}}}),
        );
        let out = code_quality_components(&params(), &context(store)).await.unwrap();
        let rows = out.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["coverage"], 75);
        assert_eq!(rows[0]["duplicationDensity"], 2);
        assert_eq!(rows[0]["linesOfCode"], 200);
        assert_eq!(rows[1]["coverage"], 0);
    }

    #[tokio::test]
    async fn test_issue_types_always_four() {
        let store = FakeStore::new().on_search(
            "code_quality_issues",
            None,
            json!({"aggregations": {"issue_types": {"buckets": [
                {"key": "BUG", "doc_count": 3},
                {"key": "BUG_BLOCKER", "doc_count": 1},
                {"key": "TYPO", "doc_count": 8}
            ]}}}),
        );
        let out = code_quality_issue_types(&params(), &context(store)).await.unwrap();
        assert_eq!(
            out,
            json!([
                {"type": "CODE_SMELL", "name": "Code smells", "count": 0},
                {"type": "BUG", "name": "Bugs", "count": 4},
                {"type": "SECURITY_HOTSPOT", "name": "Security hotspots", "count": 0},
                {"type": "VULNERABILITY", "name": "Vulnerabilities", "count": 0}
            ])
        );
    }
}
