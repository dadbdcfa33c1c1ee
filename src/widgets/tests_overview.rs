//! Test suite results and the most frequently failing test cases.

use super::{failure_rate_bar, millis_to_seconds, WidgetContext};
use crate::error::Result;
use crate::query::{compose, ParamBag, Scope, TemplateId, TEST_CASES_INDEX, TEST_SUITES_INDEX};
use crate::search::{bucket_key, buckets, doc_count, metric, sub_buckets};

use serde_json::{json, Value};

pub async fn test_suites_overview(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let scope = Scope::from_params(params);
    let suites_query = compose(TemplateId::TestSuitesOverview, params, &scope)?;
    let cases_query = compose(TemplateId::TestCaseFailures, params, &scope)?;

    let responses = ctx
        .transport
        .multi_search(vec![
            ("suites", TEST_SUITES_INDEX, suites_query),
            ("cases", TEST_CASES_INDEX, cases_query),
        ])
        .await?;
    let empty = Value::Null;
    let suites_response = responses.get("suites").unwrap_or(&empty);
    let cases_response = responses.get("cases").unwrap_or(&empty);

    let mut suites = Vec::new();
    for bucket in buckets(suites_response, "suites")? {
        let passed = metric(bucket, "passed")? as u64;
        let failed = metric(bucket, "failed")? as u64;
        let skipped = metric(bucket, "skipped")? as u64;
        suites.push(json!({
            "name": bucket_key(bucket),
            "total": passed + failed + skipped,
            "failureRate": failure_rate_bar(passed, failed, skipped),
            "avgDuration": millis_to_seconds(metric(bucket, "avg_duration")?),
        }));
    }

    let mut failing_cases = Vec::new();
    for bucket in buckets(cases_response, "failing_cases")? {
        let suite = sub_buckets(bucket, "suite")?
            .first()
            .map(bucket_key)
            .unwrap_or_default();
        failing_cases.push(json!({
            "name": bucket_key(bucket),
            "suite": suite,
            "failures": doc_count(bucket),
        }));
    }

    Ok(json!({ "suites": suites, "failingCases": failing_cases }))
}
