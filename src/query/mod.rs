//! Query composition: template catalog, placeholder binding and clause injection.
//!
//! A pipeline always runs in the same order: look up a template, bind the
//! request parameters into it, then inject the scoping clauses.

mod binder;
mod inject;
mod params;
mod templates;

pub use binder::*;
pub use inject::*;
pub use params::*;
pub use templates::*;

use crate::error::Result;
use serde_json::Value;

// Index names.
pub const JOB_INFO_INDEX: &str = "cb_ci_job_info";
pub const RUN_INFO_INDEX: &str = "cb_ci_run_info";
pub const TOOL_INSIGHT_INDEX: &str = "cb_ci_tool_insight";
pub const CJOC_CONTROLLER_INFO_INDEX: &str = "cb_ci_cjoc_controller_info";
pub const RUNS_ACTIVITY_INDEX: &str = "cb_ci_runs_activity";
pub const TEST_SUITES_INDEX: &str = "cb_test_suites";
pub const TEST_CASES_INDEX: &str = "cb_test_cases";
pub const RAW_SCAN_INDEX: &str = "raw_scan_result";
pub const SECURITY_SCAN_INDEX: &str = "security_scan";
pub const DEPLOY_EVENTS_INDEX: &str = "deploy_events";
pub const BUILD_EVENTS_INDEX: &str = "build_events";
pub const AUTOMATION_RUNS_INDEX: &str = "automation_runs";
pub const COMMIT_EVENTS_INDEX: &str = "commit_events";
pub const CODE_QUALITY_REPORTS_INDEX: &str = "code_quality_reports";
pub const CODE_QUALITY_ISSUES_INDEX: &str = "code_quality_issues";

// Run result strings as stored by the CI telemetry.
pub const RESULT_SUCCESS: &str = "SUCCESS";
pub const RESULT_FAILURE: &str = "FAILURE";
pub const RESULT_UNSTABLE: &str = "UNSTABLE";
pub const RESULT_ABORTED: &str = "ABORTED";

// Automation run status strings.
pub const STATUS_SUCCEEDED: &str = "SUCCEEDED";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_SKIPPED: &str = "SKIPPED";
pub const STATUS_CANCELED: &str = "CANCELED";

/// Build the complete request body for one pipeline: bind, then inject.
pub fn compose(id: TemplateId, params: &ParamBag, scope: &Scope) -> Result<Value> {
    let template = template(id)?;
    let mut doc = bind(template, params)?;
    inject_must(&mut doc, scope)?;
    inject_must_not(&mut doc, scope)?;
    inject_filter(&mut doc, scope)?;
    tracing::debug!("Composed {:?} against {}", template.id, template.index);
    Ok(doc)
}
