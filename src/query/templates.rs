//! Static catalog of query templates.
//!
//! Templates are embedded at compile time and parsed once, on first use.
//! Each one is checked when loaded: it must be a JSON object with a
//! `query.bool` object, and every `{{name}}` marker must name a known
//! parameter.

use super::*;
use crate::error::{EngineError, Result};

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Symbolic names of every template in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    DeployedEnvironments,
    BuiltComponents,
    BuildActivityByComponent,
    DeployActivityByComponent,
    SecurityScanComponents,
    RawScanComponents,
    AutomationRunsByComponent,
    DefaultBranchCommits,
    DefaultBranchAutomations,
    CodeQualityReports,
    CodeQualityIssues,
    TestSuitesOverview,
    TestCaseFailures,
    CiCompletedRunsCount,
    CiCompletedRunsStatus,
    CiCompletedRunsFetch,
    CiJobs,
    CiExecutedJobIds,
    CiProjectActivity,
    CiProjectTypes,
    CiToolInsight,
    CiControllerUrls,
    CiControllerStatus,
    CiControllerJobs,
    CiControllerRuns,
    CiRunsActivityLatest,
    CiUsagePatterns,
}

impl TemplateId {
    pub const ALL: [TemplateId; 27] = [
        TemplateId::DeployedEnvironments,
        TemplateId::BuiltComponents,
        TemplateId::BuildActivityByComponent,
        TemplateId::DeployActivityByComponent,
        TemplateId::SecurityScanComponents,
        TemplateId::RawScanComponents,
        TemplateId::AutomationRunsByComponent,
        TemplateId::DefaultBranchCommits,
        TemplateId::DefaultBranchAutomations,
        TemplateId::CodeQualityReports,
        TemplateId::CodeQualityIssues,
        TemplateId::TestSuitesOverview,
        TemplateId::TestCaseFailures,
        TemplateId::CiCompletedRunsCount,
        TemplateId::CiCompletedRunsStatus,
        TemplateId::CiCompletedRunsFetch,
        TemplateId::CiJobs,
        TemplateId::CiExecutedJobIds,
        TemplateId::CiProjectActivity,
        TemplateId::CiProjectTypes,
        TemplateId::CiToolInsight,
        TemplateId::CiControllerUrls,
        TemplateId::CiControllerStatus,
        TemplateId::CiControllerJobs,
        TemplateId::CiControllerRuns,
        TemplateId::CiRunsActivityLatest,
        TemplateId::CiUsagePatterns,
    ];

    fn source(&self) -> &'static str {
        match self {
            TemplateId::DeployedEnvironments => include_str!("templates/deployed_environments.json"),
            TemplateId::BuiltComponents => include_str!("templates/built_components.json"),
            TemplateId::BuildActivityByComponent => {
                include_str!("templates/build_activity_by_component.json")
            }
            TemplateId::DeployActivityByComponent => {
                include_str!("templates/deploy_activity_by_component.json")
            }
            TemplateId::SecurityScanComponents => {
                include_str!("templates/security_scan_components.json")
            }
            TemplateId::RawScanComponents => include_str!("templates/raw_scan_components.json"),
            TemplateId::AutomationRunsByComponent => {
                include_str!("templates/automation_runs_by_component.json")
            }
            TemplateId::DefaultBranchCommits => include_str!("templates/default_branch_commits.json"),
            TemplateId::DefaultBranchAutomations => {
                include_str!("templates/default_branch_automations.json")
            }
            TemplateId::CodeQualityReports => include_str!("templates/code_quality_reports.json"),
            TemplateId::CodeQualityIssues => include_str!("templates/code_quality_issues.json"),
            TemplateId::TestSuitesOverview => include_str!("templates/test_suites_overview.json"),
            TemplateId::TestCaseFailures => include_str!("templates/test_case_failures.json"),
            TemplateId::CiCompletedRunsCount => include_str!("templates/ci_completed_runs_count.json"),
            TemplateId::CiCompletedRunsStatus => {
                include_str!("templates/ci_completed_runs_status.json")
            }
            TemplateId::CiCompletedRunsFetch => include_str!("templates/ci_completed_runs_fetch.json"),
            TemplateId::CiJobs => include_str!("templates/ci_jobs.json"),
            TemplateId::CiExecutedJobIds => include_str!("templates/ci_executed_job_ids.json"),
            TemplateId::CiProjectActivity => include_str!("templates/ci_project_activity.json"),
            TemplateId::CiProjectTypes => include_str!("templates/ci_project_types.json"),
            TemplateId::CiToolInsight => include_str!("templates/ci_tool_insight.json"),
            TemplateId::CiControllerUrls => include_str!("templates/ci_controller_urls.json"),
            TemplateId::CiControllerStatus => include_str!("templates/ci_controller_status.json"),
            TemplateId::CiControllerJobs => include_str!("templates/ci_controller_jobs.json"),
            TemplateId::CiControllerRuns => include_str!("templates/ci_controller_runs.json"),
            TemplateId::CiRunsActivityLatest => include_str!("templates/ci_runs_activity_latest.json"),
            TemplateId::CiUsagePatterns => include_str!("templates/ci_usage_patterns.json"),
        }
    }

    /// Index the template is issued against.
    pub fn index(&self) -> &'static str {
        match self {
            TemplateId::DeployedEnvironments | TemplateId::DeployActivityByComponent => {
                DEPLOY_EVENTS_INDEX
            }
            TemplateId::BuiltComponents | TemplateId::BuildActivityByComponent => BUILD_EVENTS_INDEX,
            TemplateId::SecurityScanComponents => SECURITY_SCAN_INDEX,
            TemplateId::RawScanComponents => RAW_SCAN_INDEX,
            TemplateId::AutomationRunsByComponent | TemplateId::DefaultBranchAutomations => {
                AUTOMATION_RUNS_INDEX
            }
            TemplateId::DefaultBranchCommits => COMMIT_EVENTS_INDEX,
            TemplateId::CodeQualityReports => CODE_QUALITY_REPORTS_INDEX,
            TemplateId::CodeQualityIssues => CODE_QUALITY_ISSUES_INDEX,
            TemplateId::TestSuitesOverview => TEST_SUITES_INDEX,
            TemplateId::TestCaseFailures => TEST_CASES_INDEX,
            TemplateId::CiCompletedRunsCount
            | TemplateId::CiCompletedRunsStatus
            | TemplateId::CiCompletedRunsFetch
            | TemplateId::CiExecutedJobIds
            | TemplateId::CiProjectActivity
            | TemplateId::CiControllerRuns => RUN_INFO_INDEX,
            TemplateId::CiJobs | TemplateId::CiProjectTypes | TemplateId::CiControllerJobs => {
                JOB_INFO_INDEX
            }
            TemplateId::CiToolInsight => TOOL_INSIGHT_INDEX,
            TemplateId::CiControllerUrls | TemplateId::CiControllerStatus => {
                CJOC_CONTROLLER_INFO_INDEX
            }
            TemplateId::CiRunsActivityLatest | TemplateId::CiUsagePatterns => RUNS_ACTIVITY_INDEX,
        }
    }
}

/// A parsed, schema-checked template.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub index: &'static str,
    pub body: Value,
    pub markers: Vec<ParamName>,
}

/// Why a template failed its load-time check.
#[derive(Debug, Clone)]
enum TemplateFault {
    UnknownMarker(String),
    Malformed(String),
}

impl From<&TemplateFault> for EngineError {
    fn from(fault: &TemplateFault) -> Self {
        match fault {
            TemplateFault::UnknownMarker(name) => EngineError::PlaceholderUnbound(name.clone()),
            TemplateFault::Malformed(msg) => EngineError::InvalidBoolQuery(msg.clone()),
        }
    }
}

pub(crate) fn marker_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z]+)\s*\}\}").unwrap())
}

fn load(id: TemplateId) -> Result<Template, TemplateFault> {
    let source = id.source();
    let body: Value = serde_json::from_str(source)
        .map_err(|e| TemplateFault::Malformed(format!("{:?}: {}", id, e)))?;

    if !body
        .get("query")
        .and_then(|q| q.get("bool"))
        .is_some_and(Value::is_object)
    {
        return Err(TemplateFault::Malformed(format!("{:?}: missing query.bool", id)));
    }

    let mut markers = Vec::new();
    for caps in marker_pattern().captures_iter(source) {
        let name = &caps[1];
        let param = ParamName::parse(name).ok_or_else(|| TemplateFault::UnknownMarker(name.to_string()))?;
        if !markers.contains(&param) {
            markers.push(param);
        }
    }

    Ok(Template {
        id,
        index: id.index(),
        body,
        markers,
    })
}

fn catalog() -> &'static HashMap<TemplateId, Result<Template, TemplateFault>> {
    static CATALOG: OnceLock<HashMap<TemplateId, Result<Template, TemplateFault>>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let catalog: HashMap<_, _> = TemplateId::ALL.iter().map(|id| (*id, load(*id))).collect();
        for (id, entry) in &catalog {
            if let Err(fault) = entry {
                tracing::error!("Query template {:?} failed its load check: {:?}", id, fault);
            }
        }
        catalog
    })
}

/// Fetch a template from the catalog.
pub fn template(id: TemplateId) -> Result<&'static Template> {
    match catalog().get(&id) {
        Some(Ok(t)) => Ok(t),
        Some(Err(fault)) => Err(fault.into()),
        None => Err(EngineError::InvalidBoolQuery(format!("{:?}: not in catalog", id))),
    }
}
