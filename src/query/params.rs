//! The request parameter bag.
//!
//! Parameters arrive as a camelCase JSON object. Unknown keys are ignored;
//! every known key has a typed slot so lookups never fail deep inside a
//! query pipeline.

use crate::error::{EngineError, Result};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Sentinel meaning "no component filter".
pub const ALL_COMPONENTS: &str = "All";

/// Component selection: everything, or an ordered list of component ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComponentFilter {
    #[default]
    All,
    Only(Vec<String>),
}

impl ComponentFilter {
    /// Component ids to filter on, `None` when every component is selected.
    pub fn ids(&self) -> Option<&[String]> {
        match self {
            ComponentFilter::All => None,
            ComponentFilter::Only(ids) => Some(ids),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        match self {
            ComponentFilter::All => true,
            ComponentFilter::Only(ids) => ids.iter().any(|c| c == id),
        }
    }
}

impl<'de> Deserialize<'de> for ComponentFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        let ids = match Raw::deserialize(deserializer)? {
            Raw::One(s) => vec![s],
            Raw::Many(v) => v,
        };
        if ids.is_empty() || ids.iter().any(|c| c == ALL_COMPONENTS) {
            Ok(ComponentFilter::All)
        } else {
            Ok(ComponentFilter::Only(ids))
        }
    }
}

impl Serialize for ComponentFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ComponentFilter::All => vec![ALL_COMPONENTS].serialize(serializer),
            ComponentFilter::Only(ids) => ids.serialize(serializer),
        }
    }
}

/// Role of the CI tool a CI insights widget looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CiToolType {
    Cjoc,
    Cbci,
    Jenkins,
    Jaas,
}

impl CiToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiToolType::Cjoc => "CJOC",
            CiToolType::Cbci => "CBCI",
            CiToolType::Jenkins => "JENKINS",
            CiToolType::Jaas => "JAAS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewOption {
    ActiveRuns,
    IdleExecutors,
    WaitingRuns,
    WaitingTime,
    IdleTime,
}

impl ViewOption {
    pub const ALL: [ViewOption; 5] = [
        ViewOption::ActiveRuns,
        ViewOption::IdleExecutors,
        ViewOption::WaitingRuns,
        ViewOption::WaitingTime,
        ViewOption::IdleTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewOption::ActiveRuns => "ActiveRuns",
            ViewOption::IdleExecutors => "IdleExecutors",
            ViewOption::WaitingRuns => "WaitingRuns",
            ViewOption::WaitingTime => "WaitingTime",
            ViewOption::IdleTime => "IdleTime",
        }
    }

    /// Whether values for this option are durations in milliseconds.
    pub fn is_time(&self) -> bool {
        matches!(self, ViewOption::WaitingTime | ViewOption::IdleTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    #[default]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterType {
    #[serde(rename = "")]
    #[default]
    None,
    IdleFilter,
    FragileFilter,
}

/// Closed set of parameter names a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    OrgId,
    SubOrgId,
    StartDate,
    EndDate,
    Component,
    Branch,
    CiToolId,
    CiToolType,
    EndpointIds,
    ParentIds,
    JobIds,
    ViewOption,
    TimeFormat,
    TimeZone,
    FilterType,
}

impl ParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::OrgId => "orgId",
            ParamName::SubOrgId => "subOrgId",
            ParamName::StartDate => "startDate",
            ParamName::EndDate => "endDate",
            ParamName::Component => "component",
            ParamName::Branch => "branch",
            ParamName::CiToolId => "ciToolId",
            ParamName::CiToolType => "ciToolType",
            ParamName::EndpointIds => "endpointIds",
            ParamName::ParentIds => "parentIds",
            ParamName::JobIds => "jobIds",
            ParamName::ViewOption => "viewOption",
            ParamName::TimeFormat => "timeFormat",
            ParamName::TimeZone => "timeZone",
            ParamName::FilterType => "filterType",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "orgId" => ParamName::OrgId,
            "subOrgId" => ParamName::SubOrgId,
            "startDate" => ParamName::StartDate,
            "endDate" => ParamName::EndDate,
            "component" => ParamName::Component,
            "branch" => ParamName::Branch,
            "ciToolId" => ParamName::CiToolId,
            "ciToolType" => ParamName::CiToolType,
            "endpointIds" => ParamName::EndpointIds,
            "parentIds" => ParamName::ParentIds,
            "jobIds" => ParamName::JobIds,
            "viewOption" => ParamName::ViewOption,
            "timeFormat" => ParamName::TimeFormat,
            "timeZone" => ParamName::TimeZone,
            "filterType" => ParamName::FilterType,
            _ => return None,
        })
    }
}

/// A typed value ready to be rendered into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Str(String),
    List(Vec<String>),
}

impl Binding {
    pub fn to_json(&self) -> Value {
        match self {
            Binding::Str(s) => Value::String(s.clone()),
            Binding::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }

    /// Text used when a marker sits inside a longer string.
    pub fn to_text(&self) -> String {
        match self {
            Binding::Str(s) => s.clone(),
            Binding::List(_) => self.to_json().to_string(),
        }
    }
}

/// Parameters of a single widget request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamBag {
    pub org_id: Option<String>,
    pub sub_org_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub component: ComponentFilter,
    pub branch: Option<String>,
    pub ci_tool_id: Option<String>,
    pub ci_tool_type: Option<CiToolType>,
    pub endpoint_ids: Vec<String>,
    pub parent_ids: Vec<String>,
    pub job_ids: Vec<String>,
    pub view_option: Option<ViewOption>,
    pub time_format: Option<TimeFormat>,
    pub time_zone: Option<String>,
    pub filter_type: FilterType,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl ParamBag {
    /// Look up the binding for a parameter name. Lists are always bound
    /// (empty lists render as `[]`); scalars are bound only when present.
    pub fn lookup(&self, name: ParamName) -> Option<Binding> {
        let s = |v: &Option<String>| non_empty(v).map(|s| Binding::Str(s.to_string()));
        match name {
            ParamName::OrgId => s(&self.org_id),
            ParamName::SubOrgId => s(&self.sub_org_id),
            ParamName::StartDate => s(&self.start_date),
            ParamName::EndDate => s(&self.end_date),
            ParamName::Component => Some(Binding::List(match &self.component {
                ComponentFilter::All => vec![ALL_COMPONENTS.to_string()],
                ComponentFilter::Only(ids) => ids.clone(),
            })),
            ParamName::Branch => s(&self.branch),
            ParamName::CiToolId => s(&self.ci_tool_id),
            ParamName::CiToolType => self
                .ci_tool_type
                .map(|t| Binding::Str(t.as_str().to_string())),
            ParamName::EndpointIds => Some(Binding::List(self.endpoint_ids.clone())),
            ParamName::ParentIds => Some(Binding::List(self.parent_ids.clone())),
            ParamName::JobIds => Some(Binding::List(self.job_ids.clone())),
            ParamName::ViewOption => self
                .view_option
                .map(|v| Binding::Str(v.as_str().to_string())),
            ParamName::TimeFormat => self.time_format.map(|f| {
                Binding::Str(match f {
                    TimeFormat::TwelveHour => "12h".to_string(),
                    TimeFormat::TwentyFourHour => "24h".to_string(),
                })
            }),
            ParamName::TimeZone => s(&self.time_zone),
            ParamName::FilterType => Some(Binding::Str(
                match self.filter_type {
                    FilterType::None => "",
                    FilterType::IdleFilter => "IdleFilter",
                    FilterType::FragileFilter => "FragileFilter",
                }
                .to_string(),
            )),
        }
    }

    /// The organization used for directory lookups: the sub-org when set.
    pub fn scope_org(&self) -> Option<&str> {
        non_empty(&self.sub_org_id).or_else(|| non_empty(&self.org_id))
    }

    pub fn is_cjoc(&self) -> bool {
        self.ci_tool_type == Some(CiToolType::Cjoc)
    }

    /// Parse and order-check the request window.
    pub fn time_window(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let start = parse_param_time(non_empty(&self.start_date), "startDate")?;
        let end = parse_param_time(non_empty(&self.end_date), "endDate")?;
        if start > end {
            return Err(EngineError::InvalidParams(format!(
                "startDate {} is after endDate {}",
                start, end
            )));
        }
        Ok((start, end))
    }
}

fn parse_param_time(value: Option<&str>, name: &str) -> Result<NaiveDateTime> {
    let raw = value.ok_or_else(|| EngineError::InvalidParams(format!("{} is required", name)))?;
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| EngineError::InvalidParams(format!("{} is not a valid date: {}", name, raw)))
}
