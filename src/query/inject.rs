//! Structural injection of bool clauses into bound queries.
//!
//! Clauses are built as a small typed AST and rendered to JSON only when
//! they are appended under `query.bool`. Injection never touches the text of
//! a query.

use super::params::ParamBag;
use crate::error::{EngineError, Result};

use serde_json::{json, Map, Value};

pub const FIELD_ORG_ID: &str = "org_id";
pub const FIELD_SUB_ORG_ID: &str = "sub_org_id";
pub const FIELD_COMPONENT_ID: &str = "component_id";
pub const FIELD_AUTOMATION_ID: &str = "automation_id";
pub const FIELD_BRANCH_NAME: &str = "branch_name";
pub const FIELD_ENDPOINT_ID: &str = "endpoint_id";
pub const FIELD_JOB_ID: &str = "job_id";

/// A leaf query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term { field: &'static str, value: String },
    Terms { field: &'static str, values: Vec<String> },
}

impl Clause {
    pub fn term(field: &'static str, value: impl Into<String>) -> Self {
        Clause::Term {
            field,
            value: value.into(),
        }
    }

    pub fn terms(field: &'static str, values: &[String]) -> Self {
        Clause::Terms {
            field,
            values: values.to_vec(),
        }
    }

    /// Leaf kind and field; at most one clause per key lives in a list.
    pub fn key(&self) -> (&'static str, &'static str) {
        match self {
            Clause::Term { field, .. } => ("term", field),
            Clause::Terms { field, .. } => ("terms", field),
        }
    }

    pub fn to_json(&self) -> Value {
        let (kind, field) = self.key();
        match self {
            Clause::Term { value, .. } => leaf(kind, field, json!(value)),
            Clause::Terms { values, .. } => leaf(kind, field, json!(values)),
        }
    }
}

/// Kind and field of a rendered single-field leaf clause.
fn rendered_key(clause: &Value) -> Option<(&str, &str)> {
    let outer = clause.as_object().filter(|o| o.len() == 1)?;
    let (kind, inner) = outer.iter().next()?;
    let inner = inner.as_object().filter(|i| i.len() == 1)?;
    let field = inner.keys().next()?;
    Some((kind.as_str(), field.as_str()))
}

fn leaf(kind: &str, field: &str, value: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), value);
    let mut outer = Map::new();
    outer.insert(kind.to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Occurrence list a clause is appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    MustNot,
    Filter,
}

impl Occur {
    fn key(&self) -> &'static str {
        match self {
            Occur::Must => "must",
            Occur::MustNot => "must_not",
            Occur::Filter => "filter",
        }
    }
}

/// Mutable view over the `query.bool` object of a bound query.
pub struct BoolQuery<'a> {
    node: &'a mut Map<String, Value>,
}

impl<'a> BoolQuery<'a> {
    /// Navigate to `query.bool`. Anything other than objects along the path
    /// is a malformed query.
    pub fn locate(doc: &'a mut Value) -> Result<Self> {
        let node = doc
            .get_mut("query")
            .and_then(Value::as_object_mut)
            .and_then(|q| q.get_mut("bool"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| EngineError::InvalidBoolQuery("missing query.bool object".to_string()))?;
        Ok(Self { node })
    }

    /// Append a clause, or replace the clause already present for the same
    /// kind and field. Returns whether the list changed.
    pub fn push(&mut self, occur: Occur, clause: &Clause) -> Result<bool> {
        let occur_key = occur.key();
        let slot = self.node.entry(occur_key).or_insert_with(|| Value::Array(Vec::new()));

        // A single clause object is a valid occurrence; normalise it to a list.
        if slot.is_object() {
            let single = slot.take();
            *slot = Value::Array(vec![single]);
        }

        let list = slot.as_array_mut().ok_or_else(|| {
            EngineError::InvalidBoolQuery(format!("bool.{} is neither a list nor a clause", occur_key))
        })?;

        let rendered = clause.to_json();
        let key = clause.key();
        match list.iter().position(|c| rendered_key(c) == Some(key)) {
            Some(i) if list[i] == rendered => Ok(false),
            Some(i) => {
                list[i] = rendered;
                Ok(true)
            }
            None => {
                list.push(rendered);
                Ok(true)
            }
        }
    }
}

/// How the branch parameter scopes a query once resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchClause {
    /// Branch name expanded to the automations running on it.
    Automations(Vec<String>),
    /// Branch id resolved to its name.
    Name(String),
}

/// Scoping clauses for one pipeline, derived from the parameter bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub org_id: Option<String>,
    pub sub_org_id: Option<String>,
    pub components: Option<Vec<String>>,
    pub branch: Option<BranchClause>,
    pub endpoint_ids: Vec<String>,
    pub job_ids: Vec<String>,
    /// Jobs the query is restricted to; empty means every job.
    pub only_job_ids: Vec<String>,
    pub parent_ids: Vec<String>,
}

impl Scope {
    /// Scope from the request. The branch stays unresolved; see
    /// [`Scope::with_branch`].
    pub fn from_params(params: &ParamBag) -> Self {
        Self {
            org_id: params.org_id.clone().filter(|s| !s.is_empty()),
            sub_org_id: params.sub_org_id.clone().filter(|s| !s.is_empty()),
            components: params.component.ids().map(<[String]>::to_vec),
            branch: None,
            endpoint_ids: params.endpoint_ids.clone(),
            job_ids: params.job_ids.clone(),
            only_job_ids: Vec::new(),
            parent_ids: params.parent_ids.clone(),
        }
    }

    /// Scope for CI telemetry: keyed by endpoint and job, never by
    /// organization or component.
    pub fn endpoints(params: &ParamBag) -> Self {
        Self {
            endpoint_ids: params.endpoint_ids.clone(),
            job_ids: params.job_ids.clone(),
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: Option<BranchClause>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_job_ids(mut self, job_ids: Vec<String>) -> Self {
        self.job_ids = job_ids;
        self
    }

    pub fn only_jobs(mut self, job_ids: Vec<String>) -> Self {
        self.only_job_ids = job_ids;
        self
    }

    pub fn must_clauses(&self) -> Vec<Clause> {
        let mut clauses = Vec::new();
        if let Some(org) = &self.org_id {
            clauses.push(Clause::term(FIELD_ORG_ID, org.as_str()));
        }
        if let Some(sub_org) = &self.sub_org_id {
            clauses.push(Clause::term(FIELD_SUB_ORG_ID, sub_org.as_str()));
        }
        if let Some(components) = &self.components {
            clauses.push(Clause::terms(FIELD_COMPONENT_ID, components));
        }
        match &self.branch {
            Some(BranchClause::Automations(ids)) => {
                clauses.push(Clause::terms(FIELD_AUTOMATION_ID, ids));
            }
            Some(BranchClause::Name(name)) => {
                clauses.push(Clause::term(FIELD_BRANCH_NAME, name.as_str()));
            }
            None => {}
        }
        if !self.endpoint_ids.is_empty() {
            clauses.push(Clause::terms(FIELD_ENDPOINT_ID, &self.endpoint_ids));
        }
        if !self.only_job_ids.is_empty() {
            clauses.push(Clause::terms(FIELD_JOB_ID, &self.only_job_ids));
        }
        clauses
    }

    pub fn must_not_clauses(&self) -> Vec<Clause> {
        if self.job_ids.is_empty() {
            return Vec::new();
        }
        vec![Clause::terms(FIELD_JOB_ID, &self.job_ids)]
    }

    pub fn filter_clauses(&self) -> Vec<Clause> {
        if self.parent_ids.is_empty() {
            return Vec::new();
        }
        vec![Clause::terms(FIELD_ORG_ID, &self.parent_ids)]
    }
}

fn inject(doc: &mut Value, occur: Occur, clauses: &[Clause]) -> Result<()> {
    if clauses.is_empty() {
        return Ok(());
    }
    let mut bool_query = BoolQuery::locate(doc)?;
    for clause in clauses {
        bool_query.push(occur, clause)?;
    }
    Ok(())
}

/// Append the scoping clauses (org, sub-org, components, branch, endpoints, jobs).
pub fn inject_must(doc: &mut Value, scope: &Scope) -> Result<()> {
    inject(doc, Occur::Must, &scope.must_clauses())
}

/// Append the exclusion clauses (job ids).
pub fn inject_must_not(doc: &mut Value, scope: &Scope) -> Result<()> {
    inject(doc, Occur::MustNot, &scope.must_not_clauses())
}

/// Append the filter clauses (parent org ids for drill-downs).
pub fn inject_filter(doc: &mut Value, scope: &Scope) -> Result<()> {
    inject(doc, Occur::Filter, &scope.filter_clauses())
}
