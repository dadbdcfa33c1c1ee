//! Organizational resources: services, endpoints, controllers and the
//! branch/automation tree.

mod rpc;
mod tree;

pub use rpc::*;
pub use tree::*;

use crate::error::Result;
use crate::query::{compose, BranchClause, ComponentFilter, ParamBag, Scope, TemplateId};
use crate::search::{bucket_key, buckets, cancelable, SearchTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

pub const RESOURCE_TYPE_COMPONENT: &str = "COMPONENT";
pub const RESOURCE_TYPE_BRANCH: &str = "BRANCH";
pub const RESOURCE_TYPE_AUTOMATION: &str = "AUTOMATION";

/// Contribution id of CloudBees CI controller endpoints.
pub const CBCI_CONTRIBUTION_ID: &str = "cb.platform.cbci-endpoint";

pub const PROPERTY_CJOC_ID: &str = "cjocId";
pub const PROPERTY_TOOL_URL: &str = "tool_url";
pub const PROPERTY_STATUS: &str = "status";

pub const CONTROLLER_NOT_INSTALLED: &str = "NOT_INSTALLED";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub repository_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Property {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub contribution_id: String,
    pub resource_id: String,
    pub properties: Vec<Property>,
}

impl Endpoint {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// A node of the organizational resource tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<Value>,
    pub is_disabled: bool,
}

/// A controller attached to an operations center.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerInfo {
    pub name: String,
    pub tool_id: String,
    pub status: String,
    #[serde(skip)]
    pub url: String,
    pub total_jobs: u64,
    pub total_runs: u64,
    pub failed_runs: u64,
    pub last_active: String,
    pub last_updated_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<u64>,
}

/// Controllers under the requested CI tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSet {
    pub total: usize,
    pub connected: usize,
    pub controllers: BTreeMap<String, ControllerInfo>,
}

/// Organizational service and endpoint metadata.
#[async_trait]
pub trait ServiceDirectory: Send + Sync + 'static {
    async fn list_services(&self, sub_org_id: &str) -> Result<Vec<Service>>;
    async fn list_endpoints(
        &self,
        sub_org_id: &str,
        contribution_ids: &[String],
        parents_only: bool,
    ) -> Result<Vec<Endpoint>>;
}

/// Read access to the in-memory resource tree. Lookups never fail; a miss
/// is an empty answer.
pub trait ResourceCache: Send + Sync + 'static {
    fn resource(&self, id: &str) -> Option<Resource>;
    fn children(&self, parent_id: &str) -> Vec<Resource>;
}

/// How a branch parameter is resolved before injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMode {
    /// The parameter is a branch name; scope by the automations on it.
    Automations,
    /// The parameter is a branch id; scope by its name.
    Name,
}

fn normalize_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

/// Resolves organizational resources for one request.
#[derive(Clone)]
pub struct ResourceResolver {
    directory: Arc<dyn ServiceDirectory>,
    cache: Arc<dyn ResourceCache>,
    transport: SearchTransport,
}

impl ResourceResolver {
    pub fn new(directory: Arc<dyn ServiceDirectory>, cache: Arc<dyn ResourceCache>, transport: SearchTransport) -> Self {
        Self {
            directory,
            cache,
            transport,
        }
    }

    pub async fn list_services(&self, sub_org_id: &str) -> Result<Vec<Service>> {
        tracing::debug!("Listing services of {}", sub_org_id);
        cancelable(
            self.transport.cancel_token(),
            self.directory.list_services(sub_org_id),
        )
        .await
    }

    pub async fn list_endpoints(
        &self,
        sub_org_id: &str,
        contribution_ids: &[String],
        parents_only: bool,
    ) -> Result<Vec<Endpoint>> {
        tracing::debug!("Listing endpoints of {}", sub_org_id);
        cancelable(
            self.transport.cancel_token(),
            self.directory
                .list_endpoints(sub_org_id, contribution_ids, parents_only),
        )
        .await
    }

    fn children_of_type(&self, parent_id: &str, resource_type: &str) -> Vec<Resource> {
        self.cache
            .children(parent_id)
            .into_iter()
            .filter(|r| r.resource_type == resource_type && !r.is_disabled)
            .collect()
    }

    pub fn automations_for_branch(&self, branch_id: &str) -> Vec<String> {
        self.children_of_type(branch_id, RESOURCE_TYPE_AUTOMATION)
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    pub fn resource_name(&self, id: &str) -> Option<String> {
        self.cache.resource(id).map(|r| r.name)
    }

    pub fn branch_name_for_id(&self, branch_id: &str) -> Option<String> {
        self.cache
            .resource(branch_id)
            .filter(|r| r.resource_type == RESOURCE_TYPE_BRANCH)
            .map(|r| r.name)
    }

    /// Automations reachable from the organization's components, optionally
    /// narrowed to one branch name.
    pub fn automation_map(&self, org_id: &str, components: &ComponentFilter, branch_name: Option<&str>) -> BTreeSet<String> {
        let mut automations = BTreeSet::new();
        for component in self.children_of_type(org_id, RESOURCE_TYPE_COMPONENT) {
            if !components.contains(&component.id) {
                continue;
            }
            for branch in self.children_of_type(&component.id, RESOURCE_TYPE_BRANCH) {
                if branch_name.is_some_and(|name| name != branch.name) {
                    continue;
                }
                automations.extend(self.automations_for_branch(&branch.id));
            }
        }
        automations
    }

    /// Resolve the branch parameter into its injection clause. A branch the
    /// cache does not know narrows the scope to nothing.
    pub fn branch_scope(&self, params: &ParamBag, mode: BranchMode) -> Option<BranchClause> {
        let branch = params.branch.as_deref().filter(|b| !b.is_empty())?;
        let clause = match mode {
            BranchMode::Automations => {
                let org = params.scope_org().unwrap_or_default();
                let ids = self.automation_map(org, &params.component, Some(branch));
                BranchClause::Automations(ids.into_iter().collect())
            }
            BranchMode::Name => match self.branch_name_for_id(branch) {
                Some(name) => BranchClause::Name(name),
                None => {
                    tracing::debug!("Branch {} not in resource cache, narrowing scope", branch);
                    BranchClause::Automations(Vec::new())
                }
            },
        };
        Some(clause)
    }

    /// Controller URLs seen in telemetry for an operations center.
    pub async fn controller_urls_by_endpoint(&self, params: &ParamBag) -> Result<Vec<String>> {
        let query = compose(TemplateId::CiControllerUrls, params, &Scope::default())?;
        let response = self
            .transport
            .search(&query, TemplateId::CiControllerUrls.index())
            .await?;
        Ok(buckets(&response, "controller_urls")?
            .iter()
            .map(bucket_key)
            .collect())
    }

    /// Resolve the controllers behind the requested CI tool and point
    /// `params.endpoint_ids` at them.
    ///
    /// For an operations center this lists its CBCI endpoints, keeps those
    /// whose URL shows up in telemetry and returns them keyed by tool id.
    /// Any other tool is its own single endpoint.
    pub async fn update_replacements_and_get_controllers(&self, params: &mut ParamBag) -> Result<ControllerSet> {
        let tool_id = params.ci_tool_id.clone().unwrap_or_default();
        if !params.is_cjoc() {
            params.endpoint_ids = vec![tool_id];
            return Ok(ControllerSet {
                total: 1,
                connected: 1,
                controllers: BTreeMap::new(),
            });
        }

        let org = params.scope_org().unwrap_or_default().to_string();
        let endpoints = self
            .list_endpoints(&org, &[CBCI_CONTRIBUTION_ID.to_string()], false)
            .await?;
        let members: Vec<Endpoint> = endpoints
            .into_iter()
            .filter(|e| e.property(PROPERTY_CJOC_ID) == Some(tool_id.as_str()))
            .collect();

        let observed: HashSet<String> = self
            .controller_urls_by_endpoint(params)
            .await?
            .iter()
            .map(|u| normalize_url(u).to_string())
            .collect();

        let mut controllers = BTreeMap::new();
        for endpoint in &members {
            let url = normalize_url(endpoint.property(PROPERTY_TOOL_URL).unwrap_or_default());
            if url.is_empty() || !observed.contains(url) {
                continue;
            }
            controllers.insert(
                endpoint.id.clone(),
                ControllerInfo {
                    name: endpoint.name.clone(),
                    tool_id: endpoint.id.clone(),
                    status: endpoint
                        .property(PROPERTY_STATUS)
                        .unwrap_or(CONTROLLER_NOT_INSTALLED)
                        .to_string(),
                    url: url.to_string(),
                    ..Default::default()
                },
            );
        }

        tracing::debug!(
            "CJOC {}: {} controllers, {} connected",
            tool_id,
            members.len(),
            controllers.len()
        );
        params.endpoint_ids = controllers.keys().cloned().collect();

        Ok(ControllerSet {
            total: members.len(),
            connected: controllers.len(),
            controllers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::CiToolType;
    use crate::testing::{cjoc_endpoints, sample_tree, FakeDirectory, FakeStore};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn resolver(store: FakeStore) -> ResourceResolver {
        let transport = SearchTransport::new(Arc::new(store), CancellationToken::new());
        ResourceResolver::new(
            Arc::new(FakeDirectory::new(vec![], cjoc_endpoints())),
            Arc::new(sample_tree()),
            transport,
        )
    }

    #[test]
    fn test_automation_map_and_branches() {
        let r = resolver(FakeStore::new());
        let all = r.automation_map("org1", &ComponentFilter::All, None);
        assert_eq!(all.into_iter().collect::<Vec<_>>(), vec!["auto1", "auto2", "auto3"]);

        let main = r.automation_map("org1", &ComponentFilter::All, Some("main"));
        assert_eq!(main.into_iter().collect::<Vec<_>>(), vec!["auto1", "auto3"]);

        let only = r.automation_map("org1", &ComponentFilter::Only(vec!["comp2".to_string()]), None);
        assert_eq!(only.into_iter().collect::<Vec<_>>(), vec!["auto3"]);

        assert_eq!(r.automations_for_branch("branch1"), vec!["auto1"]);
        assert_eq!(r.branch_name_for_id("branch2").as_deref(), Some("feature"));
        assert!(r.branch_name_for_id("missing").is_none());
        assert!(r.automations_for_branch("missing").is_empty());
    }

    #[test]
    fn test_branch_scope() {
        let r = resolver(FakeStore::new());
        let params = ParamBag {
            org_id: Some("org1".to_string()),
            branch: Some("main".to_string()),
            ..Default::default()
        };
        assert_eq!(
            r.branch_scope(&params, BranchMode::Automations),
            Some(BranchClause::Automations(vec!["auto1".to_string(), "auto3".to_string()]))
        );

        let params = ParamBag {
            branch: Some("branch2".to_string()),
            ..params
        };
        assert_eq!(
            r.branch_scope(&params, BranchMode::Name),
            Some(BranchClause::Name("feature".to_string()))
        );
        assert!(r.branch_scope(&ParamBag::default(), BranchMode::Name).is_none());
    }

    #[tokio::test]
    async fn test_cjoc_controllers_are_intersected() {
        let store = FakeStore::new().on_search(
            "cb_ci_cjoc_controller_info",
            Some("controller_urls"),
            json!({"aggregations": {"controller_urls": {"buckets": [
                {"key": "https://c1.example.com/", "doc_count": 3},
                {"key": "https://c2.example.com", "doc_count": 1}
            ]}}}),
        );
        let r = resolver(store);
        let mut params = ParamBag {
            sub_org_id: Some("org1".to_string()),
            ci_tool_id: Some("cjoc1".to_string()),
            ci_tool_type: Some(CiToolType::Cjoc),
            ..Default::default()
        };

        let set = r.update_replacements_and_get_controllers(&mut params).await.unwrap();
        assert_eq!(set.total, 3);
        assert_eq!(set.connected, 2);
        assert_eq!(params.endpoint_ids, vec!["ctrl1", "ctrl2"]);
        assert_eq!(set.controllers["ctrl1"].status, "INSTALLED");
        assert_eq!(set.controllers["ctrl2"].status, CONTROLLER_NOT_INSTALLED);
    }

    #[tokio::test]
    async fn test_single_controller_replacement() {
        let r = resolver(FakeStore::new());
        let mut params = ParamBag {
            ci_tool_id: Some("jenkins1".to_string()),
            ci_tool_type: Some(CiToolType::Jenkins),
            endpoint_ids: vec!["stale".to_string()],
            ..Default::default()
        };
        let set = r.update_replacements_and_get_controllers(&mut params).await.unwrap();
        assert_eq!(params.endpoint_ids, vec!["jenkins1"]);
        assert!(set.controllers.is_empty());
    }
}
