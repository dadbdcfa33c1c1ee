//! In-memory resource tree.

use super::{Resource, ResourceCache};
use crate::error::Result;

use std::collections::HashMap;
use std::path::Path;

#[derive(Default)]
struct Snapshot {
    by_id: HashMap<String, Resource>,
    children: HashMap<String, Vec<String>>,
}

impl Snapshot {
    fn build(resources: Vec<Resource>) -> Self {
        let mut snapshot = Snapshot::default();
        for resource in resources {
            if let Some(parent) = &resource.parent_id {
                snapshot
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(resource.id.clone());
            }
            snapshot.by_id.insert(resource.id.clone(), resource);
        }
        snapshot
    }
}

/// Immutable snapshot of the organizational resource tree, loaded once at
/// startup.
#[derive(Default)]
pub struct ResourceTree {
    snapshot: Snapshot,
}

impl ResourceTree {
    pub fn from_resources(resources: Vec<Resource>) -> Self {
        Self {
            snapshot: Snapshot::build(resources),
        }
    }

    /// Load a JSON array of resources.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let resources: Vec<Resource> = serde_json::from_str(&text)?;
        tracing::info!(
            "Loaded {} resources from {}",
            resources.len(),
            path.as_ref().display()
        );
        Ok(Self::from_resources(resources))
    }

    pub fn len(&self) -> usize {
        self.snapshot.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceCache for ResourceTree {
    fn resource(&self, id: &str) -> Option<Resource> {
        self.snapshot.by_id.get(id).cloned()
    }

    fn children(&self, parent_id: &str) -> Vec<Resource> {
        let snapshot = &self.snapshot;
        snapshot
            .children
            .get(parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| snapshot.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn node(id: &str, parent: Option<&str>, kind: &str) -> Resource {
        Resource {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            name: id.to_string(),
            resource_type: kind.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let tree = ResourceTree::from_resources(vec![
            node("org", None, "ORG"),
            node("b", Some("org"), "COMPONENT"),
            node("a", Some("org"), "COMPONENT"),
        ]);
        let ids: Vec<_> = tree.children("org").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(tree.children("missing").is_empty());
        assert!(tree.resource("missing").is_none());
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "org1", "name": "Org", "type": "ORG"}},
                {{"id": "comp1", "parentId": "org1", "name": "api", "type": "COMPONENT", "isDisabled": false}}
            ]"#
        )
        .unwrap();

        let tree = ResourceTree::load_json(file.path()).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.children("org1")[0].name, "api");
    }

    #[test]
    fn test_load_json_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ResourceTree::load_json(dir.path().join("absent.json")).is_err());
    }
}
