//! JSON-over-HTTP client for the service directory.

use super::{Endpoint, Service, ServiceDirectory};
use crate::error::{EngineError, Result};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
struct ListServicesResponse {
    #[serde(default)]
    service: Vec<Service>,
}

#[derive(Debug, Default, Deserialize)]
struct ListEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

pub struct HttpServiceDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServiceDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!("{} returned {}", url, status)));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ServiceDirectory for HttpServiceDirectory {
    async fn list_services(&self, sub_org_id: &str) -> Result<Vec<Service>> {
        let response: ListServicesResponse = self
            .call("services/list", json!({ "subOrgId": sub_org_id }))
            .await?;
        Ok(response.service)
    }

    async fn list_endpoints(
        &self,
        sub_org_id: &str,
        contribution_ids: &[String],
        parents_only: bool,
    ) -> Result<Vec<Endpoint>> {
        let response: ListEndpointsResponse = self
            .call(
                "endpoints/list",
                json!({
                    "subOrgId": sub_org_id,
                    "contributionIds": contribution_ids,
                    "parentsOnly": parents_only,
                }),
            )
            .await?;
        Ok(response.endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_directory_responses() {
        let services: ListServicesResponse = serde_json::from_value(json!({
            "service": [{"id": "s1", "name": "api", "repositoryUrl": "https://git/api", "extra": 1}]
        }))
        .unwrap();
        assert_eq!(services.service[0].repository_url, "https://git/api");

        let endpoints: ListEndpointsResponse = serde_json::from_value(json!({
            "endpoints": [{
                "id": "e1",
                "name": "ctrl",
                "contributionId": "cb.platform.cbci-endpoint",
                "properties": [{"name": "tool_url", "value": "https://c1"}]
            }]
        }))
        .unwrap();
        assert_eq!(endpoints.endpoints[0].property("tool_url"), Some("https://c1"));

        let empty: ListEndpointsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let directory = HttpServiceDirectory::new("http://256.256.256.256", Duration::from_millis(100)).unwrap();
        assert!(directory.list_services("org").await.is_err());
    }
}
