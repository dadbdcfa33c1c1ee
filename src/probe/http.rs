//! HTTP release index probe.

use super::VersionProbe;
use crate::error::{EngineError, Result};

use async_trait::async_trait;
use std::time::Duration;

pub struct HttpVersionProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpVersionProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl VersionProbe for HttpVersionProbe {
    async fn fetch_index(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Transport(format!("{} timed out after {:?}", url, self.timeout))
            } else {
                EngineError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Transport(format!("{} returned {}", url, status)));
        }
        Ok(response.text().await?)
    }
}
