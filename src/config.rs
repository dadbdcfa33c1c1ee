//! Configuration module for insightboard.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Base URL of the document store (default: "http://localhost:9200")
    pub search_url: String,
    pub search_username: Option<String>,
    pub search_password: Option<String>,
    /// Base URL of the service directory RPC (default: "http://localhost:8081")
    pub rpc_url: String,
    /// Optional JSON snapshot of the resource hierarchy
    pub resources_path: Option<String>,
    /// Timeout applied to every outbound call (default: 30s)
    pub request_timeout: Duration,
    /// Log filter directive (default: "info")
    pub logging_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            search_url: "http://localhost:9200".to_string(),
            search_username: None,
            search_password: None,
            rpc_url: "http://localhost:8081".to_string(),
            resources_path: None,
            request_timeout: Duration::from_secs(30),
            logging_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `INSIGHTBOARD_HTTP_PORT`: HTTP port (default: 8080)
    /// - `INSIGHTBOARD_SEARCH_URL`: document store URL
    /// - `INSIGHTBOARD_SEARCH_USERNAME` / `INSIGHTBOARD_SEARCH_PASSWORD`: basic auth
    /// - `INSIGHTBOARD_RPC_URL`: service directory URL
    /// - `INSIGHTBOARD_RESOURCES_PATH`: resource snapshot file
    /// - `INSIGHTBOARD_REQUEST_TIMEOUT_SECS`: outbound timeout (default: 30)
    /// - `INSIGHTBOARD_LOGGING_LEVEL`: log level (default: "info")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port_str) = lookup("INSIGHTBOARD_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Some(url) = lookup("INSIGHTBOARD_SEARCH_URL") {
            cfg.search_url = url;
        }
        cfg.search_username = lookup("INSIGHTBOARD_SEARCH_USERNAME").filter(|s| !s.is_empty());
        cfg.search_password = lookup("INSIGHTBOARD_SEARCH_PASSWORD").filter(|s| !s.is_empty());

        if let Some(url) = lookup("INSIGHTBOARD_RPC_URL") {
            cfg.rpc_url = url;
        }
        cfg.resources_path = lookup("INSIGHTBOARD_RESOURCES_PATH").filter(|s| !s.is_empty());

        if let Some(secs) = lookup("INSIGHTBOARD_REQUEST_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => cfg.request_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!("Ignoring invalid request timeout {:?}", secs),
            }
        }

        if let Some(level) = lookup("INSIGHTBOARD_LOGGING_LEVEL") {
            cfg.logging_level = level;
        }

        cfg
    }
}
