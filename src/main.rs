//! insightboard - dashboard widget engine
//!
//! Turns widget requests into document-store queries and shapes the
//! aggregations into the payloads the dashboard renders.

mod config;
mod error;
mod probe;
mod query;
mod resources;
mod search;
mod stream;
mod web;
mod widgets;

#[cfg(test)]
mod testing;

use config::ServerConfig;
use probe::HttpVersionProbe;
use resources::{HttpServiceDirectory, ResourceTree};
use search::HttpDocumentStore;
use web::Server;
use widgets::Engine;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = ServerConfig::load();

    // Initialize logging; RUST_LOG wins over the configured level.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cfg.logging_level))?,
        )
        .init();

    tracing::info!("Starting insightboard on port {}...", cfg.http_port);
    tracing::info!("Using document store at {}", cfg.search_url);

    let store = HttpDocumentStore::new(
        &cfg.search_url,
        cfg.search_username.clone(),
        cfg.search_password.clone(),
        cfg.request_timeout,
    )?;
    let directory = HttpServiceDirectory::new(&cfg.rpc_url, cfg.request_timeout)?;
    let versions = HttpVersionProbe::new(cfg.request_timeout)?;

    let tree = match &cfg.resources_path {
        Some(path) => ResourceTree::load_json(path)?,
        None => ResourceTree::default(),
    };
    if tree.is_empty() {
        tracing::warn!("Resource hierarchy is empty; branch and automation scoping will match nothing");
    }

    let engine = Engine::new(Arc::new(store), Arc::new(directory), Arc::new(tree), Arc::new(versions));

    let server = Server::new(cfg, engine);
    server.start().await?;

    Ok(())
}
