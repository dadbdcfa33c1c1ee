//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::widgets::Engine;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub engine: Engine,
}

/// Web front-end over the widget engine.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, engine: Engine) -> Self {
        Self {
            state: AppState { config, engine },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        Router::new()
            .route("/api/widgets/{widget_id}", post(handlers::handle_widget))
            .route("/api/widgets/{widget_id}/pages", post(handlers::handle_widget_page))
            .route(
                "/api/ci-insights/completed-runs/stream",
                post(handlers::handle_completed_runs_stream),
            )
            .route("/healthz", get(handlers::handle_healthz))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
