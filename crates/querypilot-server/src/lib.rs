//! HTTP API and streaming assistant server for querypilot.
//!
//! This crate exposes the SQL assistant over HTTP: a server-sent-events chat
//! endpoint driven by the agent loop, a synchronous execute endpoint for
//! approved queries, and the supporting status, approval, key check and
//! query generation endpoints.
//!
//! # Example
//!
//! ```ignore
//! use querypilot_server::{AppState, DataSourceRegistry, Server, ServerConfig};
//!
//! let state = AppState::new(settings, ServerConfig::new(), DataSourceRegistry::from_config(&sources)?);
//! Server::from_state(state).run().await?;
//! ```

pub mod approvals;
pub mod config;
pub mod error;
pub mod keycheck;
pub mod routes;
pub mod sources;
pub mod state;

pub use approvals::ApprovalStore;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use keycheck::{KeyCheck, check_api_key};
pub use sources::{
    DataSource, DataSourceRegistry, DataSourceSummary, SCHEMA_UNAVAILABLE, SqliteRunner,
    load_schema_file,
};
pub use state::{AppState, BackendFactory};

use std::net::SocketAddr;

use axum::Router;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The querypilot HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = self.cors_layer() {
            router = router.layer(cors);
        }

        router.with_state(self.state.clone())
    }

    /// API routes (v1).
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route("/data_sources", get(routes::list_data_sources_handler))
            // Assistant endpoints
            .route("/assistant/status", get(routes::status_handler))
            .route("/assistant/chat", post(routes::chat_handler))
            .route("/assistant/execute", post(routes::execute_handler))
            .route("/assistant/approvals", post(routes::approvals_handler))
            .route("/assistant/test-key", post(routes::test_key_handler))
            // One-shot generation
            .route("/query/generate", post(routes::generate_handler))
    }

    /// CORS for the configured origins; `None` when there are none.
    fn cors_layer(&self) -> Option<CorsLayer> {
        let origins = &self.state.config.cors_origins;
        if origins.is_empty() {
            return None;
        }

        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if origins.iter().any(|o| o == "*") {
            return Some(layer.allow_origin(Any));
        }

        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        Some(layer.allow_origin(AllowOrigin::list(parsed)))
    }

    /// Run the server on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();

        info!(
            data_sources = self.state.data_sources.len(),
            assistant_enabled = self.state.settings.enabled,
            "Starting server on {}",
            addr
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, get, test_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let (state, _) = test_state("", vec![]);

        let response = get(state, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_data_sources() {
        let (state, _) = test_state("", vec![]);

        let response = get(state, "/api/v1/data_sources").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let sources = body["data_sources"].as_array().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0]["id"], "shop");
        assert_eq!(sources[0]["type"], "sqlite");
        assert_eq!(sources[0]["schema_available"], true);
        assert_eq!(sources[1]["schema_available"], false);
    }

    #[tokio::test]
    async fn test_cors_for_configured_origin() {
        let (state, _) = test_state("", vec![]);
        let mut state = state;
        state.config = std::sync::Arc::new(
            ServerConfig::new().with_cors_origins(vec!["http://localhost:3000".to_string()]),
        );

        let response = Server::from_state(state)
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_no_cors_by_default() {
        let (state, _) = test_state("", vec![]);

        let response = Server::from_state(state)
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[test]
    fn test_bind_address() {
        let (state, _) = test_state("", vec![]);
        assert_eq!(Server::from_state(state).bind_address().port(), 5050);
    }
}
