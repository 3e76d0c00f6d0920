//! # HTTP Layer
//!
//! Axum router exposing one endpoint per configured tool:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | liveness probe |
//! | `GET /tools` | list configured tools |
//! | `GET /{tool}/schema` | parameter schema of one tool |
//! | `GET` or `POST /{tool}` (or `/{tool}/`) | run a tool |
//! | `GET /<tmp_url_path>/...` | result files, when `server.serve_results` is set |

pub mod extract;
pub mod handlers;
pub mod response;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use rsat_shared::config::ServiceConfig;

use crate::tools::ToolRegistry;

/// Shared, read-only state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(registry: ToolRegistry, config: ServiceConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// Largest accepted request body.
    pub fn body_limit(&self) -> usize {
        self.config.server.max_upload_bytes
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        .route("/{tool}/schema", get(handlers::describe_tool))
        .route("/{tool}", get(handlers::run_get).post(handlers::run_post))
        .route("/{tool}/", get(handlers::run_get).post(handlers::run_post));

    if state.config.server.serve_results {
        let storage = &state.config.storage;
        app = app.nest_service(
            storage.tmp_url_path.trim_end_matches('/'),
            ServeDir::new(&storage.tmp_root),
        );
    }

    app.layer(DefaultBodyLimit::max(state.body_limit()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
