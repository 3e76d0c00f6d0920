//! Helpers for end-to-end tests.
//!
// Not every test target uses every helper.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use rsat_rest::rsat_server::{router, AppState, ToolRegistry};
use rsat_rest::rsat_shared::config::ServiceConfig;
use rsat_rest::rsat_shared::execution::ProcessExecutor;

pub const SHIPPED_CONFIG: &str = "config/rsat-rest.toml";

/// The shipped configuration with every tool replaced by `program` and the
/// result tree moved into a temporary directory.
#[derive(Debug)]
pub struct E2eApp {
    pub results: TempDir,
    pub config: ServiceConfig,
    pub app: Router,
}

impl E2eApp {
    pub fn with_program(program: &str) -> Self {
        let results = tempfile::tempdir().expect("create result root");
        let mut config =
            ServiceConfig::load_file(Path::new(SHIPPED_CONFIG)).expect("load shipped config");
        config.storage.tmp_root = results.path().to_path_buf();
        config.background_models.data_dir = PathBuf::from("/data");
        for tool in &mut config.tools {
            tool.program = program.to_string();
        }

        let registry = ToolRegistry::from_config(&config, Arc::new(ProcessExecutor))
            .expect("register shipped tools");
        let app = router(AppState::new(registry, config.clone()));
        Self {
            results,
            config,
            app,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.expect("route request");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

/// Map a result URL back to its file under the result root.
pub fn result_file(app: &E2eApp, result_url: &str) -> PathBuf {
    let prefix = app.config.results_base_url();
    let relative = result_url
        .strip_prefix(&prefix)
        .expect("result URL under the results base URL")
        .trim_start_matches('/');
    app.results.path().join(relative)
}

/// Poll until `path` exists and `done` accepts its content.
pub async fn wait_for_file(path: &Path, done: impl Fn(&str) -> bool) -> Option<String> {
    for _ in 0..50 {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            if done(&content) {
                return Some(content);
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}
