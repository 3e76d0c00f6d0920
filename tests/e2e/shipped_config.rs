//! The configuration and schemas shipped in `config/`.

use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;

use rsat_rest::rsat_server::ToolRegistry;
use rsat_rest::rsat_shared::config::{ExecutionMode, ServiceConfig};
use rsat_rest::rsat_shared::execution::ProcessExecutor;

use crate::common::{get, E2eApp, SHIPPED_CONFIG};

#[test]
fn test_shipped_config_registers_every_tool() {
    let config = ServiceConfig::load_file(Path::new(SHIPPED_CONFIG)).unwrap();
    let registry = ToolRegistry::from_config(&config, Arc::new(ProcessExecutor)).unwrap();
    assert_eq!(registry.len(), 2);

    let fetch = registry.get("fetch-sequences").unwrap();
    assert_eq!(fetch.config().mode, ExecutionMode::Sync);
    assert_eq!(fetch.config().output_extension(), "fasta");
    assert!(fetch.schema().get("genome").unwrap().required);

    let quality = registry.get("matrix-quality").unwrap();
    assert_eq!(quality.config().mode, ExecutionMode::Background);
    assert_eq!(quality.config().output_flag.as_deref(), Some("o"));
    assert_eq!(quality.schema().rules.len(), 3);
}

#[tokio::test]
async fn test_tools_listing() {
    let app = E2eApp::with_program("echo");
    let (status, body) = app.send(get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    let names: Vec<&str> = json["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["fetch-sequences", "matrix-quality"]);
}
