//! Request handlers.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info};

use rsat_shared::config::ExecutionMode;
use rsat_shared::params::{RawValue, RequestParams};

use super::extract::body_params;
use super::response::{render, ApiError, ResponseFormat};
use super::AppState;
use crate::tools::ToolService;

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "tools": state.registry.len(),
    }))
}

/// List every configured tool and its endpoint.
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = state
        .registry
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.schema().description,
                "mode": tool.config().mode,
                "endpoint": format!("/{}/", tool.name()),
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

/// Parameter schema of one tool.
pub async fn describe_tool(
    State(state): State<AppState>,
    Path(tool): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let service = state.registry.get(&tool)?;
    let schema = service.schema();
    Ok(Json(json!({
        "tool": service.name(),
        "mode": service.config().mode,
        "description": schema.description,
        "parameters": schema.parameters,
        "rules": schema.rules,
    })))
}

/// Run a tool with parameters from the query string.
pub async fn run_get(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    headers: HeaderMap,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Response, ApiError> {
    let service = state.registry.get(&tool)?;
    let Query(pairs) = query.map_err(ApiError::bad_request)?;
    let raw = pairs
        .into_iter()
        .map(|(name, value)| (name, RawValue::Text(value)));

    let params = service.parse_params(raw)?;
    let format = ResponseFormat::negotiate(&params, &headers, true);
    run(&service, params, format).await
}

/// Run a tool with parameters from a JSON, url-encoded or multipart body.
pub async fn run_post(
    State(state): State<AppState>,
    Path(tool): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let service = state.registry.get(&tool)?;
    let headers = request.headers().clone();
    let raw = body_params(request, state.body_limit()).await?;

    let params = service.parse_params(raw)?;
    let format = ResponseFormat::negotiate(&params, &headers, false);
    run(&service, params, format).await
}

async fn run(
    service: &ToolService,
    params: RequestParams,
    format: ResponseFormat,
) -> Result<Response, ApiError> {
    let tool = service.name();
    debug!(tool, parameters = params.len(), ?format, "Dispatching tool request");

    let invocation = service.invoke(&params).await?;
    match service.config().mode {
        ExecutionMode::Sync => info!(tool, "Tool run completed"),
        ExecutionMode::Background => info!(tool, "Tool run submitted"),
    }
    Ok(render(invocation, format))
}
