//! Response rendering and error mapping.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use rsat_shared::params::{RequestParams, PLAIN_TEXT};
use rsat_shared::ServiceError;

use crate::tools::Invocation;

/// Negotiated representation of a tool response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    PlainText,
}

impl ResponseFormat {
    /// Plain text when the `content-type` parameter asks for it, when `Accept`
    /// starts with `text/plain`, or (only if `honor_content_type` is set,
    /// i.e. for bodiless GET requests) when the `Content-Type` header is
    /// `text/plain`.
    pub fn negotiate(params: &RequestParams, headers: &HeaderMap, honor_content_type: bool) -> Self {
        let header_is_plain = |value: Option<&HeaderValue>| {
            value
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.trim().to_ascii_lowercase().starts_with(PLAIN_TEXT))
        };

        if params.wants_plain_text()
            || header_is_plain(headers.get(ACCEPT))
            || (honor_content_type && header_is_plain(headers.get(CONTENT_TYPE)))
        {
            ResponseFormat::PlainText
        } else {
            ResponseFormat::Json
        }
    }
}

/// Render a successful invocation.
pub fn render(invocation: Invocation, format: ResponseFormat) -> Response {
    match format {
        ResponseFormat::PlainText => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            invocation.text_body(),
        )
            .into_response(),
        ResponseFormat::Json => (StatusCode::OK, Json(invocation)).into_response(),
    }
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    /// The body could not be read or parsed.
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(message: impl std::fmt::Display) -> Self {
        Self::BadRequest(message.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(err) => status_for(err),
        }
    }

    /// True when the caller sent a request that can never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        match self {
            ApiError::BadRequest(_) => true,
            ApiError::Service(err) => err.is_client_error(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

/// HTTP status for each service error kind.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidParameter { .. }
        | ServiceError::UnknownParameter(_)
        | ServiceError::MissingParameter(_) => StatusCode::BAD_REQUEST,
        ServiceError::UnknownTool(_) => StatusCode::NOT_FOUND,
        ServiceError::NonZeroExit { .. } => StatusCode::BAD_GATEWAY,
        ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::FileStaging { .. }
        | ServiceError::Spawn { .. }
        | ServiceError::Schema(_)
        | ServiceError::Config(_)
        | ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::BadRequest(message) => ("bad_request", message.clone()),
            ApiError::Service(err) => (err.error_code(), err.to_string()),
        };

        if self.is_client_error() {
            warn!(status = status.as_u16(), error = code, %message, "Request rejected");
        } else {
            error!(status = status.as_u16(), error = code, %message, "Request failed");
        }

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
