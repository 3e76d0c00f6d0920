//! # Service Error Types
//!
//! Unified error taxonomy for request handling: parameter validation, file
//! staging and external tool execution. The web layer maps each variant to an
//! HTTP status; none of them are retried.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::SchemaError;

/// Service operation result type
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised while turning a request into a tool run.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to stage file '{}': {source}", path.display())]
    FileStaging {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{program}' did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable machine-readable code used in JSON error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidParameter { .. } => "invalid_parameter",
            ServiceError::UnknownParameter(_) => "unknown_parameter",
            ServiceError::MissingParameter(_) => "missing_parameter",
            ServiceError::UnknownTool(_) => "unknown_tool",
            ServiceError::FileStaging { .. } => "file_staging_failed",
            ServiceError::Spawn { .. } => "spawn_failed",
            ServiceError::NonZeroExit { .. } => "tool_failed",
            ServiceError::Timeout { .. } => "tool_timeout",
            ServiceError::Schema(_) => "schema_error",
            ServiceError::Config(_) => "config_error",
            ServiceError::Io(_) => "io_error",
        }
    }

    /// True when the request itself was at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidParameter { .. }
                | ServiceError::UnknownParameter(_)
                | ServiceError::MissingParameter(_)
                | ServiceError::UnknownTool(_)
        )
    }
}
