//! # Service Configuration
//!
//! Layered configuration for the REST services. A TOML file provides the base
//! values and `RSAT_REST__SECTION__KEY` environment variables override them.
//!
//! The file is discovered in precedence order:
//! 1. An explicit path (the server's `--config` flag)
//! 2. `RSAT_REST_CONFIG_PATH`
//! 3. `config/rsat-rest.toml`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CONFIG_PATH_ENV: &str = "RSAT_REST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/rsat-rest.toml";
const ENV_PREFIX: &str = "RSAT_REST";
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading the service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: PathBuf,
        source: config::ConfigError,
    },
    #[error("configuration is invalid: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("configuration is invalid: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServiceConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,

    #[serde(default)]
    #[validate(nested)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    #[validate(nested)]
    pub background_models: BackgroundModelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    #[validate(nested)]
    pub tools: Vec<ToolConfig>,

    /// Directory relative schema paths are resolved against.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub bind_address: String,
    /// Externally visible base URL, used to build result links.
    #[validate(length(min = 1))]
    pub public_base_url: String,
    #[validate(range(min = 1024))]
    pub max_upload_bytes: usize,
    /// Serve the result tree under `storage.tmp_url_path`.
    pub serve_results: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            max_upload_bytes: 64 * 1024 * 1024,
            serve_results: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the per-request result directories.
    pub tmp_root: PathBuf,
    /// URL path under which `tmp_root` is published.
    #[validate(length(min = 1))]
    pub tmp_url_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tmp_root: std::env::temp_dir().join("rsat-rest"),
            tmp_url_path: "/results".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ExecutionConfig {
    #[validate(range(min = 1))]
    pub sync_timeout_seconds: u64,
    /// Background jobs run unbounded when unset.
    #[validate(range(min = 1))]
    pub background_timeout_seconds: Option<u64>,
}

impl ExecutionConfig {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }

    pub fn background_timeout(&self) -> Option<Duration> {
        self.background_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            sync_timeout_seconds: 300,
            background_timeout_seconds: None,
        }
    }
}

/// Location of the precomputed oligonucleotide background models.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct BackgroundModelConfig {
    pub data_dir: PathBuf,
    /// Supports `{data_dir}`, `{organism}` and `{length}` placeholders.
    #[validate(length(min = 1))]
    pub path_template: String,
    pub suffix: String,
}

impl Default for BackgroundModelConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/opt/rsat/public_html/data"),
            path_template: "{data_dir}/genomes/{organism}/oligo-frequencies/{length}nt_upstream-noorf_{organism}-ovlp-1str.freq".to_string(),
            suffix: ".gz".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// How a tool's process is run relative to the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Wait for the tool and return its output.
    #[default]
    Sync,
    /// Start the tool and return a link to its synthesis page.
    Background,
}

/// One wrapped command-line tool.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ToolConfig {
    /// Endpoint name, e.g. `fetch-sequences`.
    #[validate(length(min = 1))]
    pub name: String,
    /// Executable path or name resolved through `PATH`.
    #[validate(length(min = 1))]
    pub program: String,
    /// Parameter schema YAML file.
    pub schema: PathBuf,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Extension of the saved copy of synchronous output.
    #[serde(default)]
    pub output_extension: Option<String>,
    /// Flag receiving `<result_dir>/<tool>` as output prefix.
    #[serde(default)]
    pub output_flag: Option<String>,
    #[serde(default)]
    pub synthesis_page: Option<String>,
}

impl ToolConfig {
    pub fn output_extension(&self) -> &str {
        self.output_extension.as_deref().unwrap_or("txt")
    }

    pub fn synthesis_page(&self) -> String {
        self.synthesis_page
            .clone()
            .unwrap_or_else(|| format!("{}_synthesis.html", self.name))
    }
}

impl ServiceConfig {
    /// Load configuration using the documented discovery order.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_file(&path)
    }

    /// Load a TOML configuration file, layering environment overrides on top.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let built = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                source: e,
            })?;
        let mut config: ServiceConfig =
            built.try_deserialize().map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.check()?;
        tracing::debug!(?path, tools = config.tools.len(), "Loaded service config");
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layering).
    pub fn from_toml_str(contents: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let built = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::Load {
                path: PathBuf::from("<inline>"),
                source: e,
            })?;
        let mut config: ServiceConfig =
            built.try_deserialize().map_err(|e| ConfigError::Load {
                path: PathBuf::from("<inline>"),
                source: e,
            })?;
        config.config_dir = config_dir.to_path_buf();
        config.check()?;
        Ok(config)
    }

    /// Field validation plus cross-field checks on the tool list.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "tool '{}' is configured more than once",
                    tool.name
                )));
            }
            if tool.mode == ExecutionMode::Sync && tool.output_flag.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "tool '{}': output_flag is only used by background tools",
                    tool.name
                )));
            }
        }
        let url_path = &self.storage.tmp_url_path;
        if !url_path.starts_with('/') || url_path.trim_end_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "storage.tmp_url_path must start with '/' and name a sub-path".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a tool's schema path against the config directory.
    pub fn schema_path(&self, tool: &ToolConfig) -> PathBuf {
        if tool.schema.is_absolute() {
            tool.schema.clone()
        } else {
            self.config_dir.join(&tool.schema)
        }
    }

    /// Public URL prefix of the result tree, without trailing slash.
    pub fn results_base_url(&self) -> String {
        format!(
            "{}{}",
            self.server.public_base_url.trim_end_matches('/'),
            self.storage.tmp_url_path.trim_end_matches('/')
        )
    }
}
