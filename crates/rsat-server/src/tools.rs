//! # Tool Services
//!
//! A [`ToolService`] is one configured command-line tool: its configuration,
//! its parameter schema and everything needed to turn a request into a run.
//! The [`ToolRegistry`] holds all of them, built once at startup and shared
//! read-only by the handlers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use rsat_shared::command::{assemble_command, check_rules, BackgroundModelCatalog, OutputTarget};
use rsat_shared::config::{ExecutionConfig, ExecutionMode, ServiceConfig, ToolConfig};
use rsat_shared::execution::{BackgroundJob, CommandExecutor};
use rsat_shared::params::{RawValue, RequestParams};
use rsat_shared::schema::ParameterSchema;
use rsat_shared::staging::{stage_inputs, ResultDirFactory};
use rsat_shared::{ServiceError, ServiceResult};

/// Outcome of one tool request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Invocation {
    /// Synchronous run finished; `output` is the tool's stdout.
    Completed {
        tool: String,
        command: String,
        output: String,
        result_url: String,
    },
    /// Background run started; `result_url` points at its synthesis page.
    Submitted {
        tool: String,
        command: String,
        result_url: String,
    },
}

impl Invocation {
    /// Body of a plain-text response.
    pub fn text_body(&self) -> String {
        match self {
            Invocation::Completed { output, .. } => output.clone(),
            Invocation::Submitted { result_url, .. } => format!("{result_url}\n"),
        }
    }
}

/// One wrapped tool, ready to serve requests.
#[derive(Debug)]
pub struct ToolService {
    config: ToolConfig,
    schema: ParameterSchema,
    results: ResultDirFactory,
    results_base_url: String,
    background_models: BackgroundModelCatalog,
    execution: ExecutionConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl ToolService {
    pub fn new(
        service_config: &ServiceConfig,
        config: ToolConfig,
        schema: ParameterSchema,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            config,
            schema,
            results: ResultDirFactory::new(&service_config.storage.tmp_root),
            results_base_url: service_config.results_base_url(),
            background_models: BackgroundModelCatalog::new(
                service_config.background_models.clone(),
            ),
            execution: service_config.execution.clone(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Check raw request values against this tool's schema.
    pub fn parse_params<I>(&self, raw: I) -> ServiceResult<RequestParams>
    where
        I: IntoIterator<Item = (String, RawValue)>,
    {
        RequestParams::from_raw(&self.schema, raw)
    }

    /// Stage inputs, assemble the command and run it in a fresh result directory.
    #[instrument(skip_all, fields(tool = %self.config.name))]
    pub async fn invoke(&self, params: &RequestParams) -> ServiceResult<Invocation> {
        check_rules(&self.schema, params, &self.background_models)?;
        let dir = self.results.create(&self.config.name).await?;
        let staged = stage_inputs(&self.schema, params, &dir).await?;

        match self.config.mode {
            ExecutionMode::Sync => {
                let command = assemble_command(
                    &self.config.program,
                    &self.schema,
                    params,
                    &staged,
                    &self.background_models,
                    None,
                )?;
                let output = self
                    .executor
                    .run(&command, dir.path(), self.execution.sync_timeout())
                    .await?;

                let file_name = format!("{}.{}", self.config.name, self.config.output_extension());
                let path = dir.join(&file_name);
                tokio::fs::write(&path, output.stdout.as_bytes())
                    .await
                    .map_err(|e| ServiceError::FileStaging { path, source: e })?;

                Ok(Invocation::Completed {
                    tool: self.config.name.clone(),
                    command: command.command_line(),
                    output: output.stdout,
                    result_url: dir.url_for(&self.results_base_url, &file_name),
                })
            }
            ExecutionMode::Background => {
                let prefix = dir.join(&self.config.name);
                let output = self
                    .config
                    .output_flag
                    .as_deref()
                    .map(|flag| OutputTarget {
                        flag,
                        prefix: &prefix,
                    });
                let command = assemble_command(
                    &self.config.program,
                    &self.schema,
                    params,
                    &staged,
                    &self.background_models,
                    output,
                )?;
                let job = BackgroundJob {
                    working_dir: dir.path().to_path_buf(),
                    log_path: dir.join(&format!("{}.log", self.config.name)),
                    timeout: self.execution.background_timeout(),
                };
                let ticket = self.executor.spawn_background(&command, &job).await?;
                debug!(
                    pid = ?ticket.pid,
                    log = %ticket.log_path.display(),
                    "Background run detached"
                );

                Ok(Invocation::Submitted {
                    tool: self.config.name.clone(),
                    command: command.command_line(),
                    result_url: dir.url_for(&self.results_base_url, &self.config.synthesis_page()),
                })
            }
        }
    }
}

/// All configured tools, keyed by endpoint name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolService>>,
}

impl ToolRegistry {
    /// Load every configured tool's schema. Fails on the first bad tool.
    pub fn from_config(
        config: &ServiceConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> ServiceResult<Self> {
        let mut registry = ToolRegistry::default();
        for tool in &config.tools {
            if !valid_tool_name(&tool.name) {
                return Err(ServiceError::config_error(format!(
                    "tool name '{}' may only contain letters, digits, '-' and '_'",
                    tool.name
                )));
            }
            if reserved_names(config).any(|reserved| reserved == tool.name) {
                return Err(ServiceError::config_error(format!(
                    "tool name '{}' collides with a built-in route",
                    tool.name
                )));
            }
            let schema = ParameterSchema::load(&config.schema_path(tool))?;
            let program = Path::new(&tool.program);
            if program.is_absolute() && !program.exists() {
                warn!(tool = %tool.name, program = %tool.program, "Tool executable not found");
            }
            info!(
                tool = %tool.name,
                mode = ?tool.mode,
                parameters = schema.parameters.len(),
                "Registered tool"
            );
            registry.insert(ToolService::new(config, tool.clone(), schema, executor.clone()));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, service: ToolService) {
        self.tools
            .insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> ServiceResult<Arc<ToolService>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownTool(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolService>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// First path segments already taken by the router.
fn reserved_names(config: &ServiceConfig) -> impl Iterator<Item = &str> {
    let results = config
        .storage
        .tmp_url_path
        .trim_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    ["health", "tools", results].into_iter()
}

fn valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
