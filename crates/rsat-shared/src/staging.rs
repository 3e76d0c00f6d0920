//! # Result Directories and File Staging
//!
//! Every request gets its own directory under the configured tmp root:
//! `<root>/<YYYY>/<MM>/<DD>/<tool>_<timestamp>_<uuid>`. The last component is
//! created with `create_dir`, so two requests can never end up sharing one.
//! Directories are left in place for external cleanup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::params::{InlineKind, RequestParams};
use crate::schema::{ParameterSchema, INLINE_SUFFIX};

const MAX_CREATE_ATTEMPTS: usize = 4;
const URL_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// A per-request scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDir {
    path: PathBuf,
    relative: String,
}

impl ResultDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location below the tmp root, `/`-separated.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn join(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    /// Public URL of a file in this directory.
    pub fn url_for(&self, results_base_url: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            results_base_url.trim_end_matches('/'),
            self.relative,
            file_name
        )
    }
}

/// Creates result directories below one root.
#[derive(Debug, Clone)]
pub struct ResultDirFactory {
    root: PathBuf,
}

impl ResultDirFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a fresh, exclusively owned directory for one run of `tool`.
    pub async fn create(&self, tool: &str) -> ServiceResult<ResultDir> {
        let now = Utc::now();
        let day = now.format("%Y/%m/%d").to_string();
        let parent = self.root.join(&day);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| ServiceError::FileStaging {
                path: parent.clone(),
                source: e,
            })?;

        let mut last_error = None;
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let name = format!(
                "{tool}_{}_{}",
                now.format("%Y%m%d_%H%M%S"),
                Uuid::new_v4().simple()
            );
            let path = parent.join(&name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Created result directory");
                    return Ok(ResultDir {
                        path,
                        relative: format!("{day}/{name}"),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    last_error = Some((path, e));
                }
                Err(e) => return Err(ServiceError::FileStaging { path, source: e }),
            }
        }

        let (path, source) = last_error.unwrap_or_else(|| {
            (
                parent.clone(),
                std::io::Error::other("no result directory attempt was made"),
            )
        });
        Err(ServiceError::FileStaging { path, source })
    }
}

/// Staged locations (paths or URLs) per file parameter, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedInputs {
    inputs: Vec<(String, Vec<String>)>,
}

impl StagedInputs {
    pub fn insert(&mut self, name: impl Into<String>, locations: Vec<String>) {
        let name = name.into();
        if let Some((_, existing)) = self.inputs.iter_mut().find(|(n, _)| *n == name) {
            existing.extend(locations);
        } else {
            self.inputs.push((name, locations));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.inputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Write uploads and inline text into `dir`; pass inline URLs through.
///
/// An upload takes precedence over `<name>_string` for the same parameter.
pub async fn stage_inputs(
    schema: &ParameterSchema,
    params: &RequestParams,
    dir: &ResultDir,
) -> ServiceResult<StagedInputs> {
    let mut staged = StagedInputs::default();

    for spec in schema.file_parameters() {
        let name = spec.name.as_str();
        let uploads = params.uploads(name);
        let mut locations = Vec::new();

        if !uploads.is_empty() {
            if params.inline_content(name).is_some() {
                tracing::warn!(parameter = name, "Upload and inline content both given, using upload");
            }
            for (idx, file) in uploads.iter().enumerate() {
                let file_name = staged_file_name(name, file.file_name.as_deref(), idx, uploads.len());
                let path = dir.join(&file_name);
                write_file(&path, &file.content).await?;
                locations.push(path.display().to_string());
            }
        } else if let Some((content, kind)) = params.inline_content(name) {
            match kind {
                InlineKind::Text => {
                    let path = dir.join(&format!("{name}{INLINE_SUFFIX}.txt"));
                    write_file(&path, content.as_bytes()).await?;
                    locations.push(path.display().to_string());
                }
                InlineKind::Url => {
                    let url = content.trim();
                    if !URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                        return Err(ServiceError::invalid_parameter(
                            format!("{name}{INLINE_SUFFIX}"),
                            format!("'{url}' is not an http, https or ftp URL"),
                        ));
                    }
                    locations.push(url.to_string());
                }
            }
        }

        if !locations.is_empty() {
            tracing::debug!(parameter = name, count = locations.len(), "Staged file input");
            staged.insert(name, locations);
        }
    }

    Ok(staged)
}

async fn write_file(path: &Path, content: &[u8]) -> ServiceResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ServiceError::FileStaging {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Reduce a client-supplied file name to a safe basename.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn staged_file_name(param: &str, client_name: Option<&str>, idx: usize, count: usize) -> String {
    let base = client_name
        .and_then(sanitize_file_name)
        .unwrap_or_else(|| "upload".to_string());
    if count > 1 {
        format!("{param}_{}_{base}", idx + 1)
    } else {
        format!("{param}_{base}")
    }
}
