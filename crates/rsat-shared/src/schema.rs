//! # Parameter Schemas
//!
//! Each wrapped tool declares its accepted request parameters in a YAML file:
//!
//! ```yaml
//! description: Assess the quality of a position-specific scoring matrix
//! parameters:
//!   - name: m
//!     type: file
//!     required: true
//!   - name: seq_type
//!     type: string
//!   - name: archive
//!     type: boolean
//! rules:
//!   - kind: sequence_input
//!     selector: seq_type
//!     file: seq_file
//!     companions:
//!       - { param: perm, flag: perm }
//! ```
//!
//! Schemas are loaded once at startup and never mutated afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Request parameter selecting plain-text or JSON responses. Never a tool flag.
pub const CONTENT_TYPE_MARKER: &str = "content-type";
/// Suffix of the inline-content companion of a file parameter.
pub const INLINE_SUFFIX: &str = "_string";
/// Suffix of the companion telling how to read the inline content.
pub const INLINE_TYPE_SUFFIX: &str = "_string_type";

/// Error during schema loading.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse schema YAML '{}': {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid schema: {0}")]
    Invalid(String),
}

/// Value kind of a declared parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    File,
}

/// One declared request parameter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl ParamSpec {
    pub fn is_file_upload(&self) -> bool {
        self.kind == ParamKind::File
    }

    pub fn is_flag_only(&self) -> bool {
        self.kind == ParamKind::Boolean
    }
}

/// A parameter forwarded under another flag, qualified by a selector value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Companion {
    pub param: String,
    pub flag: String,
}

fn default_sequence_flag() -> String {
    "seq".to_string()
}

/// Parameters translated into flags by something other than `-<name> <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranslationRule {
    /// `selector` + uploaded `file` become `-<flag> <selector> <path>`;
    /// each companion becomes `-<companion.flag> <selector> <value>`.
    SequenceInput {
        selector: String,
        file: String,
        #[serde(default = "default_sequence_flag")]
        flag: String,
        #[serde(default)]
        companions: Vec<Companion>,
    },
    /// `organism` (+ optional Markov `order`) become `-<flag> <model path>`.
    BackgroundModel {
        organism: String,
        #[serde(default)]
        order: Option<String>,
        flag: String,
    },
}

impl TranslationRule {
    /// Parameter names this rule takes over from the generic translation.
    pub fn consumed_names(&self) -> Vec<&str> {
        match self {
            TranslationRule::SequenceInput {
                selector,
                file,
                companions,
                ..
            } => {
                let mut names = vec![selector.as_str(), file.as_str()];
                names.extend(companions.iter().map(|c| c.param.as_str()));
                names
            }
            TranslationRule::BackgroundModel {
                organism, order, ..
            } => {
                let mut names = vec![organism.as_str()];
                names.extend(order.as_deref());
                names
            }
        }
    }
}

/// How a request parameter name relates to the schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamRole<'a> {
    Declared(&'a ParamSpec),
    /// `<file>_string`: file content or URL given inline.
    InlineContent(&'a ParamSpec),
    /// `<file>_string_type`: `text` or `url`.
    InlineContentType(&'a ParamSpec),
    ContentTypeMarker,
}

/// The declared parameters and translation rules of one tool.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParameterSchema {
    #[serde(default)]
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<TranslationRule>,
}

impl ParameterSchema {
    /// Load and validate a schema YAML file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let yaml_content = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let schema: Self = serde_yaml::from_str(&yaml_content).map_err(|e| SchemaError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        schema.validate()?;
        tracing::debug!(?path, parameters = schema.parameters.len(), "Loaded parameter schema");
        Ok(schema)
    }

    /// Parse and validate a schema from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_yaml::from_str(yaml).map_err(|e| SchemaError::Yaml {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn file_parameters(&self) -> impl Iterator<Item = &ParamSpec> {
        self.parameters.iter().filter(|p| p.is_file_upload())
    }

    /// Classify a request parameter name; `None` means it is not accepted.
    pub fn resolve(&self, name: &str) -> Option<ParamRole<'_>> {
        if name == CONTENT_TYPE_MARKER {
            return Some(ParamRole::ContentTypeMarker);
        }
        if let Some(spec) = self.get(name) {
            return Some(ParamRole::Declared(spec));
        }
        if let Some(base) = name.strip_suffix(INLINE_TYPE_SUFFIX) {
            if let Some(spec) = self.get(base).filter(|s| s.is_file_upload()) {
                return Some(ParamRole::InlineContentType(spec));
            }
        }
        if let Some(base) = name.strip_suffix(INLINE_SUFFIX) {
            if let Some(spec) = self.get(base).filter(|s| s.is_file_upload()) {
                return Some(ParamRole::InlineContent(spec));
            }
        }
        None
    }

    /// True if the parameter never becomes a generic `-<name> <value>` flag.
    pub fn is_excluded(&self, name: &str) -> bool {
        match self.resolve(name) {
            Some(ParamRole::Declared(spec)) => spec.is_file_upload() || self.is_rule_consumed(name),
            _ => true,
        }
    }

    pub fn is_rule_consumed(&self, name: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.consumed_names().contains(&name))
    }

    /// Check internal consistency: unique names, rules referencing parameters
    /// of the right kinds, choices only on string parameters.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if param.name.is_empty() || param.name.starts_with('-') {
                return Err(SchemaError::Invalid(format!(
                    "invalid parameter name '{}'",
                    param.name
                )));
            }
            if param.name == CONTENT_TYPE_MARKER {
                return Err(SchemaError::Invalid(format!(
                    "'{CONTENT_TYPE_MARKER}' is reserved"
                )));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "parameter '{}' declared more than once",
                    param.name
                )));
            }
            if !param.choices.is_empty() && param.kind != ParamKind::String {
                return Err(SchemaError::Invalid(format!(
                    "parameter '{}': choices are only allowed on string parameters",
                    param.name
                )));
            }
        }

        let mut consumed = HashSet::new();
        for rule in &self.rules {
            for name in rule.consumed_names() {
                if !consumed.insert(name) {
                    return Err(SchemaError::Invalid(format!(
                        "parameter '{name}' is used by more than one rule"
                    )));
                }
            }
            match rule {
                TranslationRule::SequenceInput {
                    selector,
                    file,
                    companions,
                    ..
                } => {
                    self.expect_kind(selector, &[ParamKind::String])?;
                    self.expect_kind(file, &[ParamKind::File])?;
                    for companion in companions {
                        self.expect_kind(
                            &companion.param,
                            &[ParamKind::String, ParamKind::Integer, ParamKind::Float],
                        )?;
                    }
                }
                TranslationRule::BackgroundModel {
                    organism, order, ..
                } => {
                    self.expect_kind(organism, &[ParamKind::String])?;
                    if let Some(order) = order {
                        self.expect_kind(order, &[ParamKind::Integer])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn expect_kind(&self, name: &str, kinds: &[ParamKind]) -> Result<(), SchemaError> {
        match self.get(name) {
            Some(spec) if kinds.contains(&spec.kind) => Ok(()),
            Some(spec) => Err(SchemaError::Invalid(format!(
                "rule parameter '{name}' has type {:?}, expected one of {kinds:?}",
                spec.kind
            ))),
            None => Err(SchemaError::Invalid(format!(
                "rule references undeclared parameter '{name}'"
            ))),
        }
    }
}
