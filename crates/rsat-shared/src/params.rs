//! # Request Parameters
//!
//! Typed, ordered view of one request's parameters. Raw values arrive from a
//! query string, a form, a JSON object or a multipart body; they are checked
//! against the tool's [`ParameterSchema`] and coerced to the declared kind.
//! Enumeration order is kept because it drives flag order.

use bytes::Bytes;
use serde_json::Value;

use crate::errors::{ServiceError, ServiceResult};
use crate::schema::{ParamKind, ParamRole, ParamSpec, ParameterSchema, INLINE_SUFFIX, INLINE_TYPE_SUFFIX};

pub const PLAIN_TEXT: &str = "text/plain";

/// A file received in a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Client-supplied name; untrusted.
    pub file_name: Option<String>,
    pub content: Bytes,
}

/// A parameter value as it arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Json(Value),
    Upload(UploadedFile),
}

/// A parameter value after coercion to its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Uploads(Vec<UploadedFile>),
}

impl ParamValue {
    /// Rendering used as a flag argument. `None` for booleans, uploads and
    /// empty text, which never take the `-<name> <value>` form.
    pub fn as_argument(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) if !s.is_empty() => Some(s.clone()),
            ParamValue::Integer(i) => Some(i.to_string()),
            ParamValue::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }
}

/// How `<file>_string` content should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// Literal file content.
    Text,
    /// A remote location passed through to the tool.
    Url,
}

impl InlineKind {
    fn parse(name: &str, value: &str) -> ServiceResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(InlineKind::Text),
            "url" => Ok(InlineKind::Url),
            other => Err(ServiceError::invalid_parameter(
                name,
                format!("expected 'text' or 'url', got '{other}'"),
            )),
        }
    }
}

/// Ordered, schema-checked request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    entries: Vec<(String, ParamValue)>,
    content_type: Option<String>,
}

impl RequestParams {
    /// Validate raw wire values against the schema.
    ///
    /// Unknown names, malformed values, duplicated scalars and missing
    /// required parameters are rejected. Null JSON values and blank numeric
    /// form fields count as absent.
    pub fn from_raw<I>(schema: &ParameterSchema, raw: I) -> ServiceResult<Self>
    where
        I: IntoIterator<Item = (String, RawValue)>,
    {
        let mut params = RequestParams::default();

        for (name, value) in raw {
            let role = schema
                .resolve(&name)
                .ok_or_else(|| ServiceError::UnknownParameter(name.clone()))?;

            match role {
                ParamRole::ContentTypeMarker => {
                    params.content_type = text_of(&name, value)?;
                }
                ParamRole::Declared(spec) if spec.is_file_upload() => match value {
                    RawValue::Upload(file) => params.push_upload(&name, file),
                    RawValue::Json(Value::Null) => {}
                    RawValue::Json(Value::String(s)) | RawValue::Text(s) if s.is_empty() => {}
                    _ => {
                        return Err(ServiceError::invalid_parameter(
                            &name,
                            format!("expected a file upload; send inline content as '{name}{INLINE_SUFFIX}'"),
                        ))
                    }
                },
                ParamRole::Declared(spec) => {
                    if let Some(coerced) = coerce(spec, value)? {
                        params.push_scalar(name, coerced)?;
                    }
                }
                ParamRole::InlineContent(_) => {
                    if let Some(text) = text_of(&name, value)? {
                        params.push_scalar(name, ParamValue::Text(text))?;
                    }
                }
                ParamRole::InlineContentType(_) => {
                    if let Some(text) = text_of(&name, value)? {
                        let kind = InlineKind::parse(&name, &text)?;
                        let normalized = match kind {
                            InlineKind::Text => "text",
                            InlineKind::Url => "url",
                        };
                        params.push_scalar(name, ParamValue::Text(normalized.to_string()))?;
                    }
                }
            }
        }

        params.check_required(schema)?;
        Ok(params)
    }

    fn push_upload(&mut self, name: &str, file: UploadedFile) {
        if let Some((_, ParamValue::Uploads(files))) =
            self.entries.iter_mut().find(|(n, _)| n == name)
        {
            files.push(file);
            return;
        }
        self.entries
            .push((name.to_string(), ParamValue::Uploads(vec![file])));
    }

    fn push_scalar(&mut self, name: String, value: ParamValue) -> ServiceResult<()> {
        if self.entries.iter().any(|(n, _)| *n == name) {
            return Err(ServiceError::invalid_parameter(name, "given more than once"));
        }
        self.entries.push((name, value));
        Ok(())
    }

    fn check_required(&self, schema: &ParameterSchema) -> ServiceResult<()> {
        for spec in schema.parameters.iter().filter(|p| p.required) {
            let present = if spec.is_file_upload() {
                !self.uploads(&spec.name).is_empty() || self.inline_content(&spec.name).is_some()
            } else {
                match self.get(&spec.name) {
                    Some(ParamValue::Bool(_)) => true,
                    Some(value) => value.as_argument().is_some(),
                    None => false,
                }
            };
            if !present {
                return Err(ServiceError::MissingParameter(spec.name.clone()));
            }
        }
        Ok(())
    }

    /// Parameters in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Non-empty argument rendering of a scalar parameter.
    pub fn argument(&self, name: &str) -> Option<String> {
        self.get(name).and_then(ParamValue::as_argument)
    }

    pub fn uploads(&self, name: &str) -> &[UploadedFile] {
        match self.get(name) {
            Some(ParamValue::Uploads(files)) => files,
            _ => &[],
        }
    }

    /// Inline content given for a file parameter, with its interpretation.
    pub fn inline_content(&self, name: &str) -> Option<(&str, InlineKind)> {
        let content = match self.get(&format!("{name}{INLINE_SUFFIX}")) {
            Some(ParamValue::Text(s)) if !s.is_empty() => s.as_str(),
            _ => return None,
        };
        let kind = match self.get(&format!("{name}{INLINE_TYPE_SUFFIX}")) {
            Some(ParamValue::Text(t)) if t == "url" => InlineKind::Url,
            _ => InlineKind::Text,
        };
        Some((content, kind))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// True when the `content-type` marker asks for a plain-text response.
    pub fn wants_plain_text(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(PLAIN_TEXT))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn text_of(name: &str, value: RawValue) -> ServiceResult<Option<String>> {
    match value {
        RawValue::Text(s) => Ok(Some(s)),
        RawValue::Json(Value::Null) => Ok(None),
        RawValue::Json(Value::String(s)) => Ok(Some(s)),
        RawValue::Json(Value::Number(n)) => Ok(Some(n.to_string())),
        RawValue::Json(Value::Bool(b)) => Ok(Some(b.to_string())),
        RawValue::Json(_) => Err(ServiceError::invalid_parameter(
            name,
            "expected a scalar value",
        )),
        RawValue::Upload(_) => Err(ServiceError::invalid_parameter(
            name,
            "expected a value, got a file upload",
        )),
    }
}

fn parse_bool(name: &str, s: &str) -> ServiceResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ServiceError::invalid_parameter(
            name,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn coerce(spec: &ParamSpec, value: RawValue) -> ServiceResult<Option<ParamValue>> {
    let name = spec.name.as_str();
    let coerced = match spec.kind {
        ParamKind::Boolean => match value {
            RawValue::Json(Value::Bool(b)) => Some(ParamValue::Bool(b)),
            RawValue::Json(Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(ParamValue::Bool(false)),
                Some(1) => Some(ParamValue::Bool(true)),
                _ => return Err(ServiceError::invalid_parameter(name, "expected a boolean")),
            },
            other => match text_of(name, other)? {
                Some(s) => Some(ParamValue::Bool(parse_bool(name, &s)?)),
                None => None,
            },
        },
        ParamKind::Integer => match value {
            RawValue::Json(Value::Number(n)) => Some(ParamValue::Integer(n.as_i64().ok_or_else(
                || ServiceError::invalid_parameter(name, format!("expected an integer, got {n}")),
            )?)),
            other => match text_of(name, other)? {
                Some(s) if s.trim().is_empty() => None,
                Some(s) => Some(ParamValue::Integer(s.trim().parse().map_err(|_| {
                    ServiceError::invalid_parameter(name, format!("expected an integer, got '{s}'"))
                })?)),
                None => None,
            },
        },
        ParamKind::Float => match value {
            RawValue::Json(Value::Number(n)) => Some(ParamValue::Float(n.as_f64().ok_or_else(
                || ServiceError::invalid_parameter(name, format!("expected a number, got {n}")),
            )?)),
            other => match text_of(name, other)? {
                Some(s) if s.trim().is_empty() => None,
                Some(s) => {
                    let parsed: f64 = s.trim().parse().map_err(|_| {
                        ServiceError::invalid_parameter(name, format!("expected a number, got '{s}'"))
                    })?;
                    if !parsed.is_finite() {
                        return Err(ServiceError::invalid_parameter(name, "expected a finite number"));
                    }
                    Some(ParamValue::Float(parsed))
                }
                None => None,
            },
        },
        ParamKind::String => match text_of(name, value)? {
            Some(s) => {
                if !s.is_empty() && !spec.choices.is_empty() && !spec.choices.contains(&s) {
                    return Err(ServiceError::invalid_parameter(
                        name,
                        format!("'{s}' is not one of {}", spec.choices.join(", ")),
                    ));
                }
                Some(ParamValue::Text(s))
            }
            None => None,
        },
        ParamKind::File => {
            return Err(ServiceError::invalid_parameter(name, "expected a file upload"))
        }
    };
    Ok(coerced)
}
