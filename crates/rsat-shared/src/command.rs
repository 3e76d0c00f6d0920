//! # Command Assembly
//!
//! Pure translation of a request into a tool invocation. No I/O happens here:
//! uploads are already staged and the background model path is computed from
//! configuration only, so every property of the generated flags can be tested
//! without running a process.
//!
//! Commands are an argument vector, never a shell string.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::config::BackgroundModelConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::params::{ParamValue, RequestParams};
use crate::schema::{ParameterSchema, TranslationRule};
use crate::staging::StagedInputs;

/// Separator for several staged files given to one flag.
pub const MULTI_VALUE_SEPARATOR: &str = ",";

/// An external program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append a bare `-<name>` flag.
    pub fn flag(&mut self, name: &str) -> &mut Self {
        self.arg(format!("-{name}"))
    }

    /// Append `-<name> <value>...`.
    pub fn option<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flag(name);
        for value in values {
            self.arg(value);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Shell-quoted rendering, for logs and responses only.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Resolves organism + oligonucleotide length to a background model file.
#[derive(Debug, Clone)]
pub struct BackgroundModelCatalog {
    config: BackgroundModelConfig,
}

impl BackgroundModelCatalog {
    pub fn new(config: BackgroundModelConfig) -> Self {
        Self { config }
    }

    /// Path of the model for `organism` with `markov_order + 1` long words.
    /// Without an order the length defaults to 1.
    pub fn resolve(&self, organism: &str, markov_order: Option<i64>) -> ServiceResult<String> {
        if !valid_organism(organism) {
            return Err(ServiceError::invalid_parameter(
                "org",
                format!("'{organism}' is not a valid organism name"),
            ));
        }
        let length = match markov_order {
            Some(order) if order < 0 => {
                return Err(ServiceError::invalid_parameter(
                    "markov_order",
                    "must not be negative",
                ))
            }
            Some(order) => order.checked_add(1).ok_or_else(|| {
                ServiceError::invalid_parameter("markov_order", "too large")
            })?,
            None => 1,
        };

        let path = self
            .config
            .path_template
            .replace("{data_dir}", &self.config.data_dir.display().to_string())
            .replace("{organism}", organism)
            .replace("{length}", &length.to_string());
        Ok(format!("{path}{}", self.config.suffix))
    }
}

fn valid_organism(organism: &str) -> bool {
    !organism.is_empty()
        && !organism.contains("..")
        && organism
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Output prefix flag for tools writing into the result directory.
#[derive(Debug, Clone, Copy)]
pub struct OutputTarget<'a> {
    pub flag: &'a str,
    pub prefix: &'a Path,
}

/// Build the invocation of `program` for one request.
///
/// Parameters are translated in request order; staged file parameters not
/// claimed by a rule follow in schema order, then the output target.
pub fn assemble_command(
    program: &str,
    schema: &ParameterSchema,
    params: &RequestParams,
    staged: &StagedInputs,
    background_models: &BackgroundModelCatalog,
    output: Option<OutputTarget<'_>>,
) -> ServiceResult<ToolCommand> {
    let mut command = ToolCommand::new(program);

    for (name, value) in params.iter() {
        if let Some(rule) = schema
            .rules
            .iter()
            .find(|rule| rule.consumed_names().contains(&name))
        {
            apply_rule(&mut command, rule, name, params, staged, background_models)?;
            continue;
        }
        if schema.is_excluded(name) {
            continue;
        }
        match value {
            ParamValue::Bool(true) => {
                command.flag(name);
            }
            ParamValue::Bool(false) => {}
            other => {
                if let Some(argument) = other.as_argument() {
                    command.option(name, [argument]);
                }
            }
        }
    }

    for spec in schema.file_parameters() {
        if schema.is_rule_consumed(&spec.name) {
            continue;
        }
        if let Some(locations) = staged.get(&spec.name) {
            command.option(&spec.name, [locations.join(MULTI_VALUE_SEPARATOR)]);
        }
    }

    if let Some(target) = output {
        command.option(target.flag, [target.prefix.display().to_string()]);
    }

    Ok(command)
}

fn apply_rule(
    command: &mut ToolCommand,
    rule: &TranslationRule,
    name: &str,
    params: &RequestParams,
    staged: &StagedInputs,
    background_models: &BackgroundModelCatalog,
) -> ServiceResult<()> {
    match rule {
        TranslationRule::SequenceInput {
            selector,
            file,
            flag,
            companions,
        } => {
            if name == selector {
                let Some(sequence_type) = params.argument(selector) else {
                    return Ok(());
                };
                let path = staged
                    .get(file)
                    .and_then(|locations| locations.first())
                    .ok_or_else(|| {
                        ServiceError::invalid_parameter(
                            file.as_str(),
                            format!("a file is required when '{selector}' is given"),
                        )
                    })?;
                command.option(flag, [sequence_type, path.clone()]);
            } else if let Some(companion) = companions.iter().find(|c| c.param == name) {
                let Some(value) = params.argument(name) else {
                    return Ok(());
                };
                let sequence_type = params.argument(selector).ok_or_else(|| {
                    ServiceError::invalid_parameter(
                        name,
                        format!("requires '{selector}' to be given"),
                    )
                })?;
                command.option(&companion.flag, [sequence_type, value]);
            }
        }
        TranslationRule::BackgroundModel {
            organism,
            order,
            flag,
        } => {
            if name != organism {
                return Ok(());
            }
            let Some(organism_value) = params.argument(organism) else {
                return Ok(());
            };
            if staged.contains(flag) {
                return Err(ServiceError::invalid_parameter(
                    organism.as_str(),
                    format!("cannot be combined with an uploaded '{flag}'"),
                ));
            }
            let path = background_models
                .resolve(&organism_value, markov_order(order.as_deref(), params))?;
            command.option(flag, [path]);
        }
    }
    Ok(())
}

/// Reject rule violations that are visible from the request alone, before
/// any result directory is created or file staged.
pub fn check_rules(
    schema: &ParameterSchema,
    params: &RequestParams,
    background_models: &BackgroundModelCatalog,
) -> ServiceResult<()> {
    for rule in &schema.rules {
        match rule {
            TranslationRule::SequenceInput {
                selector,
                file,
                companions,
                ..
            } => {
                if params.argument(selector).is_some() {
                    if !provides_file(params, file) {
                        return Err(ServiceError::invalid_parameter(
                            file.as_str(),
                            format!("a file is required when '{selector}' is given"),
                        ));
                    }
                } else if let Some(companion) = companions
                    .iter()
                    .find(|c| params.argument(&c.param).is_some())
                {
                    return Err(ServiceError::invalid_parameter(
                        companion.param.as_str(),
                        format!("requires '{selector}' to be given"),
                    ));
                }
            }
            TranslationRule::BackgroundModel {
                organism,
                order,
                flag,
            } => {
                let Some(organism_value) = params.argument(organism) else {
                    continue;
                };
                if provides_file(params, flag) {
                    return Err(ServiceError::invalid_parameter(
                        organism.as_str(),
                        format!("cannot be combined with an uploaded '{flag}'"),
                    ));
                }
                background_models.resolve(&organism_value, markov_order(order.as_deref(), params))?;
            }
        }
    }
    Ok(())
}

fn provides_file(params: &RequestParams, name: &str) -> bool {
    !params.uploads(name).is_empty() || params.inline_content(name).is_some()
}

fn markov_order(order: Option<&str>, params: &RequestParams) -> Option<i64> {
    match order.and_then(|o| params.get(o)) {
        Some(ParamValue::Integer(i)) => Some(*i),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RawValue;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    const MATRIX_QUALITY: &str = r#"
parameters:
  - name: m
    type: file
  - name: matrix_format
  - name: seq_type
  - name: seq_file
    type: file
  - name: perm
    type: integer
  - name: plot
  - name: seq_type_2
  - name: seq_file_2
    type: file
  - name: perm_2
    type: integer
  - name: plot_2
  - name: org
  - name: markov_order
    type: integer
  - name: bgfile
    type: file
  - name: pseudo
    type: float
  - name: archive
    type: boolean
  - name: html
    type: boolean
rules:
  - kind: sequence_input
    selector: seq_type
    file: seq_file
    companions:
      - { param: perm, flag: perm }
      - { param: plot, flag: plot }
  - kind: sequence_input
    selector: seq_type_2
    file: seq_file_2
    companions:
      - { param: perm_2, flag: perm }
      - { param: plot_2, flag: plot }
  - kind: background_model
    organism: org
    order: markov_order
    flag: bgfile
"#;

    fn schema() -> ParameterSchema {
        ParameterSchema::from_yaml_str(MATRIX_QUALITY).unwrap()
    }

    fn catalog() -> BackgroundModelCatalog {
        BackgroundModelCatalog::new(BackgroundModelConfig {
            data_dir: PathBuf::from("/data"),
            ..BackgroundModelConfig::default()
        })
    }

    fn params(body: Value) -> RequestParams {
        let Value::Object(map) = body else {
            panic!("expected an object")
        };
        RequestParams::from_raw(
            &schema(),
            map.into_iter().map(|(k, v)| (k, RawValue::Json(v))),
        )
        .unwrap()
    }

    fn staged(entries: &[(&str, &str)]) -> StagedInputs {
        let mut staged = StagedInputs::default();
        for (name, location) in entries {
            staged.insert(*name, vec![location.to_string()]);
        }
        staged
    }

    fn assemble(body: Value, staged: &StagedInputs) -> ServiceResult<ToolCommand> {
        assemble_command(
            "matrix-quality",
            &schema(),
            &params(body),
            staged,
            &catalog(),
            None,
        )
    }

    fn count(args: &[String], word: &str) -> usize {
        args.iter().filter(|a| *a == word).count()
    }

    #[test]
    fn test_boolean_true_is_single_bare_flag() {
        let cmd = assemble(json!({"archive": true, "html": false}), &StagedInputs::default()).unwrap();
        assert_eq!(cmd.args(), ["-archive"]);
        assert_eq!(count(cmd.args(), "-html"), 0);
    }

    #[test]
    fn test_absent_boolean_is_omitted() {
        let cmd = assemble(json!({"pseudo": 1}), &StagedInputs::default()).unwrap();
        assert_eq!(count(cmd.args(), "-archive"), 0);
        assert_eq!(cmd.args(), ["-pseudo", "1"]);
    }

    #[test]
    fn test_non_boolean_values_appear_once_in_request_order() {
        let cmd = assemble(
            json!({"pseudo": 0.01, "matrix_format": "transfac", "archive": true}),
            &StagedInputs::default(),
        )
        .unwrap();
        assert_eq!(
            cmd.args(),
            ["-pseudo", "0.01", "-matrix_format", "transfac", "-archive"]
        );
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let cmd = assemble(json!({"matrix_format": ""}), &StagedInputs::default()).unwrap();
        assert!(cmd.args().is_empty());
    }

    #[test]
    fn test_excluded_parameters_never_become_flags() {
        let cmd = assemble_command(
            "matrix-quality",
            &schema(),
            &params(json!({
                "content-type": "text/plain",
                "m_string": "AC M1",
                "m_string_type": "text",
                "archive": true
            })),
            &staged(&[("m", "/r/m_string.txt")]),
            &catalog(),
            None,
        )
        .unwrap();
        for excluded in ["-content-type", "-m_string", "-m_string_type", "text/plain", "AC M1"] {
            assert_eq!(count(cmd.args(), excluded), 0, "{excluded} leaked");
        }
        assert_eq!(cmd.args(), ["-archive", "-m", "/r/m_string.txt"]);
    }

    #[test]
    fn test_sequence_input_with_companions() {
        let cmd = assemble(
            json!({
                "seq_type": "chipseq",
                "perm": 2,
                "plot": "score_distrib",
                "seq_type_2": "random",
                "perm_2": 1
            }),
            &staged(&[("seq_file", "/r/seq_file_a.fa"), ("seq_file_2", "/r/seq_file_2_b.fa")]),
        )
        .unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-seq", "chipseq", "/r/seq_file_a.fa",
                "-perm", "chipseq", "2",
                "-plot", "chipseq", "score_distrib",
                "-seq", "random", "/r/seq_file_2_b.fa",
                "-perm", "random", "1",
            ]
        );
        assert_eq!(count(cmd.args(), "-seq_type"), 0);
        assert_eq!(count(cmd.args(), "-seq_file"), 0);
    }

    #[test]
    fn test_sequence_type_without_file_rejected() {
        let err = assemble(json!({"seq_type": "chipseq"}), &StagedInputs::default()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter { name, .. } if name == "seq_file"));
    }

    #[test]
    fn test_companion_without_selector_rejected() {
        let err = assemble(json!({"perm": 3}), &StagedInputs::default()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter { name, .. } if name == "perm"));
    }

    #[test]
    fn test_background_model_human_order_two() {
        let cmd = assemble(
            json!({"org": "human", "markov_order": 2}),
            &StagedInputs::default(),
        )
        .unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-bgfile",
                "/data/genomes/human/oligo-frequencies/3nt_upstream-noorf_human-ovlp-1str.freq.gz"
            ]
        );
    }

    #[test]
    fn test_background_model_default_length() {
        let path = catalog().resolve("Saccharomyces_cerevisiae", None).unwrap();
        assert!(path.contains("/1nt_upstream-noorf_Saccharomyces_cerevisiae"));
        assert!(path.ends_with(".gz"));
    }

    #[test]
    fn test_background_model_rejects_path_traversal() {
        assert!(catalog().resolve("../../etc", Some(1)).is_err());
        assert!(catalog().resolve("human/x", Some(1)).is_err());
        assert!(catalog().resolve("human", Some(-1)).is_err());
    }

    #[test]
    fn test_background_model_rejects_overflowing_order() {
        let err = assemble(
            json!({"org": "human", "markov_order": i64::MAX}),
            &StagedInputs::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter { name, .. } if name == "markov_order"));
    }

    #[test]
    fn test_sequence_file_without_type_is_dropped() {
        let cmd = assemble(
            json!({"archive": true}),
            &staged(&[("seq_file", "/r/seq_file_a.fa")]),
        )
        .unwrap();
        assert_eq!(cmd.args(), ["-archive"]);
        assert_eq!(count(cmd.args(), "/r/seq_file_a.fa"), 0);
    }

    #[test]
    fn test_check_rules_before_staging() {
        let models = catalog();
        for (body, name) in [
            (json!({"seq_type": "chipseq"}), "seq_file"),
            (json!({"plot": "score_distrib"}), "plot"),
            (json!({"org": "human", "bgfile_string": "a 0.25"}), "org"),
            (json!({"org": "human", "markov_order": -1}), "markov_order"),
        ] {
            let err = check_rules(&schema(), &params(body.clone()), &models).unwrap_err();
            assert!(
                matches!(&err, ServiceError::InvalidParameter { name: n, .. } if n == name),
                "{body}: {err}"
            );
        }

        let ok = params(json!({
            "seq_type": "chipseq",
            "seq_file_string": ">s\nACGT\n",
            "perm": 2,
            "org": "human",
            "markov_order": 1
        }));
        assert!(check_rules(&schema(), &ok, &models).is_ok());
    }

    #[test]
    fn test_organism_with_uploaded_bgfile_rejected() {
        let err = assemble(json!({"org": "human"}), &staged(&[("bgfile", "/r/bgfile_bg.txt")]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter { name, .. } if name == "org"));
    }

    #[test]
    fn test_file_uploads_follow_in_schema_order_then_output() {
        let mut inputs = staged(&[("bgfile", "/r/bgfile_bg.txt")]);
        inputs.insert("m", vec!["/r/m_1_a.tf".to_string(), "/r/m_2_b.tf".to_string()]);
        let prefix = PathBuf::from("/r/matrix-quality");
        let cmd = assemble_command(
            "matrix-quality",
            &schema(),
            &params(json!({"archive": true})),
            &inputs,
            &catalog(),
            Some(OutputTarget {
                flag: "o",
                prefix: &prefix,
            }),
        )
        .unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-archive",
                "-m", "/r/m_1_a.tf,/r/m_2_b.tf",
                "-bgfile", "/r/bgfile_bg.txt",
                "-o", "/r/matrix-quality",
            ]
        );
    }

    #[test]
    fn test_command_line_quoting() {
        let mut cmd = ToolCommand::new("/opt/rsat/perl-scripts/matrix-quality");
        cmd.option("title", ["my title"]).option("plot", ["it's"]).flag("archive");
        assert_eq!(
            cmd.command_line(),
            r"/opt/rsat/perl-scripts/matrix-quality -title 'my title' -plot 'it'\''s' -archive"
        );
        assert_eq!(cmd.to_string(), cmd.command_line());
    }
}
