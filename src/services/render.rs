use crate::domain::models::{Decision, PolicyInput};
use crate::error::EvalError;
use serde::Serialize;
use std::str::FromStr;

const RESULT_LABEL: &str = "RESULT:";
const VIOLATIONS_LABEL: &str = "VIOLATIONS:";
const LABEL_WIDTH: usize = VIOLATIONS_LABEL.len() + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl FromStr for OutputFormat {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(EvalError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub exit_is_failure: bool,
}

#[derive(Serialize)]
struct JsonDecision<'a> {
    allow: bool,
    violations: &'a [String],
    // outer None drops the key; Some(None) writes an explicit null
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<Option<&'a PolicyInput>>,
}

/// Renders one decision. The `input` key is present in JSON output exactly
/// when `show_input` is set; the table never shows the input.
pub fn render(
    decision: &Decision,
    input: Option<&PolicyInput>,
    format: OutputFormat,
    show_input: bool,
) -> Result<Rendered, EvalError> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&JsonDecision {
            allow: decision.allow,
            violations: &decision.violations,
            input: show_input.then_some(input),
        })?,
        OutputFormat::Table => table(decision),
    };
    Ok(Rendered {
        text,
        exit_is_failure: !decision.allow,
    })
}

fn table(decision: &Decision) -> String {
    let result = if decision.allow { "ALLOWED" } else { "DENIED" };
    let mut lines = vec![format!("{RESULT_LABEL:<LABEL_WIDTH$}{result}")];
    for (i, violation) in decision.violations.iter().enumerate() {
        let label = if i == 0 { VIOLATIONS_LABEL } else { "" };
        lines.push(format!("{label:<LABEL_WIDTH$}{violation}"));
    }
    lines.join("\n")
}
