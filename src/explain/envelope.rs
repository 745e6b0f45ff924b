//! Tool output envelopes and exit codes.
//!
//! Every tooling command emits one JSON object beginning with
//! `{"kind": …, "tooling_json_version": …}`, redacted and canonically
//! serialized. Failures still produce a well-formed envelope: caller
//! mistakes exit 2 with `<KIND>_INPUT_INVALID`, internal errors exit 1
//! with `<KIND>_INTERNAL_ERROR`.

use serde_json::{Map, Value};

use super::redact::redact_value;
use crate::canonical::to_canonical_string;
use crate::errors::InputError;

pub const TOOLING_JSON_V1: &str = "v1";
pub const TOOLING_JSON_V3: &str = "v3";

/// The recognized tool output kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    Validate,
    Explain,
    ExplainPatch,
    ExplainPatchRich,
    PreviewMatrix,
    Diff,
    ExecExplain,
}

impl ToolKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Validate => "validate",
            ToolKind::Explain => "explain",
            ToolKind::ExplainPatch => "explain_patch",
            ToolKind::ExplainPatchRich => "explain_patch_rich",
            ToolKind::PreviewMatrix => "preview_matrix",
            ToolKind::Diff => "diff",
            ToolKind::ExecExplain => "exec_explain",
        }
    }

    /// The richer surfaces ship the v3 envelope; the rest stay on v1.
    #[must_use]
    pub fn tooling_json_version(&self) -> &'static str {
        match self {
            ToolKind::ExplainPatchRich | ToolKind::ExecExplain => TOOLING_JSON_V3,
            _ => TOOLING_JSON_V1,
        }
    }

    fn code_prefix(&self) -> String {
        self.as_str().to_uppercase()
    }

    #[must_use]
    pub fn input_invalid_code(&self) -> String {
        format!("{}_INPUT_INVALID", self.code_prefix())
    }

    #[must_use]
    pub fn internal_error_code(&self) -> String {
        format!("{}_INTERNAL_ERROR", self.code_prefix())
    }
}

/// Process exit codes for CLI-callable operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    InternalError,
    InputInvalid,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::InternalError => 1,
            ExitCode::InputInvalid => 2,
        }
    }
}

/// One finished tool output: the envelope JSON plus the exit code the
/// caller should surface.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub kind: ToolKind,
    pub exit_code: ExitCode,
    pub json: Value,
}

impl ToolOutput {
    /// Canonical UTF-8 rendering of the envelope.
    #[must_use]
    pub fn to_canonical_json(&self) -> String {
        to_canonical_string(&self.json)
    }
}

/// Assemble, redact, and seal a tool envelope.
#[must_use]
pub(crate) fn seal(kind: ToolKind, exit_code: ExitCode, mut body: Map<String, Value>) -> ToolOutput {
    body.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
    body.insert(
        "tooling_json_version".to_string(),
        Value::String(kind.tooling_json_version().to_string()),
    );
    ToolOutput {
        kind,
        exit_code,
        json: redact_value(&Value::Object(body)),
    }
}

/// Envelope for a caller-attributable bad input (exit 2).
#[must_use]
pub fn input_error_output(kind: ToolKind, error: &InputError) -> ToolOutput {
    error_output(kind, ExitCode::InputInvalid, kind.input_invalid_code(), &error.message)
}

/// Envelope for an unexpected internal failure (exit 1).
#[must_use]
pub fn internal_error_output(kind: ToolKind, message: &str) -> ToolOutput {
    error_output(kind, ExitCode::InternalError, kind.internal_error_code(), message)
}

fn error_output(kind: ToolKind, exit_code: ExitCode, code: String, message: &str) -> ToolOutput {
    let mut error = Map::new();
    error.insert("code".to_string(), Value::String(code));
    error.insert("message".to_string(), Value::String(message.to_string()));
    let mut body = Map::new();
    body.insert("error".to_string(), Value::Object(error));
    seal(kind, exit_code, body)
}
