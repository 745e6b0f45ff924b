//! `exec_explain`: the per-request execution picture, stage by stage,
//! with every module's outcome code.

use serde_json::{Map, Value};

use super::envelope::{ExitCode, ToolKind, ToolOutput, seal};
use super::{evaluation_header, params_json, stage_decision_json};
use crate::decision::StageDecision;
use crate::explain::ExplainLevel;
use crate::overlay::FlowPatchEvaluation;
use crate::params::ResolvedParams;

/// Seal the v3 `exec_explain` envelope for one evaluated request.
#[must_use]
pub fn exec_explain_output(
    evaluation: &FlowPatchEvaluation,
    decisions: &[StageDecision],
    params: &ResolvedParams,
) -> ToolOutput {
    let mut body: Map<String, Value> = evaluation_header(evaluation);
    body.insert(
        "stages".to_string(),
        Value::Array(decisions.iter().map(stage_decision_json).collect()),
    );
    body.insert(
        "params".to_string(),
        params_json(params, ExplainLevel::Summary),
    );
    seal(ToolKind::ExecExplain, ExitCode::Success, body)
}
