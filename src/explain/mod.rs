//! Deterministic explain/diff/preview serializers.
//!
//! Three universal rules apply to every emitter here: maps are written with
//! codepoint-sorted keys (the canonical writer), every output passes
//! through the redactor, and every list is emitted in a declared canonical
//! order. Findings sort `(severity, code, path, message)`; stage diffs
//! `(flow, stage, moduleId, kind, path)`; params sources by path.

pub mod diff;
pub mod envelope;
pub mod exec;
pub mod preview;
pub mod redact;

pub use diff::{DiffKind, DiffRecord, diff_output};
pub use envelope::{
    ExitCode, TOOLING_JSON_V1, TOOLING_JSON_V3, ToolKind, ToolOutput, input_error_output,
    internal_error_output,
};
pub use exec::exec_explain_output;
pub use preview::{PreviewScenario, preview_matrix_output};
pub use redact::{REDACTED, key_is_sensitive, redact_all_leaves, redact_value};

use serde_json::{Map, Value, json};

use crate::decision::{ModuleDecision, Outcome, StageDecision};
use crate::findings::ValidationReport;
use crate::hashing::format_hash;
use crate::overlay::{FlowPatchEvaluation, ModulePatch, OverlayApplied, StagePatch};
use crate::params::{ResolvedParams, SourceEntry};
use envelope::seal;

/// How much detail explain output carries. Source tracking is emitted only
/// at `Full`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExplainLevel {
    Summary,
    Full,
}

/// `validate` envelope: exit 2 on any error-severity finding.
#[must_use]
pub fn validate_output(report: &ValidationReport) -> ToolOutput {
    let mut body = Map::new();
    body.insert("is_valid".to_string(), Value::Bool(report.is_valid()));
    body.insert("findings".to_string(), findings_json(report));
    let exit = if report.is_valid() {
        ExitCode::Success
    } else {
        ExitCode::InputInvalid
    };
    seal(ToolKind::Validate, exit, body)
}

/// `explain` envelope: effective params (all leaves redacted) plus a
/// per-stage selection summary.
#[must_use]
pub fn explain_output(
    evaluation: &FlowPatchEvaluation,
    decisions: &[StageDecision],
    params: &ResolvedParams,
    level: ExplainLevel,
) -> ToolOutput {
    let mut body = evaluation_header(evaluation);
    body.insert("params".to_string(), params_json(params, level));
    let stages: Vec<Value> = decisions
        .iter()
        .map(|d| {
            json!({
                "stage": d.stage_name,
                "fanoutEffective": d.fanout_effective,
                "selected": d.selected_ids().collect::<Vec<_>>(),
                "shadowSampled": d.sampled_shadow_ids().collect::<Vec<_>>(),
            })
        })
        .collect();
    body.insert("stages".to_string(), Value::Array(stages));
    seal(ToolKind::Explain, ExitCode::Success, body)
}

/// `explain_patch` envelope: the evaluation itself, without decisions.
#[must_use]
pub fn explain_patch_output(evaluation: &FlowPatchEvaluation) -> ToolOutput {
    let mut body = evaluation_header(evaluation);
    let stages: Vec<Value> = evaluation
        .stages
        .iter()
        .map(|s| stage_patch_json(s, false))
        .collect();
    body.insert("stages".to_string(), Value::Array(stages));
    seal(ToolKind::ExplainPatch, ExitCode::Success, body)
}

/// `explain_patch_rich` envelope (v3): evaluation, per-module decisions
/// with gate verdicts, and full params provenance.
#[must_use]
pub fn explain_patch_rich_output(
    evaluation: &FlowPatchEvaluation,
    decisions: &[StageDecision],
    params: &ResolvedParams,
) -> ToolOutput {
    let mut body = evaluation_header(evaluation);
    let stages: Vec<Value> = evaluation
        .stages
        .iter()
        .map(|s| stage_patch_json(s, true))
        .collect();
    body.insert("stages".to_string(), Value::Array(stages));
    body.insert(
        "decisions".to_string(),
        Value::Array(decisions.iter().map(stage_decision_json).collect()),
    );
    body.insert(
        "params".to_string(),
        params_json(params, ExplainLevel::Full),
    );
    seal(ToolKind::ExplainPatchRich, ExitCode::Success, body)
}

// ---------------------------------------------------------------------------
// Shared fragment builders
// ---------------------------------------------------------------------------

pub(crate) fn evaluation_header(evaluation: &FlowPatchEvaluation) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "flow".to_string(),
        Value::String(evaluation.flow_name.clone()),
    );
    body.insert(
        "configVersion".to_string(),
        Value::from(evaluation.config_version),
    );
    body.insert(
        "overlaysApplied".to_string(),
        overlays_json(&evaluation.overlays_applied),
    );
    if let Some(reason) = &evaluation.emergency_overlay_ignored_reason_code {
        body.insert(
            "emergencyOverlayIgnoredReasonCode".to_string(),
            Value::String(reason.clone()),
        );
    }
    body
}

pub(crate) fn findings_json(report: &ValidationReport) -> Value {
    Value::Array(
        report
            .sorted_findings()
            .into_iter()
            .map(|f| {
                json!({
                    "severity": f.severity.as_str(),
                    "code": f.code,
                    "path": f.json_path,
                    "message": f.message,
                })
            })
            .collect(),
    )
}

pub(crate) fn overlays_json(overlays: &[OverlayApplied]) -> Value {
    Value::Array(
        overlays
            .iter()
            .map(|overlay| {
                let mut entry = Map::new();
                entry.insert(
                    "layer".to_string(),
                    Value::String(overlay.layer.as_str().to_string()),
                );
                if let Some(layer) = &overlay.experiment_layer {
                    entry.insert("experimentLayer".to_string(), Value::String(layer.clone()));
                }
                if let Some(variant) = &overlay.experiment_variant {
                    entry.insert(
                        "experimentVariant".to_string(),
                        Value::String(variant.clone()),
                    );
                }
                if let Some(tier) = overlay.qos_tier {
                    entry.insert(
                        "qosTier".to_string(),
                        Value::String(tier.as_str().to_string()),
                    );
                }
                Value::Object(entry)
            })
            .collect(),
    )
}

pub(crate) fn stage_patch_json(stage: &StagePatch, rich: bool) -> Value {
    let mut entry = Map::new();
    entry.insert(
        "stage".to_string(),
        Value::String(stage.stage_name.clone()),
    );
    entry.insert(
        "hasFanoutMax".to_string(),
        Value::Bool(stage.has_fanout_max),
    );
    if stage.has_fanout_max {
        entry.insert("fanoutMax".to_string(), Value::from(stage.fanout_max));
    }
    entry.insert(
        "modules".to_string(),
        Value::Array(stage.modules.iter().map(|m| module_patch_json(m, rich)).collect()),
    );
    entry.insert(
        "shadowModules".to_string(),
        Value::Array(
            stage
                .shadow_modules
                .iter()
                .map(|m| module_patch_json(m, rich))
                .collect(),
        ),
    );
    Value::Object(entry)
}

pub(crate) fn module_patch_json(module: &ModulePatch, rich: bool) -> Value {
    let mut entry = Map::new();
    entry.insert("id".to_string(), Value::String(module.id.clone()));
    entry.insert(
        "use".to_string(),
        Value::String(module.module_type.clone()),
    );
    entry.insert("enabled".to_string(), Value::Bool(module.enabled));
    entry.insert("priority".to_string(), Value::from(module.priority));
    entry.insert(
        "introducedBy".to_string(),
        Value::String(module.introduced_by.as_str().to_string()),
    );
    if let Some(sample) = module.shadow_sample {
        entry.insert("shadow".to_string(), json!({ "sample": sample }));
    }
    if let Some(limit_key) = &module.limit_key {
        entry.insert("limitKey".to_string(), Value::String(limit_key.clone()));
    }
    if let Some(memo_key) = &module.memo_key {
        entry.insert("memoKey".to_string(), Value::String(memo_key.clone()));
    }
    if module.disabled_by_emergency {
        entry.insert("disabledByEmergency".to_string(), Value::Bool(true));
    }
    if rich {
        entry.insert("with".to_string(), module.args.clone());
        if let Some(gate) = &module.gate {
            entry.insert("gate".to_string(), gate.to_json());
        }
    }
    Value::Object(entry)
}

pub(crate) fn stage_decision_json(decision: &StageDecision) -> Value {
    json!({
        "stage": decision.stage_name,
        "fanoutEffective": decision.fanout_effective,
        "modules": decision.modules.iter().map(module_decision_json).collect::<Vec<_>>(),
        "shadowModules": decision
            .shadow_modules
            .iter()
            .map(module_decision_json)
            .collect::<Vec<_>>(),
    })
}

pub(crate) fn module_decision_json(decision: &ModuleDecision) -> Value {
    let mut entry = Map::new();
    entry.insert("id".to_string(), Value::String(decision.module_id.clone()));
    entry.insert(
        "use".to_string(),
        Value::String(decision.module_type.clone()),
    );
    entry.insert(
        "outcome".to_string(),
        Value::String(
            match decision.outcome {
                Outcome::Selected => "selected",
                Outcome::Skipped => "skipped",
            }
            .to_string(),
        ),
    );
    entry.insert("code".to_string(), Value::String(decision.code.to_string()));
    if let Some(gate) = &decision.gate {
        let mut gate_entry = Map::new();
        gate_entry.insert("allowed".to_string(), Value::Bool(gate.allowed));
        gate_entry.insert("code".to_string(), Value::String(gate.code.clone()));
        gate_entry.insert(
            "reasonCode".to_string(),
            Value::String(gate.reason_code.clone()),
        );
        if let Some(selector) = &gate.selector {
            gate_entry.insert("selector".to_string(), Value::String(selector.clone()));
        }
        entry.insert("gate".to_string(), Value::Object(gate_entry));
    }
    if decision.disabled_by_emergency {
        entry.insert("disabledByEmergency".to_string(), Value::Bool(true));
    }
    Value::Object(entry)
}

pub(crate) fn params_json(params: &ResolvedParams, level: ExplainLevel) -> Value {
    let mut entry = Map::new();
    entry.insert(
        "effective".to_string(),
        redact_all_leaves(&params.effective),
    );
    entry.insert(
        "hash".to_string(),
        Value::String(format_hash(params.hash)),
    );
    if params.emergency_dropped {
        entry.insert("emergencyDropped".to_string(), Value::Bool(true));
    }
    if level == ExplainLevel::Full {
        entry.insert(
            "sources".to_string(),
            Value::Array(params.sources.iter().map(source_entry_json).collect()),
        );
    }
    Value::Object(entry)
}

pub(crate) fn source_entry_json(source: &SourceEntry) -> Value {
    let mut entry = Map::new();
    entry.insert("path".to_string(), Value::String(source.path.clone()));
    entry.insert(
        "layer".to_string(),
        Value::String(source.layer.as_str().to_string()),
    );
    if let Some(layer) = &source.experiment_layer {
        entry.insert("experimentLayer".to_string(), Value::String(layer.clone()));
    }
    if let Some(variant) = &source.experiment_variant {
        entry.insert(
            "experimentVariant".to_string(),
            Value::String(variant.clone()),
        );
    }
    if let Some(tier) = source.qos_tier {
        entry.insert(
            "qosTier".to_string(),
            Value::String(tier.as_str().to_string()),
        );
    }
    Value::Object(entry)
}
