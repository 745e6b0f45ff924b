//! Preview matrix: what a patch would select across a grid of request
//! scenarios, without executing anything.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::envelope::{ExitCode, ToolKind, ToolOutput, seal};
use crate::blueprint::{FlowBlueprint, SelectorRegistry};
use crate::context::RequestOptions;
use crate::decision::StageDecisionComputer;
use crate::hashing::format_hash;
use crate::overlay::{OverlayEvaluator, OverlayInputs};
use crate::params::{ParamsInputs, ParamsResolver};
use crate::patchdoc::QosTier;

/// One cell of the preview grid: a variant assignment plus a QoS tier.
#[derive(Clone, Debug)]
pub struct PreviewScenario {
    pub label: String,
    pub options: RequestOptions,
    pub qos_tier: QosTier,
}

impl PreviewScenario {
    pub fn new(label: impl Into<String>, options: RequestOptions, qos_tier: QosTier) -> Self {
        PreviewScenario {
            label: label.into(),
            options,
            qos_tier,
        }
    }
}

/// Evaluate the patch once per scenario and emit the `preview_matrix`
/// envelope: selected and shadow-sampled module ids per stage plus the
/// effective params hash.
#[must_use]
pub fn preview_matrix_output(
    blueprint: &FlowBlueprint,
    selectors: &SelectorRegistry,
    patch: &Value,
    scenarios: &[PreviewScenario],
    config_timestamp_utc: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config_version: u64,
) -> ToolOutput {
    let evaluator = OverlayEvaluator::new();
    let resolver = ParamsResolver::new();
    let computer = StageDecisionComputer::new(blueprint, selectors);

    let cells: Vec<Value> = scenarios
        .iter()
        .map(|scenario| {
            let evaluation = evaluator.evaluate(OverlayInputs {
                flow_name: &blueprint.name,
                patch,
                options: &scenario.options,
                qos_tier: scenario.qos_tier,
                config_timestamp_utc,
                now,
                config_version,
            });
            let decisions = computer.compute(&evaluation, &scenario.options, None);
            let params = resolver.resolve(ParamsInputs {
                default_params: &blueprint.default_params,
                flow_patch: evaluation.flow_patch.as_ref(),
                variants: &scenario.options.variants,
                qos_tier: scenario.qos_tier,
                config_timestamp_utc,
                now,
            });

            let stages: Vec<Value> = decisions
                .iter()
                .map(|d| {
                    json!({
                        "stage": d.stage_name,
                        "selected": d.selected_ids().collect::<Vec<_>>(),
                        "shadowSampled": d.sampled_shadow_ids().collect::<Vec<_>>(),
                    })
                })
                .collect();
            json!({
                "label": scenario.label,
                "qosTier": scenario.qos_tier.as_str(),
                "paramsHash": format_hash(params.hash),
                "stages": stages,
            })
        })
        .collect();

    let mut body = Map::new();
    body.insert(
        "flow".to_string(),
        Value::String(blueprint.name.clone()),
    );
    body.insert("configVersion".to_string(), Value::from(config_version));
    body.insert("cells".to_string(), Value::Array(cells));
    seal(ToolKind::PreviewMatrix, ExitCode::Success, body)
}
