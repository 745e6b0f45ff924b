//! Overlay evaluation: `(patch, request) → FlowPatchEvaluation`.
//!
//! Applies the flow's overlays in the invariant order **base → experiments
//! (array order) → qos → emergency**, merges modules by id, drops expired
//! emergency overlays, and partitions each stage into primary and shadow
//! modules. The evaluator is infallible over structurally valid input; run
//! the [`crate::validator`] first and anything of the wrong shape here is
//! skipped silently.

pub mod evaluation;
mod merge;

pub use evaluation::{FlowPatchEvaluation, ModulePatch, OverlayApplied, OverlayLayer, StagePatch};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::instrument;

use crate::codes;
use crate::context::RequestOptions;
use crate::patchdoc::{QosTier, fields};
use merge::WorkingStage;

/// Inputs for one overlay evaluation.
#[derive(Clone, Copy, Debug)]
pub struct OverlayInputs<'a> {
    pub flow_name: &'a str,
    /// The parsed patch document root.
    pub patch: &'a Value,
    pub options: &'a RequestOptions,
    pub qos_tier: QosTier,
    /// Timestamp of the config snapshot, if known. Emergency TTLs cannot
    /// expire without it.
    pub config_timestamp_utc: Option<DateTime<Utc>>,
    /// Caller-supplied wall clock.
    pub now: DateTime<Utc>,
    pub config_version: u64,
}

/// Pure, deterministic overlay evaluator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayEvaluator;

impl OverlayEvaluator {
    pub fn new() -> Self {
        OverlayEvaluator
    }

    /// Produce the per-request effective stage patch for one flow.
    #[instrument(level = "debug", skip_all, fields(flow = inputs.flow_name, tier = %inputs.qos_tier))]
    pub fn evaluate(&self, inputs: OverlayInputs<'_>) -> FlowPatchEvaluation {
        let Some(flow_patch) = inputs
            .patch
            .get(fields::FLOWS)
            .and_then(|flows| flows.get(inputs.flow_name))
            .and_then(Value::as_object)
        else {
            return FlowPatchEvaluation::empty(inputs.flow_name, inputs.config_version);
        };

        let mut stages = StageSet::default();
        let mut overlays_applied = vec![OverlayApplied::base()];
        let mut emergency_ignored = None;

        // Base layer.
        if let Some(base_stages) = flow_patch.get(fields::STAGES) {
            stages.apply_layer(base_stages, OverlayLayer::Base);
        }

        // Experiment layers, in array order, gated on variant assignment.
        if let Some(experiments) = flow_patch.get(fields::EXPERIMENTS).and_then(Value::as_array) {
            for experiment in experiments {
                let Some((layer, variant, patch)) = experiment_parts(experiment) else {
                    continue;
                };
                if inputs.options.variants.get(layer).map(String::as_str) != Some(variant) {
                    continue;
                }
                if let Some(stage_patches) = patch.get(fields::STAGES) {
                    stages.apply_layer(stage_patches, OverlayLayer::Experiment);
                }
                overlays_applied.push(OverlayApplied::experiment(layer, variant));
            }
        }

        // QoS tier layer.
        if let Some(tier_patch) = qos_tier_patch(flow_patch, inputs.qos_tier) {
            if let Some(stage_patches) = tier_patch.get(fields::STAGES) {
                stages.apply_layer(stage_patches, OverlayLayer::Qos);
            }
            overlays_applied.push(OverlayApplied::qos(inputs.qos_tier));
        }

        // Emergency layer, unless its TTL already elapsed.
        if let Some(emergency) = flow_patch.get(fields::EMERGENCY).and_then(Value::as_object) {
            if emergency_expired(emergency, inputs.config_timestamp_utc, inputs.now) {
                emergency_ignored = Some(codes::EMERGENCY_TTL_EXPIRED.to_string());
            } else if let Some(patch) = emergency.get(fields::PATCH) {
                if let Some(stage_patches) = patch.get(fields::STAGES) {
                    stages.apply_layer(stage_patches, OverlayLayer::Emergency);
                }
                overlays_applied.push(OverlayApplied::emergency());
            }
        }

        FlowPatchEvaluation {
            flow_name: inputs.flow_name.to_string(),
            config_version: inputs.config_version,
            stages: stages.finish(),
            overlays_applied,
            emergency_overlay_ignored_reason_code: emergency_ignored,
            flow_patch: Some(Value::Object(flow_patch.clone())),
        }
    }
}

/// Stage patches in deterministic order: base stages in codepoint order of
/// their names, overlay-introduced stages after in first-observed order.
#[derive(Default)]
struct StageSet {
    order: Vec<String>,
    stages: rustc_hash::FxHashMap<String, WorkingStage>,
}

impl StageSet {
    fn apply_layer(&mut self, stage_patches: &Value, layer: OverlayLayer) {
        let Some(object) = stage_patches.as_object() else {
            return;
        };
        for (stage_name, stage_json) in object {
            if !self.stages.contains_key(stage_name) {
                // The emergency layer may only touch existing stages.
                if layer == OverlayLayer::Emergency {
                    continue;
                }
                self.order.push(stage_name.clone());
                self.stages
                    .insert(stage_name.clone(), WorkingStage::default());
            }
            self.stages
                .get_mut(stage_name)
                .expect("inserted above")
                .apply(stage_json, layer);
        }
    }

    fn finish(mut self) -> Vec<StagePatch> {
        self.order
            .iter()
            .map(|name| {
                let working = self.stages.remove(name).expect("tracked in order");
                let (shadow_modules, modules) = working
                    .modules
                    .into_iter()
                    .partition(|m| m.shadow_sample.is_some());
                StagePatch {
                    stage_name: name.clone(),
                    has_fanout_max: working.has_fanout_max,
                    fanout_max: working.fanout_max,
                    modules,
                    shadow_modules,
                }
            })
            .collect()
    }
}

fn experiment_parts(experiment: &Value) -> Option<(&str, &str, &Value)> {
    let object = experiment.as_object()?;
    let layer = object.get(fields::LAYER)?.as_str()?;
    let variant = object.get(fields::VARIANT)?.as_str()?;
    let patch = object.get(fields::PATCH)?;
    patch.as_object()?;
    Some((layer, variant, patch))
}

fn qos_tier_patch<'a>(
    flow_patch: &'a serde_json::Map<String, Value>,
    tier: QosTier,
) -> Option<&'a Value> {
    flow_patch
        .get(fields::QOS)?
        .get(fields::TIERS)?
        .get(tier.as_str())?
        .get(fields::PATCH)
}

/// TTL check shared with the params resolver: an emergency overlay is
/// expired when `configTimestampUtc + ttl_minutes ≤ now`. Without a config
/// timestamp the TTL cannot elapse.
pub(crate) fn emergency_expired(
    emergency: &serde_json::Map<String, Value>,
    config_timestamp_utc: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(timestamp) = config_timestamp_utc else {
        return false;
    };
    let Some(ttl_minutes) = emergency.get(fields::TTL_MINUTES).and_then(Value::as_i64) else {
        return false;
    };
    if ttl_minutes <= 0 {
        return false;
    }
    timestamp + Duration::minutes(ttl_minutes) <= now
}
