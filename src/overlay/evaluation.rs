//! Immutable results of overlay evaluation.
//!
//! A [`FlowPatchEvaluation`] is constructed once per `(request, flow)` and
//! treated as immutable afterwards: the ordered stage patches, which
//! overlays applied, and the raw flow-patch sub-element kept for params
//! resolution.

use serde::Serialize;
use serde_json::Value;

use crate::gates::GateExpr;
use crate::patchdoc::QosTier;

/// Which overlay layer a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayLayer {
    Default,
    Base,
    Experiment,
    Qos,
    Emergency,
}

impl OverlayLayer {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayLayer::Default => "default",
            OverlayLayer::Base => "base",
            OverlayLayer::Experiment => "experiment",
            OverlayLayer::Qos => "qos",
            OverlayLayer::Emergency => "emergency",
        }
    }
}

/// One applied overlay, in application order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OverlayApplied {
    pub layer: OverlayLayer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos_tier: Option<QosTier>,
}

impl OverlayApplied {
    pub fn base() -> Self {
        OverlayApplied {
            layer: OverlayLayer::Base,
            experiment_layer: None,
            experiment_variant: None,
            qos_tier: None,
        }
    }

    pub fn experiment(layer: impl Into<String>, variant: impl Into<String>) -> Self {
        OverlayApplied {
            layer: OverlayLayer::Experiment,
            experiment_layer: Some(layer.into()),
            experiment_variant: Some(variant.into()),
            qos_tier: None,
        }
    }

    pub fn qos(tier: QosTier) -> Self {
        OverlayApplied {
            layer: OverlayLayer::Qos,
            experiment_layer: None,
            experiment_variant: None,
            qos_tier: Some(tier),
        }
    }

    pub fn emergency() -> Self {
        OverlayApplied {
            layer: OverlayLayer::Emergency,
            experiment_layer: None,
            experiment_variant: None,
            qos_tier: None,
        }
    }
}

/// One module after all overlays merged.
#[derive(Clone, Debug, PartialEq)]
pub struct ModulePatch {
    pub id: String,
    /// The module type id (the patch's `use` field); immutable across
    /// overlays.
    pub module_type: String,
    /// Module args (`with`), taken from the declaring layer.
    pub args: Value,
    pub enabled: bool,
    pub priority: i32,
    pub gate: Option<GateExpr>,
    /// Present iff the module is a shadow module.
    pub shadow_sample: Option<f64>,
    pub limit_key: Option<String>,
    pub memo_key: Option<String>,
    /// Position in the stage's merged declaration order.
    pub declared_index: usize,
    /// Layer that first declared this module.
    pub introduced_by: OverlayLayer,
    /// Set when the emergency overlay disabled the module, so explain can
    /// attribute the skip.
    pub disabled_by_emergency: bool,
}

impl ModulePatch {
    /// Shadow sample rate in basis points: `round(sample × 10000)`.
    #[must_use]
    pub fn sample_bps(&self) -> Option<u32> {
        self.shadow_sample
            .map(|sample| (sample * 10_000.0).round().clamp(0.0, u32::MAX as f64) as u32)
    }
}

/// One stage after all overlays merged, primaries and shadows partitioned.
#[derive(Clone, Debug, PartialEq)]
pub struct StagePatch {
    pub stage_name: String,
    pub has_fanout_max: bool,
    /// Meaningful only when `has_fanout_max` is true.
    pub fanout_max: u32,
    /// Primary modules, base-declared order first, overlay additions after.
    pub modules: Vec<ModulePatch>,
    /// Shadow modules (carry a `shadow` field), same ordering rule.
    pub shadow_modules: Vec<ModulePatch>,
}

impl StagePatch {
    /// All modules of the stage regardless of partition, in declared order.
    pub fn all_modules(&self) -> impl Iterator<Item = &ModulePatch> {
        let mut combined: Vec<&ModulePatch> =
            self.modules.iter().chain(self.shadow_modules.iter()).collect();
        combined.sort_by_key(|m| m.declared_index);
        combined.into_iter()
    }
}

/// The per-request effective stage patch for one flow.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowPatchEvaluation {
    pub flow_name: String,
    pub config_version: u64,
    pub stages: Vec<StagePatch>,
    /// Applied overlays, always a subsequence of
    /// `[base, experiment*, qos?, emergency?]`.
    pub overlays_applied: Vec<OverlayApplied>,
    /// `EMERGENCY_TTL_EXPIRED` when an emergency overlay was present but
    /// dropped.
    pub emergency_overlay_ignored_reason_code: Option<String>,
    /// The raw `flows.<name>` sub-element, kept for params resolution.
    pub flow_patch: Option<Value>,
}

impl FlowPatchEvaluation {
    /// An evaluation with no stages, for flows absent from the patch.
    pub fn empty(flow_name: impl Into<String>, config_version: u64) -> Self {
        FlowPatchEvaluation {
            flow_name: flow_name.into(),
            config_version,
            stages: Vec::new(),
            overlays_applied: Vec::new(),
            emergency_overlay_ignored_reason_code: None,
            flow_patch: None,
        }
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StagePatch> {
        self.stages.iter().find(|s| s.stage_name == name)
    }
}
