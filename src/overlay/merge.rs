//! Module-level merge rules shared by every overlay layer.
//!
//! Modules are matched by id. An overlay may add a new id (appended after
//! base modules in first-observed order) or override
//! `enabled`/`priority`/`gate`/`shadow`/`limitKey`/`memoKey` on an existing
//! one. `use` and `with` belong to the declaring layer; the validator
//! rejects attempts to change `use` in non-base layers, and the evaluator
//! ignores them.

use serde_json::Value;

use super::evaluation::{ModulePatch, OverlayLayer};
use crate::gates::GateExpr;
use crate::patchdoc::fields;

/// A stage's modules while overlays are being folded in.
#[derive(Debug, Default)]
pub(crate) struct WorkingStage {
    pub has_fanout_max: bool,
    pub fanout_max: u32,
    pub modules: Vec<ModulePatch>,
}

impl WorkingStage {
    fn find_mut(&mut self, id: &str) -> Option<&mut ModulePatch> {
        self.modules.iter_mut().find(|m| m.id == id)
    }

    /// Fold one stage-patch JSON object into this working stage.
    ///
    /// The evaluator assumes the validator ran first; anything of the wrong
    /// shape is skipped, never an error.
    pub fn apply(&mut self, stage_json: &Value, layer: OverlayLayer) {
        let Some(stage) = stage_json.as_object() else {
            return;
        };
        if let Some(fanout) = stage.get(fields::FANOUT_MAX).and_then(Value::as_u64) {
            self.has_fanout_max = true;
            self.fanout_max = fanout.min(u64::from(u32::MAX)) as u32;
        }
        let Some(modules) = stage.get(fields::MODULES).and_then(Value::as_array) else {
            return;
        };
        for entry in modules {
            self.apply_module(entry, layer);
        }
    }

    fn apply_module(&mut self, entry: &Value, layer: OverlayLayer) {
        let Some(object) = entry.as_object() else {
            return;
        };
        let Some(id) = object.get(fields::ID).and_then(Value::as_str) else {
            return;
        };

        if let Some(existing) = self.find_mut(id) {
            override_module(existing, object, layer);
            return;
        }

        // The emergency layer may only disable existing modules.
        if layer == OverlayLayer::Emergency {
            return;
        }

        let Some(module_type) = object.get(fields::USE).and_then(Value::as_str) else {
            return;
        };
        let declared_index = self.modules.len();
        let mut module = ModulePatch {
            id: id.to_string(),
            module_type: module_type.to_string(),
            args: object
                .get(fields::WITH)
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            enabled: true,
            priority: 0,
            gate: None,
            shadow_sample: None,
            limit_key: None,
            memo_key: None,
            declared_index,
            introduced_by: layer,
            disabled_by_emergency: false,
        };
        override_module(&mut module, object, layer);
        self.modules.push(module);
    }
}

fn override_module(
    module: &mut ModulePatch,
    object: &serde_json::Map<String, Value>,
    layer: OverlayLayer,
) {
    if layer == OverlayLayer::Emergency {
        // Only `enabled: false` takes effect from an emergency overlay.
        if object.get(fields::ENABLED).and_then(Value::as_bool) == Some(false) {
            module.enabled = false;
            module.disabled_by_emergency = true;
        }
        return;
    }
    if let Some(enabled) = object.get(fields::ENABLED).and_then(Value::as_bool) {
        module.enabled = enabled;
    }
    if let Some(priority) = object.get(fields::PRIORITY).and_then(Value::as_i64) {
        module.priority = priority.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    }
    if let Some(gate_json) = object.get(fields::GATE)
        && let Ok(gate) = GateExpr::parse(gate_json)
    {
        module.gate = Some(gate);
    }
    if let Some(sample) = object
        .get(fields::SHADOW)
        .and_then(|shadow| shadow.get(fields::SAMPLE))
        .and_then(Value::as_f64)
    {
        module.shadow_sample = Some(sample);
    }
    if let Some(limit_key) = object.get(fields::LIMIT_KEY).and_then(Value::as_str) {
        module.limit_key = Some(limit_key.to_string());
    }
    if let Some(memo_key) = object.get(fields::MEMO_KEY).and_then(Value::as_str) {
        module.memo_key = Some(memo_key.to_string());
    }
}
