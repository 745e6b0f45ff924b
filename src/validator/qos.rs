//! QoS tier checks. A tier patch may restrict a flow's work, never expand
//! it: no raising `fanoutMax` over base, no enabling base-disabled
//! modules, no raising shadow sample rates.

use serde_json::Value;

use super::Pass;
use super::flows::FlowScope;
use super::stages::StageLayer;
use crate::codes;
use crate::jsonpath::JsonPath;
use crate::patchdoc::{QosTier, fields};

impl Pass<'_> {
    pub(crate) fn check_qos(&mut self, qos: &Value, scope: &mut FlowScope<'_>, path: &JsonPath) {
        let Some(qos_map) = self.require_object(qos, path, "'qos'") else {
            return;
        };
        for key in qos_map.keys() {
            if key != fields::TIERS {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown qos field '{key}'"),
                );
            }
        }
        let Some(tiers) = qos_map.get(fields::TIERS) else {
            return;
        };
        let tiers_path = path.key(fields::TIERS);
        let Some(tiers_map) = self.require_object(tiers, &tiers_path, "'tiers'") else {
            return;
        };

        for (tier_name, tier_json) in tiers_map {
            let tier_path = tiers_path.key(tier_name);
            if !QosTier::is_known_tier_name(tier_name) {
                self.error(
                    codes::CFG_QOS_TIER_UNKNOWN,
                    tier_path,
                    format!("unknown QoS tier '{tier_name}'"),
                );
                continue;
            }
            let Some(tier_map) = self.require_object(tier_json, &tier_path, "a tier entry") else {
                continue;
            };
            for key in tier_map.keys() {
                if key != fields::PATCH {
                    self.error(
                        codes::CFG_UNKNOWN_FIELD,
                        tier_path.key(key),
                        format!("unknown tier field '{key}'"),
                    );
                }
            }
            let Some(patch) = tier_map.get(fields::PATCH) else {
                continue;
            };
            let patch_path = tier_path.key(fields::PATCH);
            let Some(patch_map) = self.require_object(patch, &patch_path, "a tier patch") else {
                continue;
            };
            for key in patch_map.keys() {
                if !matches!(key.as_str(), fields::PARAMS | fields::STAGES) {
                    self.error(
                        codes::CFG_UNKNOWN_FIELD,
                        patch_path.key(key),
                        format!("unknown tier patch field '{key}'"),
                    );
                }
            }
            if let Some(stages) = patch_map.get(fields::STAGES) {
                let stages_path = patch_path.key(fields::STAGES);
                self.check_stages(stages, scope, StageLayer::Qos, &stages_path);
                self.check_qos_restrictions(stages, scope, &stages_path);
            }
        }
    }

    /// Compare a tier's stage patches against the flow's base stages.
    fn check_qos_restrictions(
        &mut self,
        stages: &Value,
        scope: &FlowScope<'_>,
        path: &JsonPath,
    ) {
        let Some(stage_map) = stages.as_object() else {
            return;
        };
        for (stage_name, stage_json) in stage_map {
            let stage_path = path.key(stage_name);
            let Some(stage) = stage_json.as_object() else {
                continue;
            };

            if let Some(fanout) = stage.get(fields::FANOUT_MAX).and_then(Value::as_u64)
                && let Some(base_fanout) = scope.base.stage(stage_name).and_then(|s| s.fanout_max)
                && fanout > base_fanout
            {
                self.error(
                    codes::CFG_QOS_FANOUT_INCREASE_FORBIDDEN,
                    stage_path.key(fields::FANOUT_MAX),
                    format!(
                        "QoS fanoutMax {fanout} exceeds the base stage's {base_fanout}"
                    ),
                );
            }

            let Some(modules) = stage.get(fields::MODULES).and_then(Value::as_array) else {
                continue;
            };
            for (idx, entry) in modules.iter().enumerate() {
                let Some(module) = entry.as_object() else {
                    continue;
                };
                let Some(id) = module.get(fields::ID).and_then(Value::as_str) else {
                    continue;
                };
                let module_path = stage_path.key(fields::MODULES).index(idx);
                let base_module = scope.base.module(stage_name, id);

                if module.get(fields::ENABLED).and_then(Value::as_bool) == Some(true)
                    && base_module.is_some_and(|m| !m.enabled)
                {
                    self.error(
                        codes::CFG_QOS_MODULE_ENABLE_FORBIDDEN,
                        module_path.key(fields::ENABLED),
                        format!("QoS tiers may not enable module '{id}' disabled in base"),
                    );
                }

                if let Some(sample) = module
                    .get(fields::SHADOW)
                    .and_then(|s| s.get(fields::SAMPLE))
                    .and_then(Value::as_f64)
                {
                    let bps = (sample * 10_000.0).round().max(0.0) as u32;
                    let base_bps = base_module.map_or(0, |m| m.sample_bps);
                    if bps > base_bps {
                        self.error(
                            codes::CFG_QOS_SHADOW_INCREASE_FORBIDDEN,
                            module_path.key(fields::SHADOW).key(fields::SAMPLE),
                            format!(
                                "QoS shadow sample {bps}bps exceeds the base rate of {base_bps}bps for module '{id}'"
                            ),
                        );
                    }
                }
            }
        }
    }
}
