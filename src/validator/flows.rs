//! Per-flow dispatch: blueprint lookup, accepted fields, and the base-stage
//! index the QoS and emergency checks compare against.

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::Pass;
use super::stages::StageLayer;
use crate::blueprint::FlowBlueprint;
use crate::codes;
use crate::jsonpath::JsonPath;
use crate::patchdoc::fields;

/// What the base layer declared for one module, for cross-layer checks.
#[derive(Clone, Debug)]
pub(crate) struct BaseModuleInfo {
    pub enabled: bool,
    pub sample_bps: u32,
    pub module_type: Option<String>,
}

/// What the base layer declared for one stage.
#[derive(Clone, Debug, Default)]
pub(crate) struct BaseStageInfo {
    pub fanout_max: Option<u64>,
    pub enabled_primary_count: usize,
    pub modules: FxHashMap<String, BaseModuleInfo>,
}

/// Lenient index of the flow's base `stages` patch. Structural errors are
/// reported by the stage checks; this index just skips them.
#[derive(Debug, Default)]
pub(crate) struct BaseIndex {
    stages: FxHashMap<String, BaseStageInfo>,
}

impl BaseIndex {
    pub(crate) fn stage(&self, name: &str) -> Option<&BaseStageInfo> {
        self.stages.get(name)
    }

    pub(crate) fn module(&self, stage: &str, id: &str) -> Option<&BaseModuleInfo> {
        self.stages.get(stage)?.modules.get(id)
    }

    fn build(flow_patch: &serde_json::Map<String, Value>) -> Self {
        let mut index = BaseIndex::default();
        let Some(stages) = flow_patch.get(fields::STAGES).and_then(Value::as_object) else {
            return index;
        };
        for (stage_name, stage_json) in stages {
            let mut info = BaseStageInfo::default();
            if let Some(stage) = stage_json.as_object() {
                info.fanout_max = stage.get(fields::FANOUT_MAX).and_then(Value::as_u64);
                if let Some(modules) = stage.get(fields::MODULES).and_then(Value::as_array) {
                    for entry in modules.iter().filter_map(Value::as_object) {
                        let Some(id) = entry.get(fields::ID).and_then(Value::as_str) else {
                            continue;
                        };
                        let enabled = entry
                            .get(fields::ENABLED)
                            .and_then(Value::as_bool)
                            .unwrap_or(true);
                        let sample_bps = entry
                            .get(fields::SHADOW)
                            .and_then(|s| s.get(fields::SAMPLE))
                            .and_then(Value::as_f64)
                            .map(|sample| (sample * 10_000.0).round().max(0.0) as u32)
                            .unwrap_or(0);
                        let is_shadow = entry.get(fields::SHADOW).is_some();
                        if enabled && !is_shadow {
                            info.enabled_primary_count += 1;
                        }
                        info.modules.insert(
                            id.to_string(),
                            BaseModuleInfo {
                                enabled,
                                sample_bps,
                                module_type: entry
                                    .get(fields::USE)
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            },
                        );
                    }
                }
            }
            index.stages.insert(stage_name.clone(), info);
        }
        index
    }
}

/// First occurrence of a module id within the flow, for duplicate
/// reporting.
#[derive(Debug)]
pub(crate) struct FirstOccurrence {
    pub stage: String,
    pub path: JsonPath,
    pub reported: bool,
}

/// State carried while validating one flow.
pub(crate) struct FlowScope<'a> {
    pub flow_name: &'a str,
    pub blueprint: Option<&'a FlowBlueprint>,
    pub base: BaseIndex,
    pub module_ids: FxHashMap<String, FirstOccurrence>,
    /// Modules first declared by a non-base layer (id → declared type), so
    /// later overlays can override them without re-stating `use`.
    pub overlay_ids: FxHashMap<String, Option<String>>,
}

impl Pass<'_> {
    pub(crate) fn check_flow(&mut self, flow_name: &str, flow_patch: &Value, path: &JsonPath) {
        let blueprint = self.registry.get(flow_name);
        if blueprint.is_none() {
            // Structural checks continue so the operator still sees the
            // rest of the findings.
            self.error(
                codes::CFG_FLOW_NOT_REGISTERED,
                path.clone(),
                format!("flow '{flow_name}' is not registered"),
            );
        }
        let Some(flow_map) = self.require_object(flow_patch, path, "a flow patch") else {
            return;
        };

        for key in flow_map.keys() {
            if !matches!(
                key.as_str(),
                fields::PARAMS
                    | fields::EXPERIMENTS
                    | fields::EMERGENCY
                    | fields::QOS
                    | fields::STAGES
            ) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown flow field '{key}'"),
                );
            }
        }

        let mut scope = FlowScope {
            flow_name,
            blueprint,
            base: BaseIndex::build(flow_map),
            module_ids: FxHashMap::default(),
            overlay_ids: FxHashMap::default(),
        };

        if let Some(params) = flow_map.get(fields::PARAMS) {
            self.check_flow_params(params, &scope, &path.key(fields::PARAMS));
        }
        if let Some(stages) = flow_map.get(fields::STAGES) {
            self.check_stages(
                stages,
                &mut scope,
                StageLayer::Base,
                &path.key(fields::STAGES),
            );
        }
        if let Some(experiments) = flow_map.get(fields::EXPERIMENTS) {
            self.check_experiments(experiments, &mut scope, &path.key(fields::EXPERIMENTS));
        }
        if let Some(qos) = flow_map.get(fields::QOS) {
            self.check_qos(qos, &mut scope, &path.key(fields::QOS));
        }
        if let Some(emergency) = flow_map.get(fields::EMERGENCY) {
            self.check_emergency(emergency, &scope, &path.key(fields::EMERGENCY));
        }
    }
}
