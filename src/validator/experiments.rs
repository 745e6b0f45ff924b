//! Experiment checks: structure, layer ownership, and cross-layer
//! conflicts.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use super::Pass;
use super::flows::FlowScope;
use super::stages::StageLayer;
use crate::codes;
use crate::jsonpath::{JsonPath, join_dotted};
use crate::patchdoc::fields;

/// First experiment layer to touch a contended key, for conflict
/// reporting.
struct FirstTouch {
    layer: String,
    path: JsonPath,
    reported: bool,
}

/// Tracks param paths, module ids, and stage fanouts touched across the
/// flow's experiments. Two *distinct* layers on the same key is a
/// conflict; two variants of the same layer are not.
#[derive(Default)]
struct ConflictTracker {
    touched: FxHashMap<String, FirstTouch>,
}

impl Pass<'_> {
    pub(crate) fn check_experiments(
        &mut self,
        experiments: &Value,
        scope: &mut FlowScope<'_>,
        path: &JsonPath,
    ) {
        let Some(entries) = experiments.as_array() else {
            self.error(
                codes::CFG_FIELD_TYPE_INVALID,
                path.clone(),
                "'experiments' must be an array",
            );
            return;
        };

        let mut seen_pairs: FxHashSet<(String, String)> = FxHashSet::default();
        let mut conflicts = ConflictTracker::default();

        for (idx, entry) in entries.iter().enumerate() {
            let entry_path = path.index(idx);
            let Some(experiment) = self.require_object(entry, &entry_path, "an experiment") else {
                continue;
            };
            for key in experiment.keys() {
                if !matches!(
                    key.as_str(),
                    fields::LAYER | fields::VARIANT | fields::PATCH
                ) {
                    self.error(
                        codes::CFG_UNKNOWN_FIELD,
                        entry_path.key(key),
                        format!("unknown experiment field '{key}'"),
                    );
                }
            }

            let layer = non_empty_str(experiment.get(fields::LAYER));
            if layer.is_none() {
                self.error(
                    codes::CFG_EXPERIMENT_FIELD_MISSING,
                    entry_path.key(fields::LAYER),
                    "experiments require a non-empty 'layer'",
                );
            }
            let variant = non_empty_str(experiment.get(fields::VARIANT));
            if variant.is_none() {
                self.error(
                    codes::CFG_EXPERIMENT_FIELD_MISSING,
                    entry_path.key(fields::VARIANT),
                    "experiments require a non-empty 'variant'",
                );
            }
            if let (Some(layer), Some(variant)) = (layer, variant)
                && !seen_pairs.insert((layer.to_string(), variant.to_string()))
            {
                self.error(
                    codes::CFG_EXPERIMENT_DUPLICATE,
                    entry_path.clone(),
                    format!("duplicate experiment for layer '{layer}', variant '{variant}'"),
                );
            }

            let patch_path = entry_path.key(fields::PATCH);
            let patch = match experiment.get(fields::PATCH) {
                None => {
                    self.error(
                        codes::CFG_EXPERIMENT_FIELD_MISSING,
                        patch_path,
                        "experiments require a 'patch' object",
                    );
                    continue;
                }
                Some(patch) if !patch.is_object() => {
                    self.error(
                        codes::CFG_EXPERIMENT_PATCH_INVALID,
                        patch_path,
                        "experiment 'patch' must be a JSON object",
                    );
                    continue;
                }
                Some(patch) => patch.as_object().expect("checked above"),
            };

            for key in patch.keys() {
                match key.as_str() {
                    fields::PARAMS | fields::STAGES => {}
                    fields::EXPERIMENTS | fields::EMERGENCY | fields::QOS => self.error(
                        codes::CFG_EXPERIMENT_STRUCTURAL_OVERRIDE,
                        patch_path.key(key),
                        format!("experiment patches may not override '{key}'"),
                    ),
                    other => self.error(
                        codes::CFG_UNKNOWN_FIELD,
                        patch_path.key(key),
                        format!("unknown experiment patch field '{other}'"),
                    ),
                }
            }

            if let Some(params) = patch.get(fields::PARAMS) {
                self.check_experiment_params(
                    params,
                    scope,
                    layer,
                    &mut conflicts,
                    &patch_path.key(fields::PARAMS),
                );
            }
            if let Some(stages) = patch.get(fields::STAGES) {
                let stages_path = patch_path.key(fields::STAGES);
                self.check_stages(stages, scope, StageLayer::Experiment, &stages_path);
                self.check_experiment_stage_ownership(
                    stages,
                    scope,
                    layer,
                    &mut conflicts,
                    &stages_path,
                );
            }
        }
    }

    fn check_experiment_params(
        &mut self,
        params: &Value,
        scope: &FlowScope<'_>,
        layer: Option<&str>,
        conflicts: &mut ConflictTracker,
        path: &JsonPath,
    ) {
        if self.require_object(params, path, "'params'").is_none() {
            return;
        }
        let mut leaves = Vec::new();
        collect_leaf_paths(params, "", path, &mut leaves);
        let Some(layer) = layer else {
            return;
        };
        for (dotted, leaf_path) in leaves {
            if let Some(blueprint) = scope.blueprint
                && !blueprint.ownership.owns_param_path(layer, &dotted)
            {
                self.error(
                    codes::CFG_LAYER_PARAM_LEAK,
                    leaf_path.clone(),
                    format!("layer '{layer}' does not own params path '{dotted}'"),
                );
            }
            self.track_conflict(
                conflicts,
                format!("param:{dotted}"),
                layer,
                &leaf_path,
                &format!("params path '{dotted}'"),
            );
        }
    }

    fn check_experiment_stage_ownership(
        &mut self,
        stages: &Value,
        scope: &FlowScope<'_>,
        layer: Option<&str>,
        conflicts: &mut ConflictTracker,
        path: &JsonPath,
    ) {
        let Some(layer) = layer else {
            return;
        };
        let Some(stage_map) = stages.as_object() else {
            return;
        };
        for (stage_name, stage_json) in stage_map {
            let stage_path = path.key(stage_name);
            let Some(stage) = stage_json.as_object() else {
                continue;
            };
            if stage.contains_key(fields::FANOUT_MAX) {
                self.track_conflict(
                    conflicts,
                    format!("fanout:{stage_name}"),
                    layer,
                    &stage_path.key(fields::FANOUT_MAX),
                    &format!("fanoutMax of stage '{stage_name}'"),
                );
            }
            let Some(modules) = stage.get(fields::MODULES).and_then(Value::as_array) else {
                continue;
            };
            for (idx, entry) in modules.iter().enumerate() {
                let Some(id) = entry.get(fields::ID).and_then(Value::as_str) else {
                    continue;
                };
                let id_path = stage_path.key(fields::MODULES).index(idx).key(fields::ID);
                if let Some(blueprint) = scope.blueprint
                    && !blueprint.ownership.owns_module(layer, id)
                {
                    self.error(
                        codes::CFG_LAYER_MODULE_LEAK,
                        id_path.clone(),
                        format!("layer '{layer}' does not own module id '{id}'"),
                    );
                }
                self.track_conflict(
                    conflicts,
                    format!("module:{id}"),
                    layer,
                    &id_path,
                    &format!("module id '{id}'"),
                );
            }
        }
    }

    fn track_conflict(
        &mut self,
        tracker: &mut ConflictTracker,
        key: String,
        layer: &str,
        path: &JsonPath,
        what: &str,
    ) {
        match tracker.touched.get_mut(&key) {
            None => {
                tracker.touched.insert(
                    key,
                    FirstTouch {
                        layer: layer.to_string(),
                        path: path.clone(),
                        reported: false,
                    },
                );
            }
            Some(first) if first.layer != layer => {
                let message = format!(
                    "layers '{}' and '{layer}' both touch {what}",
                    first.layer
                );
                if !first.reported {
                    first.reported = true;
                    let first_path = first.path.clone();
                    self.error(codes::CFG_LAYER_CONFLICT, first_path, message.clone());
                }
                self.error(codes::CFG_LAYER_CONFLICT, path.clone(), message);
            }
            Some(_) => {}
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Collect the dotted leaf paths of a params object. Non-object values are
/// leaves; an empty object counts as a leaf so it cannot escape ownership
/// checks.
fn collect_leaf_paths(
    value: &Value,
    dotted: &str,
    path: &JsonPath,
    out: &mut Vec<(String, JsonPath)>,
) {
    match value.as_object() {
        Some(object) if !object.is_empty() => {
            for (key, member) in object {
                collect_leaf_paths(member, &join_dotted(dotted, key), &path.key(key), out);
            }
        }
        _ => {
            if !dotted.is_empty() {
                out.push((dotted.to_string(), path.clone()));
            }
        }
    }
}
