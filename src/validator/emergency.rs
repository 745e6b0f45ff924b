//! Emergency overlay checks. An emergency patch is a time-boxed override
//! that may only set `params`, disable existing modules, and shrink
//! `fanoutMax`.

use serde_json::Value;

use super::Pass;
use super::flows::FlowScope;
use crate::blueprint::MAX_ALLOWED_FANOUT_MAX;
use crate::codes;
use crate::jsonpath::JsonPath;
use crate::patchdoc::fields;

impl Pass<'_> {
    pub(crate) fn check_emergency(
        &mut self,
        emergency: &Value,
        scope: &FlowScope<'_>,
        path: &JsonPath,
    ) {
        let Some(emergency_map) = self.require_object(emergency, path, "'emergency'") else {
            return;
        };

        for key in emergency_map.keys() {
            if !matches!(
                key.as_str(),
                fields::REASON | fields::OPERATOR | fields::TTL_MINUTES | fields::PATCH
            ) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown emergency field '{key}'"),
                );
            }
        }

        for required in [fields::REASON, fields::OPERATOR] {
            let present = emergency_map
                .get(required)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty());
            if !present {
                self.error(
                    codes::CFG_EMERGENCY_FIELD_MISSING,
                    path.key(required),
                    format!("emergency overlays require a non-empty '{required}'"),
                );
            }
        }

        let ttl_valid = emergency_map
            .get(fields::TTL_MINUTES)
            .and_then(Value::as_i64)
            .is_some_and(|ttl| ttl > 0);
        if !ttl_valid {
            self.error(
                codes::CFG_EMERGENCY_TTL_INVALID,
                path.key(fields::TTL_MINUTES),
                "ttl_minutes must be a positive integer",
            );
        }

        let patch_path = path.key(fields::PATCH);
        let Some(patch) = emergency_map.get(fields::PATCH) else {
            self.error(
                codes::CFG_EMERGENCY_FIELD_MISSING,
                patch_path,
                "emergency overlays require a 'patch' object",
            );
            return;
        };
        let Some(patch_map) = self.require_object(patch, &patch_path, "the emergency patch") else {
            return;
        };
        for key in patch_map.keys() {
            if !matches!(key.as_str(), fields::PARAMS | fields::STAGES) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    patch_path.key(key),
                    format!("emergency patches may only set 'params' and 'stages', found '{key}'"),
                );
            }
        }

        if let Some(stages) = patch_map.get(fields::STAGES) {
            let stages_path = patch_path.key(fields::STAGES);
            let Some(stage_map) = self.require_object(stages, &stages_path, "'stages'") else {
                return;
            };
            for (stage_name, stage_json) in stage_map {
                self.check_emergency_stage(
                    stage_name,
                    stage_json,
                    scope,
                    &stages_path.key(stage_name),
                );
            }
        }
    }

    fn check_emergency_stage(
        &mut self,
        stage_name: &str,
        stage_json: &Value,
        scope: &FlowScope<'_>,
        path: &JsonPath,
    ) {
        if let Some(blueprint) = scope.blueprint
            && !blueprint.has_stage(stage_name)
        {
            self.error(
                codes::CFG_STAGE_NOT_IN_BLUEPRINT,
                path.clone(),
                format!(
                    "stage '{stage_name}' is not part of flow '{}'",
                    scope.flow_name
                ),
            );
        }
        let Some(stage_map) = self.require_object(stage_json, path, "a stage patch") else {
            return;
        };
        for key in stage_map.keys() {
            if !matches!(key.as_str(), fields::FANOUT_MAX | fields::MODULES) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown stage field '{key}'"),
                );
            }
        }

        if let Some(fanout_json) = stage_map.get(fields::FANOUT_MAX) {
            let fanout_path = path.key(fields::FANOUT_MAX);
            match fanout_json.as_u64() {
                Some(fanout) => {
                    if fanout > u64::from(MAX_ALLOWED_FANOUT_MAX) {
                        self.error(
                            codes::CFG_FANOUT_OUT_OF_RANGE,
                            fanout_path.clone(),
                            format!("fanoutMax {fanout} exceeds the ceiling of {MAX_ALLOWED_FANOUT_MAX}"),
                        );
                    }
                    // An emergency shrink below the base's enabled module
                    // count will trim at runtime.
                    if let Some(base) = scope.base.stage(stage_name)
                        && base.enabled_primary_count as u64 > fanout
                    {
                        self.warn(
                            codes::CFG_FANOUT_TRIM_LIKELY,
                            fanout_path,
                            format!(
                                "{} enabled base modules but emergency fanoutMax={fanout}",
                                base.enabled_primary_count
                            ),
                        );
                    }
                }
                None => self.error(
                    codes::CFG_FIELD_TYPE_INVALID,
                    fanout_path,
                    "fanoutMax must be a non-negative integer",
                ),
            }
        }

        let Some(modules_json) = stage_map.get(fields::MODULES) else {
            return;
        };
        let modules_path = path.key(fields::MODULES);
        let Some(entries) = modules_json.as_array() else {
            self.error(
                codes::CFG_FIELD_TYPE_INVALID,
                modules_path,
                "'modules' must be an array",
            );
            return;
        };
        for (idx, entry) in entries.iter().enumerate() {
            let entry_path = modules_path.index(idx);
            let Some(module) = self.require_object(entry, &entry_path, "a module patch") else {
                continue;
            };

            for key in module.keys() {
                if !matches!(key.as_str(), fields::ID | fields::ENABLED) {
                    self.error(
                        codes::CFG_EMERGENCY_FIELD_FORBIDDEN,
                        entry_path.key(key),
                        format!("emergency module entries may only set 'enabled', found '{key}'"),
                    );
                }
            }

            match module.get(fields::ID).and_then(Value::as_str) {
                Some(id) if scope.base.module(stage_name, id).is_some() => {}
                Some(id) => self.error(
                    codes::CFG_EMERGENCY_MODULE_UNKNOWN,
                    entry_path.key(fields::ID),
                    format!("module '{id}' does not exist in the base stage '{stage_name}'"),
                ),
                None => self.error(
                    codes::CFG_EMERGENCY_MODULE_UNKNOWN,
                    entry_path.key(fields::ID),
                    "emergency module entries require an 'id'",
                ),
            }

            match module.get(fields::ENABLED) {
                Some(Value::Bool(false)) => {}
                Some(Value::Bool(true)) => self.error(
                    codes::CFG_EMERGENCY_ENABLE_FORBIDDEN,
                    entry_path.key(fields::ENABLED),
                    "emergency overlays may only disable modules",
                ),
                Some(_) => self.error(
                    codes::CFG_FIELD_TYPE_INVALID,
                    entry_path.key(fields::ENABLED),
                    "'enabled' must be a boolean",
                ),
                None => self.error(
                    codes::CFG_EMERGENCY_ENABLE_FORBIDDEN,
                    entry_path.key(fields::ENABLED),
                    "emergency module entries must set enabled=false",
                ),
            }
        }
    }
}
