//! Stage and module checks, shared by the base layer and every overlay
//! layer that carries a `stages` patch.

use serde_json::Value;
use std::collections::hash_map::Entry;

use super::Pass;
use super::flows::{FirstOccurrence, FlowScope};
use crate::blueprint::{MAX_ALLOWED_FANOUT_MAX, StageContract};
use crate::codes;
use crate::gates::GateExpr;
use crate::jsonpath::JsonPath;
use crate::patchdoc::{
    MODULE_PRIORITY_MAX, MODULE_PRIORITY_MIN, fields, is_valid_limit_key, is_valid_module_id,
};

/// Which patch layer a `stages` object came from. The base layer carries
/// the uniqueness and budget checks; overlay layers only the structural
/// ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StageLayer {
    Base,
    Experiment,
    Qos,
}

/// What one module entry contributed, for stage-level budget counting.
#[derive(Debug, Default)]
pub(crate) struct ModuleSummary {
    pub id: Option<String>,
    pub enabled: bool,
    pub is_shadow: bool,
}

impl Pass<'_> {
    pub(crate) fn check_stages(
        &mut self,
        stages: &Value,
        scope: &mut FlowScope<'_>,
        layer: StageLayer,
        path: &JsonPath,
    ) {
        let Some(stage_map) = self.require_object(stages, path, "'stages'") else {
            return;
        };
        for (stage_name, stage_json) in stage_map {
            self.check_stage(stage_name, stage_json, scope, layer, &path.key(stage_name));
        }
    }

    fn check_stage(
        &mut self,
        stage_name: &str,
        stage_json: &Value,
        scope: &mut FlowScope<'_>,
        layer: StageLayer,
        path: &JsonPath,
    ) {
        let contract = scope
            .blueprint
            .and_then(|b| b.stage_contract(stage_name))
            .cloned();
        if scope.blueprint.is_some() && contract.is_none() {
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

        let mut declared_fanout = None;
        if let Some(fanout_json) = stage_map.get(fields::FANOUT_MAX) {
            let fanout_path = path.key(fields::FANOUT_MAX);
            match fanout_json.as_u64() {
                Some(fanout) => {
                    declared_fanout = Some(fanout);
                    let mut in_range = fanout <= u64::from(MAX_ALLOWED_FANOUT_MAX);
                    if let Some(c) = &contract {
                        in_range = in_range
                            && fanout >= u64::from(c.min_fanout_max)
                            && fanout <= u64::from(c.max_fanout_max);
                    }
                    if !in_range {
                        self.error(
                            codes::CFG_FANOUT_OUT_OF_RANGE,
                            fanout_path,
                            format!(
                                "fanoutMax {fanout} is outside the allowed range for stage '{stage_name}'"
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
        if let Some(c) = &contract
            && !c.allows_dynamic_modules
        {
            self.error(
                codes::CFG_STAGE_DYNAMIC_MODULES_FORBIDDEN,
                modules_path.clone(),
                format!("stage '{stage_name}' does not accept dynamic modules"),
            );
        }
        let Some(entries) = modules_json.as_array() else {
            self.error(
                codes::CFG_FIELD_TYPE_INVALID,
                modules_path,
                "'modules' must be an array",
            );
            return;
        };

        let mut enabled_primary = 0usize;
        let mut shadow_count = 0usize;
        for (idx, entry) in entries.iter().enumerate() {
            let summary = self.check_module(
                entry,
                scope,
                contract.as_ref(),
                layer,
                stage_name,
                &modules_path.index(idx),
            );
            if summary.is_shadow {
                shadow_count += 1;
            } else if summary.enabled {
                enabled_primary += 1;
            }
        }

        if layer != StageLayer::Base {
            return;
        }
        if let Some(c) = &contract {
            if enabled_primary > c.max_modules_hard {
                self.error(
                    codes::CFG_STAGE_MODULES_HARD_EXCEEDED,
                    modules_path.clone(),
                    format!(
                        "{enabled_primary} enabled modules exceed the hard budget of {}",
                        c.max_modules_hard
                    ),
                );
            } else if enabled_primary > c.max_modules_warn {
                self.warn(
                    codes::CFG_STAGE_MODULES_WARN,
                    modules_path.clone(),
                    format!(
                        "{enabled_primary} enabled modules exceed the advisory budget of {}",
                        c.max_modules_warn
                    ),
                );
            }
            if shadow_count > c.max_shadow_modules_hard {
                self.error(
                    codes::CFG_SHADOW_MODULES_HARD_EXCEEDED,
                    modules_path.clone(),
                    format!(
                        "{shadow_count} shadow modules exceed the hard budget of {}",
                        c.max_shadow_modules_hard
                    ),
                );
            }
        }
        if let Some(fanout) = declared_fanout
            && enabled_primary as u64 > fanout
        {
            self.warn(
                codes::CFG_FANOUT_TRIM_LIKELY,
                modules_path,
                format!("{enabled_primary} enabled modules but fanoutMax={fanout}"),
            );
        }
    }

    fn check_module(
        &mut self,
        entry: &Value,
        scope: &mut FlowScope<'_>,
        contract: Option<&StageContract>,
        layer: StageLayer,
        stage_name: &str,
        path: &JsonPath,
    ) -> ModuleSummary {
        let mut summary = ModuleSummary {
            enabled: true,
            ..ModuleSummary::default()
        };
        let Some(module) = self.require_object(entry, path, "a module patch") else {
            return summary;
        };
        const KNOWN_FIELDS: [&str; 9] = [
            fields::ID,
            fields::USE,
            fields::WITH,
            fields::ENABLED,
            fields::PRIORITY,
            fields::GATE,
            fields::SHADOW,
            fields::LIMIT_KEY,
            fields::MEMO_KEY,
        ];
        for key in module.keys() {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown module field '{key}'"),
                );
            }
        }

        match module.get(fields::ID).and_then(Value::as_str) {
            Some(id) if is_valid_module_id(id) => {
                summary.id = Some(id.to_string());
                if layer == StageLayer::Base {
                    self.check_duplicate_id(scope, stage_name, id, path);
                }
            }
            Some(id) => self.error(
                codes::CFG_MODULE_ID_INVALID,
                path.key(fields::ID),
                format!("module id '{id}' must be lowercase [a-z0-9_], length 1..=64"),
            ),
            None => self.error(
                codes::CFG_MODULE_ID_INVALID,
                path.key(fields::ID),
                "module id is required and must be a string",
            ),
        }

        if let Some(enabled_json) = module.get(fields::ENABLED) {
            match enabled_json.as_bool() {
                Some(enabled) => summary.enabled = enabled,
                None => self.error(
                    codes::CFG_FIELD_TYPE_INVALID,
                    path.key(fields::ENABLED),
                    "'enabled' must be a boolean",
                ),
            }
        }

        let use_str = module.get(fields::USE).and_then(Value::as_str);
        self.check_module_type(module, scope, contract, layer, stage_name, &summary, path);

        if let Some(with_json) = module.get(fields::WITH) {
            let with_path = path.key(fields::WITH);
            if self.require_object(with_json, &with_path, "'with'").is_some()
                && let Some(module_type) = use_str
            {
                let catalog = self.catalog;
                if let Some(spec) = catalog.get(module_type) {
                    let mut issues = Vec::new();
                    spec.args_schema.check(with_json, &with_path, &mut issues);
                    for issue in issues {
                        match issue.kind {
                            crate::blueprint::schema::BindIssueKind::UnknownField => self.error(
                                codes::CFG_MODULE_ARGS_UNKNOWN_FIELD,
                                issue.path,
                                format!("unknown argument for module type '{module_type}'"),
                            ),
                            crate::blueprint::schema::BindIssueKind::TypeMismatch {
                                expected,
                                found,
                            } => self.error(
                                codes::CFG_MODULE_ARGS_BIND_FAILED,
                                issue.path,
                                format!("cannot bind argument: expected {expected}, found {found}"),
                            ),
                        }
                    }
                    if let Some(validator) = &spec.args_validator {
                        validator.validate(with_json, &with_path, &mut self.findings);
                    }
                }
            }
        }

        if let Some(priority_json) = module.get(fields::PRIORITY) {
            let priority_path = path.key(fields::PRIORITY);
            match priority_json.as_i64() {
                Some(priority)
                    if (MODULE_PRIORITY_MIN..=MODULE_PRIORITY_MAX).contains(&priority) => {}
                Some(priority) => self.error(
                    codes::CFG_MODULE_PRIORITY_OUT_OF_RANGE,
                    priority_path,
                    format!(
                        "priority {priority} outside [{MODULE_PRIORITY_MIN}, {MODULE_PRIORITY_MAX}]"
                    ),
                ),
                None => self.error(
                    codes::CFG_FIELD_TYPE_INVALID,
                    priority_path,
                    "'priority' must be an integer",
                ),
            }
        }

        if let Some(gate_json) = module.get(fields::GATE) {
            let gate_path = path.key(fields::GATE);
            match GateExpr::parse(gate_json) {
                Ok(gate) => {
                    let selectors = self.selectors;
                    for name in gate.selector_names() {
                        if !selectors.contains(name) {
                            self.error(
                                codes::CFG_GATE_UNKNOWN_SELECTOR,
                                gate_path.clone(),
                                format!("selector '{name}' is not registered"),
                            );
                        }
                    }
                    if !summary.enabled {
                        self.info(
                            codes::CFG_GATE_REDUNDANT,
                            gate_path,
                            "gate on a disabled module has no effect",
                        );
                    }
                }
                Err(parse_error) => self.error(
                    codes::CFG_GATE_INVALID,
                    gate_path,
                    parse_error.to_string(),
                ),
            }
        }

        if let Some(shadow_json) = module.get(fields::SHADOW) {
            summary.is_shadow = true;
            self.check_shadow(shadow_json, contract, stage_name, &path.key(fields::SHADOW));
        }

        if let Some(limit_key_json) = module.get(fields::LIMIT_KEY) {
            let valid = limit_key_json.as_str().is_some_and(is_valid_limit_key);
            if !valid {
                self.error(
                    codes::CFG_MODULE_LIMIT_KEY_INVALID,
                    path.key(fields::LIMIT_KEY),
                    "limitKey must be a non-empty string without whitespace",
                );
            }
        }

        if let Some(memo_key_json) = module.get(fields::MEMO_KEY)
            && !memo_key_json.is_string()
        {
            self.error(
                codes::CFG_FIELD_TYPE_INVALID,
                path.key(fields::MEMO_KEY),
                "'memoKey' must be a string",
            );
        }

        summary
    }

    /// `use` handling: required and catalog-checked for newly declared
    /// modules, immutable for modules declared by an earlier layer.
    fn check_module_type(
        &mut self,
        module: &serde_json::Map<String, Value>,
        scope: &mut FlowScope<'_>,
        contract: Option<&StageContract>,
        layer: StageLayer,
        stage_name: &str,
        summary: &ModuleSummary,
        path: &JsonPath,
    ) {
        let use_str = module.get(fields::USE).and_then(Value::as_str);
        let declared_earlier: Option<Option<String>> = match (layer, summary.id.as_deref()) {
            (StageLayer::Base, _) | (_, None) => None,
            (_, Some(id)) => scope
                .base
                .module(stage_name, id)
                .map(|info| info.module_type.clone())
                .or_else(|| scope.overlay_ids.get(id).cloned()),
        };

        if let Some(original_type) = declared_earlier {
            if let Some(declared) = use_str
                && original_type.as_deref() != Some(declared)
            {
                self.error(
                    codes::CFG_MODULE_USE_OVERRIDE_FORBIDDEN,
                    path.key(fields::USE),
                    "overlays may not change a module's 'use' type",
                );
            }
            return;
        }

        match use_str {
            Some(module_type) => {
                let catalog = self.catalog;
                if !catalog.contains(module_type) {
                    self.error(
                        codes::CFG_MODULE_TYPE_UNKNOWN,
                        path.key(fields::USE),
                        format!("module type '{module_type}' is not in the catalog"),
                    );
                } else if let Some(c) = contract
                    && !c.allows_type(module_type)
                {
                    self.error(
                        codes::CFG_MODULE_TYPE_FORBIDDEN,
                        path.key(fields::USE),
                        format!("module type '{module_type}' is not allowed in stage '{stage_name}'"),
                    );
                }
            }
            None => self.error(
                codes::CFG_MODULE_TYPE_UNKNOWN,
                path.key(fields::USE),
                "module declares no 'use' type",
            ),
        }

        if layer != StageLayer::Base
            && let Some(id) = summary.id.as_deref()
        {
            scope
                .overlay_ids
                .insert(id.to_string(), use_str.map(str::to_string));
        }
    }

    fn check_shadow(
        &mut self,
        shadow_json: &Value,
        contract: Option<&StageContract>,
        stage_name: &str,
        path: &JsonPath,
    ) {
        if let Some(c) = contract
            && !c.allows_shadow_modules
        {
            self.error(
                codes::CFG_STAGE_SHADOW_MODULES_FORBIDDEN,
                path.clone(),
                format!("stage '{stage_name}' does not accept shadow modules"),
            );
        }
        let Some(shadow_map) = self.require_object(shadow_json, path, "'shadow'") else {
            return;
        };
        for key in shadow_map.keys() {
            if key != fields::SAMPLE {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown shadow field '{key}'"),
                );
            }
        }
        let sample_path = path.key(fields::SAMPLE);
        match shadow_map.get(fields::SAMPLE).map(Value::as_f64) {
            Some(Some(sample)) if (0.0..=1.0).contains(&sample) => {
                let bps = (sample * 10_000.0).round() as u32;
                if let Some(c) = contract
                    && bps > c.max_shadow_sample_bps
                {
                    self.error(
                        codes::CFG_SHADOW_SAMPLE_EXCEEDS_CONTRACT,
                        sample_path,
                        format!(
                            "sample rate {bps}bps exceeds the stage ceiling of {}bps",
                            c.max_shadow_sample_bps
                        ),
                    );
                }
            }
            Some(_) => self.error(
                codes::CFG_SHADOW_SAMPLE_OUT_OF_RANGE,
                sample_path,
                "shadow sample must be a number in [0, 1]",
            ),
            None => self.error(
                codes::CFG_FIELD_TYPE_INVALID,
                sample_path,
                "shadow requires a 'sample' number",
            ),
        }
    }

    /// Duplicate-id reporting: a same-stage duplicate reports the first and
    /// the duplicate occurrence exactly once each; a cross-stage duplicate
    /// reports only the later occurrence.
    fn check_duplicate_id(
        &mut self,
        scope: &mut FlowScope<'_>,
        stage_name: &str,
        id: &str,
        module_path: &JsonPath,
    ) {
        match scope.module_ids.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(FirstOccurrence {
                    stage: stage_name.to_string(),
                    path: module_path.clone(),
                    reported: false,
                });
            }
            Entry::Occupied(mut slot) => {
                let first = slot.get_mut();
                let message = format!("module id '{id}' is declared more than once in the flow");
                if first.stage == stage_name && !first.reported {
                    let first_path = first.path.clone();
                    first.reported = true;
                    self.error(codes::CFG_MODULE_ID_DUPLICATE, first_path, message.clone());
                }
                self.error(codes::CFG_MODULE_ID_DUPLICATE, module_path.clone(), message);
            }
        }
    }
}
