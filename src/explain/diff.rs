//! Diffs between two evaluated configurations.
//!
//! Records are emitted in the canonical `(flow, stage, moduleId, kind,
//! path)` order; parameter diffs carry empty stage/module coordinates and
//! sort by path within their kind.

use serde_json::{Map, Value, json};

use super::envelope::{ExitCode, ToolKind, ToolOutput, seal};
use crate::overlay::{FlowPatchEvaluation, ModulePatch, StagePatch};
use crate::params::ResolvedParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffKind {
    FanoutChanged,
    ModuleAdded,
    ModuleChanged,
    ModuleRemoved,
    ParamChanged,
    ShadowAdded,
    ShadowRemoved,
}

impl DiffKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::FanoutChanged => "fanout_changed",
            DiffKind::ModuleAdded => "module_added",
            DiffKind::ModuleChanged => "module_changed",
            DiffKind::ModuleRemoved => "module_removed",
            DiffKind::ParamChanged => "param_changed",
            DiffKind::ShadowAdded => "shadow_added",
            DiffKind::ShadowRemoved => "shadow_removed",
        }
    }
}

/// One observed difference between the `before` and `after` configs.
#[derive(Clone, Debug, PartialEq)]
pub struct DiffRecord {
    pub flow: String,
    pub stage: String,
    pub module_id: String,
    pub kind: DiffKind,
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl DiffRecord {
    fn sort_key(&self) -> (&str, &str, &str, &str, &str) {
        (
            &self.flow,
            &self.stage,
            &self.module_id,
            self.kind.as_str(),
            &self.path,
        )
    }
}

/// Diff two evaluations of the same flow plus their resolved params, and
/// seal the `diff` envelope.
#[must_use]
pub fn diff_output(
    before: &FlowPatchEvaluation,
    after: &FlowPatchEvaluation,
    params_before: &ResolvedParams,
    params_after: &ResolvedParams,
) -> ToolOutput {
    let mut records = diff_evaluations(before, after);
    records.extend(diff_params(&after.flow_name, params_before, params_after));
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut body = Map::new();
    body.insert(
        "flow".to_string(),
        Value::String(after.flow_name.clone()),
    );
    body.insert(
        "configVersionBefore".to_string(),
        Value::from(before.config_version),
    );
    body.insert(
        "configVersionAfter".to_string(),
        Value::from(after.config_version),
    );
    body.insert(
        "records".to_string(),
        Value::Array(records.iter().map(record_json).collect()),
    );
    seal(ToolKind::Diff, ExitCode::Success, body)
}

/// Stage-level structural differences.
#[must_use]
pub fn diff_evaluations(
    before: &FlowPatchEvaluation,
    after: &FlowPatchEvaluation,
) -> Vec<DiffRecord> {
    let mut records = Vec::new();
    let flow = &after.flow_name;

    for stage_after in &after.stages {
        match before.stage(&stage_after.stage_name) {
            Some(stage_before) => diff_stage(flow, stage_before, stage_after, &mut records),
            None => {
                for module in &stage_after.modules {
                    records.push(module_record(
                        flow,
                        &stage_after.stage_name,
                        module,
                        DiffKind::ModuleAdded,
                    ));
                }
                for module in &stage_after.shadow_modules {
                    records.push(module_record(
                        flow,
                        &stage_after.stage_name,
                        module,
                        DiffKind::ShadowAdded,
                    ));
                }
            }
        }
    }
    for stage_before in &before.stages {
        if after.stage(&stage_before.stage_name).is_none() {
            for module in &stage_before.modules {
                records.push(module_record(
                    flow,
                    &stage_before.stage_name,
                    module,
                    DiffKind::ModuleRemoved,
                ));
            }
            for module in &stage_before.shadow_modules {
                records.push(module_record(
                    flow,
                    &stage_before.stage_name,
                    module,
                    DiffKind::ShadowRemoved,
                ));
            }
        }
    }
    records
}

fn diff_stage(
    flow: &str,
    before: &StagePatch,
    after: &StagePatch,
    records: &mut Vec<DiffRecord>,
) {
    let stage = &after.stage_name;
    let fanout_of = |s: &StagePatch| s.has_fanout_max.then_some(s.fanout_max);
    if fanout_of(before) != fanout_of(after) {
        records.push(DiffRecord {
            flow: flow.to_string(),
            stage: stage.clone(),
            module_id: String::new(),
            kind: DiffKind::FanoutChanged,
            path: "fanoutMax".to_string(),
            before: fanout_of(before).map(Value::from),
            after: fanout_of(after).map(Value::from),
        });
    }

    diff_module_set(
        flow,
        stage,
        &before.modules,
        &after.modules,
        DiffKind::ModuleAdded,
        DiffKind::ModuleRemoved,
        records,
    );
    diff_module_set(
        flow,
        stage,
        &before.shadow_modules,
        &after.shadow_modules,
        DiffKind::ShadowAdded,
        DiffKind::ShadowRemoved,
        records,
    );
}

fn diff_module_set(
    flow: &str,
    stage: &str,
    before: &[ModulePatch],
    after: &[ModulePatch],
    added: DiffKind,
    removed: DiffKind,
    records: &mut Vec<DiffRecord>,
) {
    for module_after in after {
        match before.iter().find(|m| m.id == module_after.id) {
            None => records.push(module_record(flow, stage, module_after, added)),
            Some(module_before) => {
                diff_module_fields(flow, stage, module_before, module_after, records);
            }
        }
    }
    for module_before in before {
        if !after.iter().any(|m| m.id == module_before.id) {
            records.push(module_record(flow, stage, module_before, removed));
        }
    }
}

fn diff_module_fields(
    flow: &str,
    stage: &str,
    before: &ModulePatch,
    after: &ModulePatch,
    records: &mut Vec<DiffRecord>,
) {
    let mut changed = |path: &str, b: Value, a: Value| {
        if b != a {
            records.push(DiffRecord {
                flow: flow.to_string(),
                stage: stage.to_string(),
                module_id: after.id.clone(),
                kind: DiffKind::ModuleChanged,
                path: path.to_string(),
                before: Some(b),
                after: Some(a),
            });
        }
    };
    changed("enabled", json!(before.enabled), json!(after.enabled));
    changed("priority", json!(before.priority), json!(after.priority));
    changed(
        "shadow.sample",
        json!(before.shadow_sample),
        json!(after.shadow_sample),
    );
    changed("limitKey", json!(before.limit_key), json!(after.limit_key));
    changed("memoKey", json!(before.memo_key), json!(after.memo_key));
    changed(
        "gate",
        before.gate.as_ref().map(|g| g.to_json()).unwrap_or(Value::Null),
        after.gate.as_ref().map(|g| g.to_json()).unwrap_or(Value::Null),
    );
}

fn module_record(flow: &str, stage: &str, module: &ModulePatch, kind: DiffKind) -> DiffRecord {
    DiffRecord {
        flow: flow.to_string(),
        stage: stage.to_string(),
        module_id: module.id.clone(),
        kind,
        path: String::new(),
        before: None,
        after: None,
    }
}

/// Leaf-level parameter differences between two resolved documents.
#[must_use]
pub fn diff_params(
    flow: &str,
    before: &ResolvedParams,
    after: &ResolvedParams,
) -> Vec<DiffRecord> {
    let mut before_leaves = Vec::new();
    collect_leaves(&before.effective, "", &mut before_leaves);
    let mut after_leaves = Vec::new();
    collect_leaves(&after.effective, "", &mut after_leaves);

    let before_map: std::collections::BTreeMap<_, _> = before_leaves.into_iter().collect();
    let after_map: std::collections::BTreeMap<_, _> = after_leaves.into_iter().collect();

    let mut paths: Vec<&String> = before_map.keys().chain(after_map.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut records = Vec::new();
    for path in paths {
        let b = before_map.get(path);
        let a = after_map.get(path);
        if b != a {
            records.push(DiffRecord {
                flow: flow.to_string(),
                stage: String::new(),
                module_id: String::new(),
                kind: DiffKind::ParamChanged,
                path: path.clone(),
                before: b.cloned(),
                after: a.cloned(),
            });
        }
    }
    records
}

fn collect_leaves(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    match value.as_object() {
        Some(object) if !object.is_empty() => {
            for (key, member) in object {
                let path = crate::jsonpath::join_dotted(prefix, key);
                collect_leaves(member, &path, out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push((prefix.to_string(), value.clone()));
            }
        }
    }
}

fn record_json(record: &DiffRecord) -> Value {
    let mut entry = Map::new();
    entry.insert("flow".to_string(), Value::String(record.flow.clone()));
    entry.insert("stage".to_string(), Value::String(record.stage.clone()));
    entry.insert(
        "moduleId".to_string(),
        Value::String(record.module_id.clone()),
    );
    entry.insert(
        "kind".to_string(),
        Value::String(record.kind.as_str().to_string()),
    );
    entry.insert("path".to_string(), Value::String(record.path.clone()));
    if let Some(before) = &record.before {
        entry.insert("before".to_string(), before.clone());
    }
    if let Some(after) = &record.after {
        entry.insert("after".to_string(), after.clone());
    }
    Value::Object(entry)
}
