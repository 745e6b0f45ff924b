//! Shared fixtures for integration tests: a small registry with one flow,
//! two stages, a module catalog, selectors, and experiment-layer
//! ownership.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use flowpatch::blueprint::{
    ExperimentLayerOwnershipContract, FieldType, FlowBlueprint, FlowRegistry, LayerOwnership,
    ModuleCatalog, ModuleSpec, ParamsSchema, SelectorRegistry, StageContract,
};
use flowpatch::context::RequestOptions;
use flowpatch::findings::ValidationReport;
use flowpatch::validator::Validator;

pub const FLOW: &str = "F";

pub fn test_catalog() -> ModuleCatalog {
    ModuleCatalog::new()
        .register("noop", ModuleSpec::new(ParamsSchema::permissive(), "unit"))
        .register(
            "rank",
            ModuleSpec::new(
                ParamsSchema::new()
                    .field("depth", FieldType::Int)
                    .field("model", FieldType::Str),
                "ranked",
            ),
        )
        .register(
            "probe",
            ModuleSpec::new(ParamsSchema::permissive(), "observation"),
        )
}

pub fn test_selectors() -> SelectorRegistry {
    SelectorRegistry::new().register("is_beta", |ctx| {
        ctx.options.request_attributes.get("beta").map(String::as_str) == Some("true")
    })
}

fn params_schema() -> ParamsSchema {
    ParamsSchema::new()
        .field("a", FieldType::Int)
        .field(
            "b",
            FieldType::Object(
                ParamsSchema::new()
                    .field("x", FieldType::Int)
                    .field("y", FieldType::Int),
            ),
        )
        .field("flags", FieldType::Object(ParamsSchema::permissive()))
}

fn ownership() -> ExperimentLayerOwnershipContract {
    ExperimentLayerOwnershipContract::new()
        .layer(
            "L1",
            LayerOwnership::new()
                .own_params("flags.a")
                .own_params("b")
                .own_module("m_exp"),
        )
        .layer(
            "L2",
            LayerOwnership::new().own_params("flags.b").own_module("m2"),
        )
}

pub fn test_registry() -> FlowRegistry {
    let s2 = StageContract::builder()
        .fanout_range(0, 4)
        .module_budget(2, 3)
        .max_shadow_modules(2)
        .max_shadow_sample_bps(5_000)
        .build()
        .unwrap();
    FlowRegistry::new().register(
        FlowBlueprint::builder(FLOW)
            .stage("s1", StageContract::default())
            .stage("s2", s2)
            .node("s1.fanout")
            .node("s2.fanout")
            .params_schema(params_schema())
            .patch_schema(params_schema())
            .default_params(json!({"a": 1, "b": {"x": 1}}))
            .ownership(ownership())
            .build()
            .unwrap(),
    )
}

/// Validate a patch against the shared fixtures.
pub fn validate(patch: &Value) -> ValidationReport {
    let registry = test_registry();
    let catalog = test_catalog();
    let selectors = test_selectors();
    let validator = Validator::new(&registry, &catalog, &selectors);
    validator.validate(&patch.to_string())
}

pub fn options_with_user(user_id: &str) -> RequestOptions {
    RequestOptions::new().with_user_id(user_id)
}

pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse().expect("test timestamp must parse")
}

/// The §-style baseline patch: one stage, one enabled module.
pub fn baseline_patch() -> Value {
    json!({
        "schemaVersion": "v1",
        "flows": {
            FLOW: {
                "stages": {
                    "s1": {
                        "fanoutMax": 2,
                        "modules": [
                            {"id": "m1", "use": "noop", "with": {}, "priority": 0}
                        ]
                    }
                }
            }
        }
    })
}

/// Assert a report contains a finding with this code at this path.
#[track_caller]
pub fn assert_has_finding(report: &ValidationReport, code: &str, path: &str) {
    assert!(
        report
            .findings()
            .iter()
            .any(|f| f.code == code && f.json_path == path),
        "expected finding {code} at {path}, got: {:#?}",
        report.findings()
    );
}

#[track_caller]
pub fn assert_no_finding(report: &ValidationReport, code: &str) {
    assert!(
        report.findings().iter().all(|f| f.code != code),
        "unexpected finding {code}: {:#?}",
        report.findings()
    );
}
