//! Validator behavior over the base document: schema version, unknown
//! fields, limits, stages, modules, gates, shadow, and budgets.

use serde_json::json;

use flowpatch::findings::Severity;

mod common;
use common::*;

#[test]
fn test_baseline_patch_is_valid_with_no_findings() {
    let report = validate(&baseline_patch());
    assert!(report.is_valid());
    assert!(report.findings().is_empty());
}

#[test]
fn test_parse_error_is_a_single_finding_at_root() {
    let registry = test_registry();
    let catalog = test_catalog();
    let selectors = test_selectors();
    let validator = flowpatch::validator::Validator::new(&registry, &catalog, &selectors);
    let report = validator.validate("{not json");
    assert!(!report.is_valid());
    assert_eq!(report.findings().len(), 1);
    assert_eq!(report.findings()[0].code, "CFG_PARSE_ERROR");
    assert_eq!(report.findings()[0].json_path, "$");
}

#[test]
fn test_schema_version_must_be_v1() {
    let report = validate(&json!({"schemaVersion": "v2", "flows": {}}));
    assert_has_finding(&report, "CFG_SCHEMA_VERSION_UNSUPPORTED", "$.schemaVersion");

    let report = validate(&json!({"flows": {}}));
    assert_has_finding(&report, "CFG_SCHEMA_VERSION_UNSUPPORTED", "$.schemaVersion");
}

#[test]
fn test_unknown_top_level_field_rejected() {
    let mut patch = baseline_patch();
    patch["extra"] = json!(1);
    let report = validate(&patch);
    assert!(!report.is_valid());
    assert_has_finding(&report, "CFG_UNKNOWN_FIELD", "$.extra");
    let finding = report
        .findings()
        .iter()
        .find(|f| f.code == "CFG_UNKNOWN_FIELD")
        .unwrap();
    assert_eq!(finding.severity, Severity::Error);
}

#[test]
fn test_flow_not_registered_continues_structurally() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {"ghost": {"bogus": {}, "stages": {}}}
    });
    let report = validate(&patch);
    assert_has_finding(&report, "CFG_FLOW_NOT_REGISTERED", "$.flows.ghost");
    // Structural checks still ran on the unregistered flow.
    assert_has_finding(&report, "CFG_UNKNOWN_FIELD", "$.flows.ghost.bogus");
}

#[test]
fn test_limits_shape_and_values() {
    let patch = json!({
        "schemaVersion": "v1",
        "limits": {
            "moduleConcurrency": {
                "maxInFlight": {
                    "ok.key": 4,
                    "bad key": 2,
                    "zero": 0
                },
                "stray": 1
            },
            "other": {}
        }
    });
    let report = validate(&patch);
    assert_has_finding(&report, "CFG_UNKNOWN_FIELD", "$.limits.other");
    assert_has_finding(
        &report,
        "CFG_UNKNOWN_FIELD",
        "$.limits.moduleConcurrency.stray",
    );
    assert_has_finding(
        &report,
        "CFG_LIMIT_KEY_INVALID",
        "$.limits.moduleConcurrency.maxInFlight.bad key",
    );
    assert_has_finding(
        &report,
        "CFG_LIMIT_VALUE_INVALID",
        "$.limits.moduleConcurrency.maxInFlight.zero",
    );
    let value_findings = report
        .findings()
        .iter()
        .filter(|f| f.code == "CFG_LIMIT_VALUE_INVALID")
        .count();
    assert_eq!(value_findings, 1, "only the zero entry has a bad value");
}

#[test]
fn test_stage_not_in_blueprint() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"mystery": {"fanoutMax": 1}}}}
    });
    let report = validate(&patch);
    assert_has_finding(&report, "CFG_STAGE_NOT_IN_BLUEPRINT", "$.flows.F.stages.mystery");
}

#[test]
fn test_fanout_out_of_range_against_ceiling_and_contract() {
    // Absolute ceiling is 8.
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"fanoutMax": 9}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_FANOUT_OUT_OF_RANGE",
        "$.flows.F.stages.s1.fanoutMax",
    );

    // Stage s2's contract caps fanout at 4.
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s2": {"fanoutMax": 6}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_FANOUT_OUT_OF_RANGE",
        "$.flows.F.stages.s2.fanoutMax",
    );
}

#[test]
fn test_fanout_trim_warning() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {
            "fanoutMax": 1,
            "modules": [
                {"id": "m1", "use": "noop", "with": {}},
                {"id": "m2", "use": "noop", "with": {}}
            ]
        }}}}
    });
    let report = validate(&patch);
    assert!(report.is_valid(), "a trim warning must not invalidate");
    assert_has_finding(
        &report,
        "CFG_FANOUT_TRIM_LIKELY",
        "$.flows.F.stages.s1.modules",
    );
    let finding = report
        .findings()
        .iter()
        .find(|f| f.code == "CFG_FANOUT_TRIM_LIKELY")
        .unwrap();
    assert_eq!(finding.severity, Severity::Warn);
}

#[test]
fn test_module_id_format_and_priority_range() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"modules": [
            {"id": "Bad-Id", "use": "noop"},
            {"id": "m2", "use": "noop", "priority": 2000},
            {"use": "noop"}
        ]}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_MODULE_ID_INVALID",
        "$.flows.F.stages.s1.modules[0].id",
    );
    assert_has_finding(
        &report,
        "CFG_MODULE_PRIORITY_OUT_OF_RANGE",
        "$.flows.F.stages.s1.modules[1].priority",
    );
    assert_has_finding(
        &report,
        "CFG_MODULE_ID_INVALID",
        "$.flows.F.stages.s1.modules[2].id",
    );
}

#[test]
fn test_same_stage_duplicate_reports_both_occurrences() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"modules": [
            {"id": "m1", "use": "noop"},
            {"id": "m1", "use": "noop"}
        ]}}}}
    });
    let report = validate(&patch);
    let dups: Vec<&str> = report
        .findings()
        .iter()
        .filter(|f| f.code == "CFG_MODULE_ID_DUPLICATE")
        .map(|f| f.json_path.as_str())
        .collect();
    assert_eq!(
        dups,
        vec![
            "$.flows.F.stages.s1.modules[0]",
            "$.flows.F.stages.s1.modules[1]",
        ]
    );
}

#[test]
fn test_cross_stage_duplicate_reports_only_second_occurrence() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {
            "s1": {"modules": [{"id": "m1", "use": "noop"}]},
            "s2": {"modules": [{"id": "m1", "use": "noop"}]}
        }}}
    });
    let report = validate(&patch);
    let dups: Vec<&str> = report
        .findings()
        .iter()
        .filter(|f| f.code == "CFG_MODULE_ID_DUPLICATE")
        .map(|f| f.json_path.as_str())
        .collect();
    assert_eq!(dups, vec!["$.flows.F.stages.s2.modules[0]"]);
}

#[test]
fn test_module_type_checks() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"modules": [
            {"id": "m1", "use": "warp_drive"}
        ]}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_MODULE_TYPE_UNKNOWN",
        "$.flows.F.stages.s1.modules[0].use",
    );
}

#[test]
fn test_module_args_binding() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"modules": [
            {"id": "m1", "use": "rank", "with": {"depth": "three", "mystery": 1}}
        ]}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_MODULE_ARGS_BIND_FAILED",
        "$.flows.F.stages.s1.modules[0].with.depth",
    );
    assert_has_finding(
        &report,
        "CFG_MODULE_ARGS_UNKNOWN_FIELD",
        "$.flows.F.stages.s1.modules[0].with.mystery",
    );
}

#[test]
fn test_gate_parse_and_selector_checks() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s1": {"modules": [
            {"id": "m1", "use": "noop", "gate": {"sometimes": true}},
            {"id": "m2", "use": "noop", "gate": {"selector": {"name": "ghost"}}},
            {"id": "m3", "use": "noop", "enabled": false,
             "gate": {"variant": {"layer": "L1", "equals": "on"}}}
        ]}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_GATE_INVALID",
        "$.flows.F.stages.s1.modules[0].gate",
    );
    assert_has_finding(
        &report,
        "CFG_GATE_UNKNOWN_SELECTOR",
        "$.flows.F.stages.s1.modules[1].gate",
    );
    let redundant = report
        .findings()
        .iter()
        .find(|f| f.code == "CFG_GATE_REDUNDANT")
        .expect("gate on disabled module is advisory");
    assert_eq!(redundant.severity, Severity::Info);
    assert_eq!(redundant.json_path, "$.flows.F.stages.s1.modules[2].gate");
}

#[test]
fn test_shadow_sample_range_and_contract_ceiling() {
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s2": {"modules": [
            {"id": "m1", "use": "noop", "shadow": {"sample": 1.5}},
            {"id": "m2", "use": "noop", "shadow": {"sample": 0.9}}
        ]}}}}
    });
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_SHADOW_SAMPLE_OUT_OF_RANGE",
        "$.flows.F.stages.s2.modules[0].shadow.sample",
    );
    // 0.9 → 9000bps over the s2 ceiling of 5000bps.
    assert_has_finding(
        &report,
        "CFG_SHADOW_SAMPLE_EXCEEDS_CONTRACT",
        "$.flows.F.stages.s2.modules[1].shadow.sample",
    );
}

#[test]
fn test_module_budget_warn_and_hard() {
    // s2: warn over 2, hard over 3.
    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s2": {"modules": [
            {"id": "m1", "use": "noop"},
            {"id": "m2", "use": "noop"},
            {"id": "m3", "use": "noop"}
        ]}}}}
    });
    let report = validate(&patch);
    assert!(report.is_valid());
    assert_has_finding(
        &report,
        "CFG_STAGE_MODULES_WARN",
        "$.flows.F.stages.s2.modules",
    );

    let patch = json!({
        "schemaVersion": "v1",
        "flows": {FLOW: {"stages": {"s2": {"modules": [
            {"id": "m1", "use": "noop"},
            {"id": "m2", "use": "noop"},
            {"id": "m3", "use": "noop"},
            {"id": "m4", "use": "noop"}
        ]}}}}
    });
    let report = validate(&patch);
    assert!(!report.is_valid());
    assert_has_finding(
        &report,
        "CFG_STAGE_MODULES_HARD_EXCEEDED",
        "$.flows.F.stages.s2.modules",
    );
}

#[test]
fn test_validator_is_deterministic() {
    let patch = json!({
        "schemaVersion": "v1",
        "extra": 1,
        "flows": {FLOW: {"stages": {"s1": {
            "fanoutMax": 1,
            "modules": [
                {"id": "m1", "use": "noop"},
                {"id": "m1", "use": "warp"},
                {"id": "m3", "use": "noop", "priority": 5000}
            ]
        }}}}
    });
    let first = validate(&patch);
    let second = validate(&patch);
    assert_eq!(first, second);
    assert_eq!(first.sorted_findings(), second.sorted_findings());
}
