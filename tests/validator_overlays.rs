//! Validator behavior over overlay layers: experiments (ownership,
//! conflicts, duplicates), QoS tier restrictions, and emergency patches.

use serde_json::json;

mod common;
use common::*;

fn flow_patch(flow_body: serde_json::Value) -> serde_json::Value {
    json!({"schemaVersion": "v1", "flows": {FLOW: flow_body}})
}

#[test]
fn test_experiment_requires_layer_variant_patch() {
    let patch = flow_patch(json!({
        "experiments": [
            {"variant": "on", "patch": {}},
            {"layer": "L1", "patch": {}},
            {"layer": "L1", "variant": "on"},
            {"layer": "L1", "variant": "off", "patch": 3}
        ]
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_EXPERIMENT_FIELD_MISSING",
        "$.flows.F.experiments[0].layer",
    );
    assert_has_finding(
        &report,
        "CFG_EXPERIMENT_FIELD_MISSING",
        "$.flows.F.experiments[1].variant",
    );
    assert_has_finding(
        &report,
        "CFG_EXPERIMENT_FIELD_MISSING",
        "$.flows.F.experiments[2].patch",
    );
    assert_has_finding(
        &report,
        "CFG_EXPERIMENT_PATCH_INVALID",
        "$.flows.F.experiments[3].patch",
    );
}

#[test]
fn test_experiment_structural_override_rejected() {
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {
                "qos": {}, "emergency": {}, "experiments": [], "params": {}
            }}
        ]
    }));
    let report = validate(&patch);
    for field in ["qos", "emergency", "experiments"] {
        assert_has_finding(
            &report,
            "CFG_EXPERIMENT_STRUCTURAL_OVERRIDE",
            &format!("$.flows.F.experiments[0].patch.{field}"),
        );
    }
}

#[test]
fn test_duplicate_layer_variant_pair() {
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {}},
            {"layer": "L1", "variant": "on", "patch": {}},
            {"layer": "L1", "variant": "off", "patch": {}}
        ]
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_EXPERIMENT_DUPLICATE",
        "$.flows.F.experiments[1]",
    );
    let dups = report
        .findings()
        .iter()
        .filter(|f| f.code == "CFG_EXPERIMENT_DUPLICATE")
        .count();
    assert_eq!(dups, 1);
}

#[test]
fn test_layer_param_leak() {
    // L1 owns flags.a and b; writing flags.b leaks into L2's territory.
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"params": {"flags": {"b": 1}}}}
        ]
    }));
    let report = validate(&patch);
    assert!(!report.is_valid());
    assert_has_finding(
        &report,
        "CFG_LAYER_PARAM_LEAK",
        "$.flows.F.experiments[0].patch.params.flags.b",
    );
}

#[test]
fn test_layer_owned_param_passes() {
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"params": {"flags": {"a": 1}, "b": {"x": 9}}}}
        ]
    }));
    let report = validate(&patch);
    assert_no_finding(&report, "CFG_LAYER_PARAM_LEAK");
}

#[test]
fn test_layer_module_leak() {
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"stages": {"s1": {"modules": [
                {"id": "m2", "use": "noop"}
            ]}}}}
        ]
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_LAYER_MODULE_LEAK",
        "$.flows.F.experiments[0].patch.stages.s1.modules[0].id",
    );
}

#[test]
fn test_layer_conflict_reports_both_paths() {
    // Two distinct layers touch the same param path; both occurrences are
    // flagged, the first included.
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"params": {"flags": {"a": 1}}}},
            {"layer": "L2", "variant": "on", "patch": {"params": {"flags": {"a": 2}}}}
        ]
    }));
    let report = validate(&patch);
    let conflict_paths: Vec<&str> = report
        .findings()
        .iter()
        .filter(|f| f.code == "CFG_LAYER_CONFLICT")
        .map(|f| f.json_path.as_str())
        .collect();
    assert_eq!(
        conflict_paths,
        vec![
            "$.flows.F.experiments[0].patch.params.flags.a",
            "$.flows.F.experiments[1].patch.params.flags.a",
        ]
    );
}

#[test]
fn test_same_layer_variants_do_not_conflict() {
    let patch = flow_patch(json!({
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"params": {"flags": {"a": 1}}}},
            {"layer": "L1", "variant": "off", "patch": {"params": {"flags": {"a": 2}}}}
        ]
    }));
    let report = validate(&patch);
    assert_no_finding(&report, "CFG_LAYER_CONFLICT");
}

#[test]
fn test_qos_unknown_tier() {
    let patch = flow_patch(json!({
        "qos": {"tiers": {"premium": {"patch": {}}}}
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_QOS_TIER_UNKNOWN",
        "$.flows.F.qos.tiers.premium",
    );
}

#[test]
fn test_qos_may_not_enable_base_disabled_module() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"modules": [
            {"id": "m1", "use": "noop", "enabled": false}
        ]}},
        "qos": {"tiers": {"conserve": {"patch": {"stages": {"s1": {"modules": [
            {"id": "m1", "enabled": true}
        ]}}}}}}
    }));
    let report = validate(&patch);
    assert!(!report.is_valid());
    assert_has_finding(
        &report,
        "CFG_QOS_MODULE_ENABLE_FORBIDDEN",
        "$.flows.F.qos.tiers.conserve.patch.stages.s1.modules[0].enabled",
    );
}

#[test]
fn test_qos_may_not_raise_fanout_over_base() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"fanoutMax": 2}},
        "qos": {"tiers": {"conserve": {"patch": {"stages": {"s1": {"fanoutMax": 4}}}}}}
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_QOS_FANOUT_INCREASE_FORBIDDEN",
        "$.flows.F.qos.tiers.conserve.patch.stages.s1.fanoutMax",
    );

    // Shrinking is fine.
    let patch = flow_patch(json!({
        "stages": {"s1": {"fanoutMax": 2}},
        "qos": {"tiers": {"conserve": {"patch": {"stages": {"s1": {"fanoutMax": 1}}}}}}
    }));
    let report = validate(&patch);
    assert_no_finding(&report, "CFG_QOS_FANOUT_INCREASE_FORBIDDEN");
}

#[test]
fn test_qos_may_not_raise_shadow_sample() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"modules": [
            {"id": "m1", "use": "noop", "shadow": {"sample": 0.1}}
        ]}},
        "qos": {"tiers": {"conserve": {"patch": {"stages": {"s1": {"modules": [
            {"id": "m1", "shadow": {"sample": 0.5}}
        ]}}}}}}
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_QOS_SHADOW_INCREASE_FORBIDDEN",
        "$.flows.F.qos.tiers.conserve.patch.stages.s1.modules[0].shadow.sample",
    );
}

#[test]
fn test_use_override_forbidden_in_overlays() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"modules": [{"id": "m_exp", "use": "noop"}]}},
        "experiments": [
            {"layer": "L1", "variant": "on", "patch": {"stages": {"s1": {"modules": [
                {"id": "m_exp", "use": "rank"}
            ]}}}}
        ]
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_MODULE_USE_OVERRIDE_FORBIDDEN",
        "$.flows.F.experiments[0].patch.stages.s1.modules[0].use",
    );
}

#[test]
fn test_emergency_required_fields() {
    let patch = flow_patch(json!({
        "emergency": {"reason": "", "ttl_minutes": 0}
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_FIELD_MISSING",
        "$.flows.F.emergency.reason",
    );
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_FIELD_MISSING",
        "$.flows.F.emergency.operator",
    );
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_TTL_INVALID",
        "$.flows.F.emergency.ttl_minutes",
    );
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_FIELD_MISSING",
        "$.flows.F.emergency.patch",
    );
}

#[test]
fn test_emergency_may_only_disable_existing_modules() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"modules": [{"id": "m1", "use": "noop"}]}},
        "emergency": {
            "reason": "incident",
            "operator": "oncall",
            "ttl_minutes": 30,
            "patch": {"stages": {"s1": {"modules": [
                {"id": "m1", "enabled": true},
                {"id": "ghost", "enabled": false},
                {"id": "m1", "enabled": false, "priority": 3}
            ]}}}
        }
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_ENABLE_FORBIDDEN",
        "$.flows.F.emergency.patch.stages.s1.modules[0].enabled",
    );
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_MODULE_UNKNOWN",
        "$.flows.F.emergency.patch.stages.s1.modules[1].id",
    );
    assert_has_finding(
        &report,
        "CFG_EMERGENCY_FIELD_FORBIDDEN",
        "$.flows.F.emergency.patch.stages.s1.modules[2].priority",
    );
}

#[test]
fn test_emergency_fanout_shrink_warns_on_over_trim() {
    let patch = flow_patch(json!({
        "stages": {"s1": {"modules": [
            {"id": "m1", "use": "noop"},
            {"id": "m2", "use": "noop"}
        ]}},
        "emergency": {
            "reason": "load shedding",
            "operator": "oncall",
            "ttl_minutes": 15,
            "patch": {"stages": {"s1": {"fanoutMax": 1}}}
        }
    }));
    let report = validate(&patch);
    assert!(report.is_valid());
    assert_has_finding(
        &report,
        "CFG_FANOUT_TRIM_LIKELY",
        "$.flows.F.emergency.patch.stages.s1.fanoutMax",
    );
}

#[test]
fn test_emergency_patch_allows_params_only_fields() {
    let patch = flow_patch(json!({
        "emergency": {
            "reason": "incident",
            "operator": "oncall",
            "ttl_minutes": 5,
            "patch": {"params": {"a": 0}, "mystery": {}}
        }
    }));
    let report = validate(&patch);
    assert_has_finding(
        &report,
        "CFG_UNKNOWN_FIELD",
        "$.flows.F.emergency.patch.mystery",
    );
}
