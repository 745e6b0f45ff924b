//! Params resolver: overlay precedence, provenance, hashing, and emergency
//! TTL handling.

use serde_json::json;

use flowpatch::hashing::fnv1a_64;
use flowpatch::overlay::OverlayLayer;
use flowpatch::params::{ParamsInputs, ParamsResolver};
use flowpatch::patchdoc::QosTier;
use rustc_hash::FxHashMap;

mod common;
use common::*;

fn resolve(
    defaults: &serde_json::Value,
    flow_patch: Option<&serde_json::Value>,
    variants: &[(&str, &str)],
    tier: QosTier,
    config_ts: Option<&str>,
    now: &str,
) -> flowpatch::params::ResolvedParams {
    let variants: FxHashMap<String, String> = variants
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ParamsResolver::new().resolve(ParamsInputs {
        default_params: defaults,
        flow_patch,
        variants: &variants,
        qos_tier: tier,
        config_timestamp_utc: config_ts.map(utc),
        now: utc(now),
    })
}

const NOW: &str = "2025-01-01T00:00:00Z";

#[test]
fn test_merge_precedence_with_sources() {
    let defaults = json!({"a": 1, "b": {"x": 1}});
    let flow_patch = json!({
        "params": {"b": {"y": 2}},
        "experiments": [
            {"layer": "L1", "variant": "V1", "patch": {"params": {"b": {"x": 9}}}}
        ]
    });
    let resolved = resolve(
        &defaults,
        Some(&flow_patch),
        &[("L1", "V1")],
        QosTier::Full,
        None,
        NOW,
    );
    assert_eq!(resolved.effective, json!({"a": 1, "b": {"x": 9, "y": 2}}));
    assert_eq!(resolved.canonical_json, r#"{"a":1,"b":{"x":9,"y":2}}"#);

    let sources: Vec<(&str, OverlayLayer)> = resolved
        .sources
        .iter()
        .map(|s| (s.path.as_str(), s.layer))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("a", OverlayLayer::Default),
            ("b.x", OverlayLayer::Experiment),
            ("b.y", OverlayLayer::Base),
        ]
    );
    let bx = &resolved.sources[1];
    assert_eq!(bx.experiment_layer.as_deref(), Some("L1"));
    assert_eq!(bx.experiment_variant.as_deref(), Some("V1"));
}

#[test]
fn test_hash_is_fnv_of_canonical_bytes() {
    let defaults = json!({"a": 1, "b": {"x": 1}});
    let resolved = resolve(&defaults, None, &[], QosTier::Full, None, NOW);
    assert_eq!(resolved.hash, fnv1a_64(resolved.canonical_json.as_bytes()));
    assert_eq!(resolved.canonical_json, r#"{"a":1,"b":{"x":1}}"#);
}

#[test]
fn test_hash_stable_across_runs() {
    let defaults = json!({"a": 1, "b": {"x": 1}});
    let flow_patch = json!({"params": {"b": {"y": 2}}});
    let first = resolve(&defaults, Some(&flow_patch), &[], QosTier::Full, None, NOW);
    let second = resolve(&defaults, Some(&flow_patch), &[], QosTier::Full, None, NOW);
    assert_eq!(first.hash, second.hash);
    assert_eq!(first, second);
}

#[test]
fn test_inactive_experiment_params_ignored() {
    let defaults = json!({"a": 1});
    let flow_patch = json!({
        "experiments": [
            {"layer": "L1", "variant": "V1", "patch": {"params": {"a": 9}}}
        ]
    });
    let resolved = resolve(
        &defaults,
        Some(&flow_patch),
        &[("L1", "other")],
        QosTier::Full,
        None,
        NOW,
    );
    assert_eq!(resolved.effective, json!({"a": 1}));
}

#[test]
fn test_experiments_apply_in_array_order() {
    let defaults = json!({});
    let flow_patch = json!({
        "experiments": [
            {"layer": "L1", "variant": "V1", "patch": {"params": {"k": "first"}}},
            {"layer": "L2", "variant": "V2", "patch": {"params": {"k": "second"}}}
        ]
    });
    let resolved = resolve(
        &defaults,
        Some(&flow_patch),
        &[("L1", "V1"), ("L2", "V2")],
        QosTier::Full,
        None,
        NOW,
    );
    assert_eq!(resolved.effective, json!({"k": "second"}));
    assert_eq!(resolved.sources[0].layer, OverlayLayer::Experiment);
    assert_eq!(resolved.sources[0].experiment_layer.as_deref(), Some("L2"));
}

#[test]
fn test_qos_params_apply_for_selected_tier() {
    let defaults = json!({"depth": 10});
    let flow_patch = json!({
        "qos": {"tiers": {"conserve": {"patch": {"params": {"depth": 3}}}}}
    });
    let full = resolve(&defaults, Some(&flow_patch), &[], QosTier::Full, None, NOW);
    assert_eq!(full.effective, json!({"depth": 10}));

    let conserve = resolve(
        &defaults,
        Some(&flow_patch),
        &[],
        QosTier::Conserve,
        None,
        NOW,
    );
    assert_eq!(conserve.effective, json!({"depth": 3}));
    assert_eq!(conserve.sources[0].layer, OverlayLayer::Qos);
    assert_eq!(conserve.sources[0].qos_tier, Some(QosTier::Conserve));
}

#[test]
fn test_emergency_params_win_until_ttl_expires() {
    let defaults = json!({"a": 1});
    let flow_patch = json!({
        "params": {"a": 2},
        "emergency": {
            "reason": "incident",
            "operator": "oncall",
            "ttl_minutes": 10,
            "patch": {"params": {"a": 0}}
        }
    });

    let active = resolve(
        &defaults,
        Some(&flow_patch),
        &[],
        QosTier::Full,
        Some("2025-01-01T00:00:00Z"),
        "2025-01-01T00:09:00Z",
    );
    assert_eq!(active.effective, json!({"a": 0}));
    assert!(!active.emergency_dropped);
    assert_eq!(active.sources[0].layer, OverlayLayer::Emergency);

    let expired = resolve(
        &defaults,
        Some(&flow_patch),
        &[],
        QosTier::Full,
        Some("2025-01-01T00:00:00Z"),
        "2025-01-01T00:11:00Z",
    );
    assert_eq!(expired.effective, json!({"a": 2}));
    assert!(expired.emergency_dropped);

    // Expired emergency equals the merge without the emergency overlay.
    let without = json!({"params": {"a": 2}});
    let baseline = resolve(&defaults, Some(&without), &[], QosTier::Full, None, NOW);
    assert_eq!(expired.effective, baseline.effective);
    assert_eq!(expired.hash, baseline.hash);
}

#[test]
fn test_scalar_reset_discards_default_subtree() {
    let defaults = json!({"b": {"x": 1, "y": 2}});
    let flow_patch = json!({"params": {"b": 7}});
    let resolved = resolve(&defaults, Some(&flow_patch), &[], QosTier::Full, None, NOW);
    assert_eq!(resolved.effective, json!({"b": 7}));

    // A later object overlay re-bases on the reset, the defaults stay gone.
    let flow_patch = json!({
        "params": {"b": 7},
        "qos": {"tiers": {"conserve": {"patch": {"params": {"b": {"z": 3}}}}}}
    });
    let resolved = resolve(
        &defaults,
        Some(&flow_patch),
        &[],
        QosTier::Conserve,
        None,
        NOW,
    );
    assert_eq!(resolved.effective, json!({"b": {"z": 3}}));
}

#[test]
fn test_arrays_replace_atomically() {
    let defaults = json!({"list": [1, 2, 3], "keep": true});
    let flow_patch = json!({"params": {"list": [9]}});
    let resolved = resolve(&defaults, Some(&flow_patch), &[], QosTier::Full, None, NOW);
    assert_eq!(resolved.effective, json!({"keep": true, "list": [9]}));
}
