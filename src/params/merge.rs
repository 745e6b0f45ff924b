//! Layered deep-merge with per-leaf provenance.
//!
//! Overlays fold into the effective document lowest-precedence first. At
//! each object node the merge recurses; a non-object overlay value wins its
//! whole subtree (a *reset*), and a later object overlay on top of a reset
//! rebuilds the subtree from the reset onward rather than resurrecting
//! anything below it. Arrays replace atomically, never merge.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::jsonpath::join_dotted;
use crate::overlay::OverlayLayer;
use crate::patchdoc::QosTier;
use serde::Serialize;

/// Which overlay "won" one leaf path of the effective params.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub path: String,
    pub layer: OverlayLayer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos_tier: Option<QosTier>,
}

/// Identifies one overlay layer while merging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerTag {
    pub layer: OverlayLayer,
    pub experiment_layer: Option<String>,
    pub experiment_variant: Option<String>,
    pub qos_tier: Option<QosTier>,
}

impl LayerTag {
    pub fn default_layer() -> Self {
        LayerTag {
            layer: OverlayLayer::Default,
            experiment_layer: None,
            experiment_variant: None,
            qos_tier: None,
        }
    }

    pub fn base() -> Self {
        LayerTag {
            layer: OverlayLayer::Base,
            ..LayerTag::default_layer()
        }
    }

    pub fn experiment(layer: impl Into<String>, variant: impl Into<String>) -> Self {
        LayerTag {
            layer: OverlayLayer::Experiment,
            experiment_layer: Some(layer.into()),
            experiment_variant: Some(variant.into()),
            qos_tier: None,
        }
    }

    pub fn qos(tier: QosTier) -> Self {
        LayerTag {
            layer: OverlayLayer::Qos,
            qos_tier: Some(tier),
            ..LayerTag::default_layer()
        }
    }

    pub fn emergency() -> Self {
        LayerTag {
            layer: OverlayLayer::Emergency,
            ..LayerTag::default_layer()
        }
    }

    fn entry(&self, path: String) -> SourceEntry {
        SourceEntry {
            path,
            layer: self.layer,
            experiment_layer: self.experiment_layer.clone(),
            experiment_variant: self.experiment_variant.clone(),
            qos_tier: self.qos_tier,
        }
    }
}

/// Fold overlay layers (lowest precedence first) into one effective object
/// plus the winning provenance per leaf path, sorted by path.
pub(crate) fn merge_layers(layers: &[(LayerTag, &Value)]) -> (Value, Vec<SourceEntry>) {
    let mut effective = Map::new();
    let mut sources: BTreeMap<String, SourceEntry> = BTreeMap::new();
    for (tag, value) in layers {
        if let Some(object) = value.as_object() {
            apply_overlay(&mut effective, object, "", tag, &mut sources);
        }
    }
    (
        Value::Object(effective),
        sources.into_values().collect(),
    )
}

fn apply_overlay(
    dest: &mut Map<String, Value>,
    src: &Map<String, Value>,
    prefix: &str,
    tag: &LayerTag,
    sources: &mut BTreeMap<String, SourceEntry>,
) {
    for (key, incoming) in src {
        let path = join_dotted(prefix, key);
        match incoming {
            Value::Object(incoming_obj) => {
                match dest.get_mut(key) {
                    Some(Value::Object(existing)) => {
                        // Both objects: recurse, untouched leaves keep their
                        // provenance.
                        apply_overlay(existing, incoming_obj, &path, tag, sources);
                    }
                    _ => {
                        // Reset re-bases the recursion: whatever was below
                        // (scalar, array, or nothing) is discarded.
                        drop_subtree_sources(sources, &path);
                        let mut fresh = Map::new();
                        apply_overlay(&mut fresh, incoming_obj, &path, tag, sources);
                        dest.insert(key.clone(), Value::Object(fresh));
                    }
                }
            }
            leaf => {
                // Non-object wins the whole subtree.
                drop_subtree_sources(sources, &path);
                sources.insert(path.clone(), tag.entry(path));
                dest.insert(key.clone(), leaf.clone());
            }
        }
    }
}

/// Remove provenance entries at `path` and everywhere under it.
fn drop_subtree_sources(sources: &mut BTreeMap<String, SourceEntry>, path: &str) {
    sources.remove(path);
    // All descendants share the `path.` prefix and are contiguous in the
    // sorted map; sibling keys like `b-q` sort outside that range.
    let child_prefix = format!("{path}.");
    let stale: Vec<String> = sources
        .range(child_prefix.clone()..)
        .take_while(|(p, _)| p.starts_with(&child_prefix))
        .map(|(p, _)| p.clone())
        .collect();
    for key in stale {
        sources.remove(&key);
    }
}
