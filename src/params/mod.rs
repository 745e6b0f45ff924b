//! Effective parameter resolution.
//!
//! Deterministic deep-merge of `default → base → active experiments → qos →
//! emergency` parameter objects into one effective tree, with a stable
//! 64-bit hash of the canonical bytes and per-path provenance for the Full
//! explain level.

mod merge;

pub use merge::{LayerTag, SourceEntry};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::instrument;

use crate::canonical::to_canonical_string;
use crate::hashing::fnv1a_64;
use crate::overlay::emergency_expired;
use crate::patchdoc::{QosTier, fields};

/// Inputs for one params resolution.
#[derive(Clone, Copy, Debug)]
pub struct ParamsInputs<'a> {
    /// The flow blueprint's default params (always an object).
    pub default_params: &'a Value,
    /// The raw `flows.<name>` sub-element, if the patch has one.
    pub flow_patch: Option<&'a Value>,
    pub variants: &'a FxHashMap<String, String>,
    pub qos_tier: QosTier,
    pub config_timestamp_utc: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// The resolved parameter document for one `(request, flow)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedParams {
    pub effective: Value,
    /// Canonical bytes the hash is defined over.
    pub canonical_json: String,
    pub hash: u64,
    /// Winning overlay per leaf path, sorted by path.
    pub sources: Vec<SourceEntry>,
    /// True when an emergency params overlay was present but TTL-expired.
    pub emergency_dropped: bool,
}

/// Pure params resolver.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParamsResolver;

impl ParamsResolver {
    pub fn new() -> Self {
        ParamsResolver
    }

    /// Merge all overlay layers and hash the canonical output.
    #[instrument(level = "debug", skip_all, fields(tier = %inputs.qos_tier))]
    #[must_use]
    pub fn resolve(&self, inputs: ParamsInputs<'_>) -> ResolvedParams {
        let mut layers: Vec<(LayerTag, &Value)> =
            vec![(LayerTag::default_layer(), inputs.default_params)];
        let mut emergency_dropped = false;

        if let Some(flow_patch) = inputs.flow_patch.and_then(Value::as_object) {
            if let Some(base_params) = flow_patch.get(fields::PARAMS) {
                layers.push((LayerTag::base(), base_params));
            }

            if let Some(experiments) =
                flow_patch.get(fields::EXPERIMENTS).and_then(Value::as_array)
            {
                for experiment in experiments {
                    let Some(object) = experiment.as_object() else {
                        continue;
                    };
                    let (Some(layer), Some(variant)) = (
                        object.get(fields::LAYER).and_then(Value::as_str),
                        object.get(fields::VARIANT).and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    if inputs.variants.get(layer).map(String::as_str) != Some(variant) {
                        continue;
                    }
                    if let Some(params) = object
                        .get(fields::PATCH)
                        .and_then(|patch| patch.get(fields::PARAMS))
                    {
                        layers.push((LayerTag::experiment(layer, variant), params));
                    }
                }
            }

            if let Some(params) = flow_patch
                .get(fields::QOS)
                .and_then(|qos| qos.get(fields::TIERS))
                .and_then(|tiers| tiers.get(inputs.qos_tier.as_str()))
                .and_then(|tier| tier.get(fields::PATCH))
                .and_then(|patch| patch.get(fields::PARAMS))
            {
                layers.push((LayerTag::qos(inputs.qos_tier), params));
            }

            if let Some(emergency) = flow_patch.get(fields::EMERGENCY).and_then(Value::as_object)
            {
                if emergency_expired(emergency, inputs.config_timestamp_utc, inputs.now) {
                    emergency_dropped = true;
                } else if let Some(params) = emergency
                    .get(fields::PATCH)
                    .and_then(|patch| patch.get(fields::PARAMS))
                {
                    layers.push((LayerTag::emergency(), params));
                }
            }
        }

        let (effective, sources) = merge::merge_layers(&layers);
        let canonical_json = to_canonical_string(&effective);
        let hash = fnv1a_64(canonical_json.as_bytes());
        ResolvedParams {
            effective,
            canonical_json,
            hash,
            sources,
            emergency_dropped,
        }
    }
}
