//! Experiment-layer ownership: which parameter paths and module ids each
//! layer is allowed to touch.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::jsonpath::owns_path;

/// Ownership grant for one experiment layer.
#[derive(Clone, Debug, Default)]
pub struct LayerOwnership {
    /// Dotted parameter path prefixes; `a.b` owns `a.b` and `a.b.c`,
    /// not `a.bx`.
    pub param_path_prefixes: Vec<String>,
    pub module_ids: FxHashSet<String>,
}

impl LayerOwnership {
    pub fn new() -> Self {
        LayerOwnership::default()
    }

    #[must_use]
    pub fn own_params(mut self, prefix: impl Into<String>) -> Self {
        self.param_path_prefixes.push(prefix.into());
        self
    }

    #[must_use]
    pub fn own_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_ids.insert(module_id.into());
        self
    }
}

/// Layer → ownership contract, consumed read-only by the validator.
///
/// A layer absent from the contract owns nothing: every path it touches is
/// a leak.
#[derive(Clone, Debug, Default)]
pub struct ExperimentLayerOwnershipContract {
    layers: FxHashMap<String, LayerOwnership>,
}

impl ExperimentLayerOwnershipContract {
    pub fn new() -> Self {
        ExperimentLayerOwnershipContract::default()
    }

    #[must_use]
    pub fn layer(mut self, name: impl Into<String>, ownership: LayerOwnership) -> Self {
        self.layers.insert(name.into(), ownership);
        self
    }

    #[must_use]
    pub fn owns_param_path(&self, layer: &str, path: &str) -> bool {
        self.layers.get(layer).is_some_and(|o| {
            o.param_path_prefixes
                .iter()
                .any(|prefix| owns_path(prefix, path))
        })
    }

    #[must_use]
    pub fn owns_module(&self, layer: &str, module_id: &str) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|o| o.module_ids.contains(module_id))
    }
}
