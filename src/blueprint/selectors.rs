//! Host-provided named predicates looked up by selector gates.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::context::FlowContext;

/// A selector predicate over the request-scoped context.
pub type SelectorFn = Arc<dyn Fn(&FlowContext) -> bool + Send + Sync>;

/// Immutable name → predicate registry, built at startup and shared across
/// requests.
#[derive(Clone, Default)]
pub struct SelectorRegistry {
    selectors: FxHashMap<String, SelectorFn>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        SelectorRegistry::default()
    }

    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FlowContext) -> bool + Send + Sync + 'static,
    {
        self.selectors.insert(name.into(), Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SelectorFn> {
        self.selectors.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.selectors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.selectors.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for SelectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("SelectorRegistry")
            .field("selectors", &names)
            .finish()
    }
}
