//! Persisted last-known-good wrapper around an upstream config provider.
//!
//! Every upstream candidate is validated and overlay-evaluated against the
//! full registry before it can replace the LKG. Bad candidates are
//! remembered by version so a broken upstream cannot flap the active
//! config; all fallbacks are silent apart from telemetry.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use super::{ConfigProvider, ConfigSnapshot, ProviderError, SnapshotStore};
use crate::blueprint::{FlowRegistry, ModuleCatalog, SelectorRegistry};
use crate::context::RequestOptions;
use crate::overlay::{OverlayEvaluator, OverlayInputs};
use crate::patchdoc::QosTier;
use crate::validator::Validator;

/// LKG-caching provider. Shareable across tasks; lock scopes never span an
/// await.
pub struct LkgProvider<P, S> {
    upstream: P,
    store: S,
    registry: Arc<FlowRegistry>,
    catalog: Arc<ModuleCatalog>,
    selectors: Arc<SelectorRegistry>,
    lkg: RwLock<Option<Arc<ConfigSnapshot>>>,
    rejected_versions: Mutex<FxHashSet<u64>>,
}

impl<P, S> LkgProvider<P, S>
where
    P: ConfigProvider,
    S: SnapshotStore,
{
    pub fn new(
        upstream: P,
        store: S,
        registry: Arc<FlowRegistry>,
        catalog: Arc<ModuleCatalog>,
        selectors: Arc<SelectorRegistry>,
    ) -> Self {
        LkgProvider {
            upstream,
            store,
            registry,
            catalog,
            selectors,
            lkg: RwLock::new(None),
            rejected_versions: Mutex::new(FxHashSet::default()),
        }
    }

    /// Hydrate the LKG slot from the persisted blob, typically at startup.
    /// Returns whether a snapshot was loaded.
    pub async fn load_persisted(&self) -> bool {
        match self.store.try_load().await {
            Some(snapshot) => {
                let version = snapshot.config_version;
                *self.lkg.write().expect("lkg lock poisoned") = Some(Arc::new(snapshot));
                debug!(config_version = version, "loaded persisted LKG snapshot");
                true
            }
            None => false,
        }
    }

    /// The currently cached LKG, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.lkg.read().expect("lkg lock poisoned").clone()
    }

    /// Fetch a snapshot, falling back to the LKG on upstream failure or a
    /// rejected candidate.
    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<Arc<ConfigSnapshot>, ProviderError> {
        let candidate = match self.upstream.fetch().await {
            Ok(candidate) => candidate,
            Err(error) => {
                warn!(config_lkg_fallback = true, %error, "upstream fetch failed, serving LKG");
                return self.fallback(format!("upstream fetch failed: {error}"));
            }
        };

        if let Some(current) = self.current()
            && current.config_version == candidate.config_version
        {
            return Ok(current);
        }

        let already_rejected = self
            .rejected_versions
            .lock()
            .expect("rejection cache lock poisoned")
            .contains(&candidate.config_version);
        if already_rejected {
            warn!(
                config_lkg_fallback = true,
                config_version = candidate.config_version,
                "candidate was previously rejected, serving LKG"
            );
            return self.fallback(format!(
                "config version {} was previously rejected",
                candidate.config_version
            ));
        }

        if let Err(reason) = self.vet_candidate(&candidate, now) {
            self.rejected_versions
                .lock()
                .expect("rejection cache lock poisoned")
                .insert(candidate.config_version);
            warn!(
                config_lkg_fallback = true,
                config_version = candidate.config_version,
                %reason,
                "candidate rejected, serving LKG"
            );
            return self.fallback(reason);
        }

        self.accept(candidate).await
    }

    /// Validator + overlay evaluation across every registered flow.
    fn vet_candidate(&self, candidate: &ConfigSnapshot, now: DateTime<Utc>) -> Result<(), String> {
        let root: Value = serde_json::from_str(&candidate.patch_json)
            .map_err(|e| format!("candidate patch is not valid JSON: {e}"))?;

        let validator = Validator::new(
            self.registry.as_ref(),
            self.catalog.as_ref(),
            self.selectors.as_ref(),
        );
        let report = validator.validate_value(&root);
        if !report.is_valid() {
            return Err(format!(
                "candidate failed validation with {} error finding(s)",
                report.error_count()
            ));
        }

        let evaluator = OverlayEvaluator::new();
        let options = RequestOptions::default();
        for flow_name in self.registry.flow_names() {
            let _ = evaluator.evaluate(OverlayInputs {
                flow_name,
                patch: &root,
                options: &options,
                qos_tier: QosTier::Full,
                config_timestamp_utc: Some(candidate.meta.timestamp_utc),
                now,
                config_version: candidate.config_version,
            });
        }
        Ok(())
    }

    async fn accept(&self, candidate: ConfigSnapshot) -> Result<Arc<ConfigSnapshot>, ProviderError> {
        let accepted = Arc::new(candidate);
        *self.lkg.write().expect("lkg lock poisoned") = Some(Arc::clone(&accepted));
        self.rejected_versions
            .lock()
            .expect("rejection cache lock poisoned")
            .clear();

        if !self.store.try_store(&accepted).await {
            // Persistence failure costs durability, not availability.
            warn!(
                config_lkg_snapshot_persist_failure = true,
                config_version = accepted.config_version,
                "failed to persist accepted LKG snapshot"
            );
        }
        Ok(accepted)
    }

    fn fallback(&self, evidence: String) -> Result<Arc<ConfigSnapshot>, ProviderError> {
        match self.current() {
            Some(lkg) => {
                let mut marked = (*lkg).clone();
                marked.meta.lkg_fallback_evidence = Some(evidence);
                Ok(Arc::new(marked))
            }
            None => Err(ProviderError::NoSnapshotAvailable),
        }
    }
}
