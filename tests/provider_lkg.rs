//! LKG wrapper behavior: fallback on upstream failure, rejection caching,
//! acceptance, and persistence.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use flowpatch::provider::store::JsonFileSnapshotStore;
use flowpatch::provider::{
    ConfigProvider, ConfigSnapshot, LkgProvider, MemorySnapshotStore, ProviderError, SnapshotStore,
};

mod common;
use common::*;

/// Upstream that serves a scripted sequence of responses.
struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ConfigSnapshot, String>>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ConfigSnapshot, String>>) -> Self {
        ScriptedProvider {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ConfigProvider for ScriptedProvider {
    async fn fetch(&self) -> Result<ConfigSnapshot, ProviderError> {
        match self.responses.lock().await.pop_front() {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(ProviderError::Upstream { message }),
            None => Err(ProviderError::Upstream {
                message: "script exhausted".to_string(),
            }),
        }
    }
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl SnapshotStore for BrokenStore {
    async fn try_load(&self) -> Option<ConfigSnapshot> {
        None
    }

    async fn try_store(&self, _snapshot: &ConfigSnapshot) -> bool {
        false
    }
}

fn snapshot(version: u64, patch: &serde_json::Value) -> ConfigSnapshot {
    ConfigSnapshot::new(version, patch.to_string(), "test", utc("2025-01-01T00:00:00Z"))
}

fn lkg<P: ConfigProvider, S: flowpatch::provider::SnapshotStore>(
    upstream: P,
    store: S,
) -> LkgProvider<P, S> {
    LkgProvider::new(
        upstream,
        store,
        Arc::new(test_registry()),
        Arc::new(test_catalog()),
        Arc::new(test_selectors()),
    )
}

#[tokio::test]
async fn test_accepts_valid_candidate_and_persists() {
    let store = MemorySnapshotStore::new();
    let provider = lkg(
        ScriptedProvider::new(vec![Ok(snapshot(1, &baseline_patch()))]),
        store,
    );
    let accepted = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(accepted.config_version, 1);
    assert!(accepted.meta.lkg_fallback_evidence.is_none());
    assert_eq!(provider.current().unwrap().config_version, 1);
}

#[tokio::test]
async fn test_upstream_failure_falls_back_to_lkg() {
    let provider = lkg(
        ScriptedProvider::new(vec![
            Ok(snapshot(1, &baseline_patch())),
            Err("connection refused".to_string()),
        ]),
        MemorySnapshotStore::new(),
    );
    provider.snapshot(Utc::now()).await.unwrap();

    let fallback = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(fallback.config_version, 1);
    let evidence = fallback.meta.lkg_fallback_evidence.as_deref().unwrap();
    assert!(evidence.contains("connection refused"));
}

#[tokio::test]
async fn test_upstream_failure_without_lkg_is_an_error() {
    let provider = lkg(
        ScriptedProvider::new(vec![Err("down".to_string())]),
        MemorySnapshotStore::new(),
    );
    let result = provider.snapshot(Utc::now()).await;
    assert!(matches!(result, Err(ProviderError::NoSnapshotAvailable)));
}

#[tokio::test]
async fn test_invalid_candidate_rejected_and_remembered() {
    let bad_patch = serde_json::json!({
        "schemaVersion": "v1",
        "unknown_field": true,
        "flows": {}
    });
    let provider = lkg(
        ScriptedProvider::new(vec![
            Ok(snapshot(1, &baseline_patch())),
            Ok(snapshot(2, &bad_patch)),
            Ok(snapshot(2, &bad_patch)),
        ]),
        MemorySnapshotStore::new(),
    );
    provider.snapshot(Utc::now()).await.unwrap();

    // First sighting: vetted and rejected.
    let fallback = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(fallback.config_version, 1);
    assert!(fallback.meta.lkg_fallback_evidence.is_some());

    // Second sighting: served from the rejection cache.
    let fallback = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(fallback.config_version, 1);
    assert!(
        fallback
            .meta
            .lkg_fallback_evidence
            .as_deref()
            .unwrap()
            .contains("previously rejected")
    );
}

#[tokio::test]
async fn test_same_version_returns_lkg_unchanged() {
    let provider = lkg(
        ScriptedProvider::new(vec![
            Ok(snapshot(1, &baseline_patch())),
            Ok(snapshot(1, &baseline_patch())),
        ]),
        MemorySnapshotStore::new(),
    );
    let first = provider.snapshot(Utc::now()).await.unwrap();
    let second = provider.snapshot(Utc::now()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second), "same version short-circuits");
}

#[tokio::test]
async fn test_acceptance_clears_rejection_cache() {
    let bad_patch = serde_json::json!({"schemaVersion": "v0"});
    let provider = lkg(
        ScriptedProvider::new(vec![
            Ok(snapshot(1, &baseline_patch())),
            Ok(snapshot(2, &bad_patch)),
            Ok(snapshot(3, &baseline_patch())),
        ]),
        MemorySnapshotStore::new(),
    );
    provider.snapshot(Utc::now()).await.unwrap();
    let fallback = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(fallback.config_version, 1);
    let accepted = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(accepted.config_version, 3);
}

#[tokio::test]
async fn test_persist_failure_is_non_fatal() {
    let provider = lkg(
        ScriptedProvider::new(vec![Ok(snapshot(1, &baseline_patch()))]),
        BrokenStore,
    );
    let accepted = provider.snapshot(Utc::now()).await.unwrap();
    assert_eq!(accepted.config_version, 1);
    assert_eq!(provider.current().unwrap().config_version, 1);
}

#[tokio::test]
async fn test_load_persisted_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lkg.json");

    let store = JsonFileSnapshotStore::new(&path);
    let provider = lkg(
        ScriptedProvider::new(vec![Ok(snapshot(7, &baseline_patch()))]),
        store,
    );
    provider.snapshot(Utc::now()).await.unwrap();

    // A fresh provider hydrates from the persisted blob.
    let rehydrated = lkg(
        ScriptedProvider::new(vec![]),
        JsonFileSnapshotStore::new(&path),
    );
    assert!(rehydrated.load_persisted().await);
    assert_eq!(rehydrated.current().unwrap().config_version, 7);
}
