//! Config snapshots and the provider seam.
//!
//! The core never fetches anything itself: a host-supplied
//! [`ConfigProvider`] yields [`ConfigSnapshot`]s, and the
//! [`lkg::LkgProvider`] wrapper keeps a persisted last-known-good snapshot
//! to fall back to when the upstream fails or serves a bad config.

pub mod lkg;
pub mod store;

pub use lkg::LkgProvider;
pub use store::{MemorySnapshotStore, SnapshotStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a snapshot came from and the evidence trail for fallbacks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub source: String,
    #[serde(rename = "timestampUtc")]
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default)]
    pub overlays: Vec<String>,
    #[serde(
        rename = "lkgFallbackEvidence",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lkg_fallback_evidence: Option<String>,
}

/// One immutable configuration snapshot. The persisted LKG layout is this
/// same blob: `{configVersion, patchJson, meta}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(rename = "configVersion")]
    pub config_version: u64,
    #[serde(rename = "patchJson")]
    pub patch_json: String,
    pub meta: SnapshotMeta,
}

impl ConfigSnapshot {
    pub fn new(
        config_version: u64,
        patch_json: impl Into<String>,
        source: impl Into<String>,
        timestamp_utc: DateTime<Utc>,
    ) -> Self {
        ConfigSnapshot {
            config_version,
            patch_json: patch_json.into(),
            meta: SnapshotMeta {
                source: source.into(),
                timestamp_utc,
                overlays: Vec::new(),
                lkg_fallback_evidence: None,
            },
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("upstream config fetch failed: {message}")]
    #[diagnostic(code(flowpatch::provider::upstream))]
    Upstream { message: String },

    #[error("no config snapshot available (upstream failed and no LKG is cached)")]
    #[diagnostic(code(flowpatch::provider::no_snapshot))]
    NoSnapshotAvailable,

    #[error("persisted snapshot could not be decoded: {message}")]
    #[diagnostic(code(flowpatch::provider::decode))]
    Decode { message: String },
}

/// Source of configuration snapshots. The only suspension point in the
/// crate.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn fetch(&self) -> Result<ConfigSnapshot, ProviderError>;
}
