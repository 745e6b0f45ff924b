//! Patch document vocabulary: field names, the supported schema version,
//! and the QoS tier enum.
//!
//! The patch itself stays a borrowed `serde_json::Value` everywhere; the
//! validator and evaluator walk it with the constants here rather than
//! binding it into owned structs, so the input JSON is never mutated or
//! copied wholesale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::InputError;

/// The only schema version this compiler accepts.
pub const SUPPORTED_SCHEMA_VERSION: &str = "v1";

/// Top-level and nested field names of the patch document.
pub mod fields {
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const FLOWS: &str = "flows";
    pub const LIMITS: &str = "limits";
    pub const MODULE_CONCURRENCY: &str = "moduleConcurrency";
    pub const MAX_IN_FLIGHT: &str = "maxInFlight";

    pub const PARAMS: &str = "params";
    pub const STAGES: &str = "stages";
    pub const EXPERIMENTS: &str = "experiments";
    pub const QOS: &str = "qos";
    pub const TIERS: &str = "tiers";
    pub const EMERGENCY: &str = "emergency";

    pub const FANOUT_MAX: &str = "fanoutMax";
    pub const MODULES: &str = "modules";

    pub const ID: &str = "id";
    pub const USE: &str = "use";
    pub const WITH: &str = "with";
    pub const ENABLED: &str = "enabled";
    pub const PRIORITY: &str = "priority";
    pub const GATE: &str = "gate";
    pub const SHADOW: &str = "shadow";
    pub const SAMPLE: &str = "sample";
    pub const LIMIT_KEY: &str = "limitKey";
    pub const MEMO_KEY: &str = "memoKey";

    pub const LAYER: &str = "layer";
    pub const VARIANT: &str = "variant";
    pub const PATCH: &str = "patch";

    pub const REASON: &str = "reason";
    pub const OPERATOR: &str = "operator";
    pub const TTL_MINUTES: &str = "ttl_minutes";
}

/// Module id and priority envelope.
pub const MODULE_ID_MAX_LEN: usize = 64;
pub const MODULE_PRIORITY_MIN: i64 = -1000;
pub const MODULE_PRIORITY_MAX: i64 = 1000;
pub const LIMIT_KEY_MAX_LEN: usize = 128;

/// Coarse service-quality bucket. A tier can restrict a flow's work, never
/// expand it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosTier {
    Full,
    Conserve,
    Emergency,
    Fallback,
}

impl QosTier {
    pub const ALL: [QosTier; 4] = [
        QosTier::Full,
        QosTier::Conserve,
        QosTier::Emergency,
        QosTier::Fallback,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QosTier::Full => "full",
            QosTier::Conserve => "conserve",
            QosTier::Emergency => "emergency",
            QosTier::Fallback => "fallback",
        }
    }

    #[must_use]
    pub fn is_known_tier_name(name: &str) -> bool {
        QosTier::ALL.iter().any(|t| t.as_str() == name)
    }
}

impl fmt::Display for QosTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QosTier {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(QosTier::Full),
            "conserve" => Ok(QosTier::Conserve),
            "emergency" => Ok(QosTier::Emergency),
            "fallback" => Ok(QosTier::Fallback),
            other => Err(InputError::new(
                "QOS_TIER_INPUT_INVALID",
                format!("unsupported QoS tier '{other}'"),
            )),
        }
    }
}

/// A module id: lowercase `[a-z0-9_]`, length 1..=64.
#[must_use]
pub fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MODULE_ID_MAX_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// A limit key: non-empty, bounded length, no whitespace or control chars.
#[must_use]
pub fn is_valid_limit_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= LIMIT_KEY_MAX_LEN
        && !key.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_format() {
        assert!(is_valid_module_id("m1"));
        assert!(is_valid_module_id("re_rank_2"));
        assert!(!is_valid_module_id(""));
        assert!(!is_valid_module_id("UpperCase"));
        assert!(!is_valid_module_id("has-dash"));
        assert!(!is_valid_module_id(&"a".repeat(65)));
    }

    #[test]
    fn test_limit_key_format() {
        assert!(is_valid_limit_key("search.retrieval"));
        assert!(!is_valid_limit_key(""));
        assert!(!is_valid_limit_key("has space"));
        assert!(!is_valid_limit_key("ctl\u{7}"));
        assert!(!is_valid_limit_key(&"k".repeat(129)));
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in QosTier::ALL {
            assert_eq!(tier.as_str().parse::<QosTier>().unwrap(), tier);
        }
        assert!("premium".parse::<QosTier>().is_err());
    }
}
