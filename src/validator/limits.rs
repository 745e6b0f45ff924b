//! `limits` section checks: `limits.moduleConcurrency.maxInFlight` maps
//! limit keys to positive in-flight caps.

use serde_json::Value;

use super::Pass;
use crate::codes;
use crate::jsonpath::JsonPath;
use crate::patchdoc::{fields, is_valid_limit_key};

impl Pass<'_> {
    pub(crate) fn check_limits(&mut self, limits: &Value, path: &JsonPath) {
        let Some(limits_map) = self.require_object(limits, path, "'limits'") else {
            return;
        };
        for key in limits_map.keys() {
            if key != fields::MODULE_CONCURRENCY {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    path.key(key),
                    format!("unknown limits field '{key}'"),
                );
            }
        }

        let Some(concurrency) = limits_map.get(fields::MODULE_CONCURRENCY) else {
            return;
        };
        let concurrency_path = path.key(fields::MODULE_CONCURRENCY);
        let Some(concurrency_map) =
            self.require_object(concurrency, &concurrency_path, "'moduleConcurrency'")
        else {
            return;
        };
        for key in concurrency_map.keys() {
            if key != fields::MAX_IN_FLIGHT {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    concurrency_path.key(key),
                    format!("unknown moduleConcurrency field '{key}'"),
                );
            }
        }

        let Some(max_in_flight) = concurrency_map.get(fields::MAX_IN_FLIGHT) else {
            return;
        };
        let in_flight_path = concurrency_path.key(fields::MAX_IN_FLIGHT);
        let Some(entries) = self.require_object(max_in_flight, &in_flight_path, "'maxInFlight'")
        else {
            return;
        };
        for (limit_key, value) in entries {
            let entry_path = in_flight_path.key(limit_key);
            if !is_valid_limit_key(limit_key) {
                self.error(
                    codes::CFG_LIMIT_KEY_INVALID,
                    entry_path.clone(),
                    "limit keys must be non-empty, at most 128 chars, with no whitespace or control characters",
                );
            }
            let in_range = value
                .as_i64()
                .is_some_and(|v| v > 0 && v <= i64::from(i32::MAX));
            if !in_range {
                self.error(
                    codes::CFG_LIMIT_VALUE_INVALID,
                    entry_path,
                    "maxInFlight values must be positive 32-bit integers",
                );
            }
        }
    }
}
