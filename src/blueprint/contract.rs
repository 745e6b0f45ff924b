//! Per-stage execution contracts.
//!
//! A [`StageContract`] is the blueprint's envelope for what a patch may ask
//! a stage to do: whether dynamic and shadow modules are allowed at all,
//! which module types may appear, and the hard and soft limits on counts,
//! fan-out, and shadow sampling.

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Absolute ceiling on `fanoutMax`, regardless of contract range.
pub const MAX_ALLOWED_FANOUT_MAX: u32 = 8;

/// Basis-point ceiling for shadow sampling (100%).
pub const MAX_SHADOW_SAMPLE_BPS: u32 = 10_000;

#[derive(Debug, Error, Diagnostic)]
pub enum ContractError {
    #[error("maxShadowSampleBps {bps} exceeds {MAX_SHADOW_SAMPLE_BPS}")]
    #[diagnostic(code(flowpatch::blueprint::shadow_bps_out_of_range))]
    ShadowSampleBpsOutOfRange { bps: u32 },

    #[error("fanoutMax range [{min}, {max}] is invalid (ceiling {MAX_ALLOWED_FANOUT_MAX})")]
    #[diagnostic(code(flowpatch::blueprint::fanout_range_invalid))]
    FanoutRangeInvalid { min: u32, max: u32 },

    #[error("maxModulesWarn {warn} exceeds maxModulesHard {hard}")]
    #[diagnostic(code(flowpatch::blueprint::module_budget_invalid))]
    ModuleBudgetInvalid { warn: usize, hard: usize },
}

/// Immutable per-stage contract, built once at blueprint registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageContract {
    pub allows_dynamic_modules: bool,
    pub allows_shadow_modules: bool,
    /// Allowlist of module type ids; empty means any catalog type.
    pub allowed_module_types: FxHashSet<String>,
    pub max_modules_warn: usize,
    pub max_modules_hard: usize,
    pub max_shadow_modules_hard: usize,
    pub max_shadow_sample_bps: u32,
    pub min_fanout_max: u32,
    pub max_fanout_max: u32,
}

impl StageContract {
    pub fn builder() -> StageContractBuilder {
        StageContractBuilder::default()
    }

    /// Whether `module_type` may appear in this stage.
    #[must_use]
    pub fn allows_type(&self, module_type: &str) -> bool {
        self.allowed_module_types.is_empty() || self.allowed_module_types.contains(module_type)
    }
}

impl Default for StageContract {
    fn default() -> Self {
        StageContract {
            allows_dynamic_modules: true,
            allows_shadow_modules: true,
            allowed_module_types: FxHashSet::default(),
            max_modules_warn: 4,
            max_modules_hard: MAX_ALLOWED_FANOUT_MAX as usize,
            max_shadow_modules_hard: 4,
            max_shadow_sample_bps: MAX_SHADOW_SAMPLE_BPS,
            min_fanout_max: 0,
            max_fanout_max: MAX_ALLOWED_FANOUT_MAX,
        }
    }
}

/// Fluent builder mirroring the contract fields, validated on `build`.
#[derive(Debug, Default)]
pub struct StageContractBuilder {
    contract: StageContract,
}

impl StageContractBuilder {
    #[must_use]
    pub fn dynamic_modules(mut self, allowed: bool) -> Self {
        self.contract.allows_dynamic_modules = allowed;
        self
    }

    #[must_use]
    pub fn shadow_modules(mut self, allowed: bool) -> Self {
        self.contract.allows_shadow_modules = allowed;
        self
    }

    #[must_use]
    pub fn allow_module_type(mut self, module_type: impl Into<String>) -> Self {
        self.contract.allowed_module_types.insert(module_type.into());
        self
    }

    #[must_use]
    pub fn module_budget(mut self, warn: usize, hard: usize) -> Self {
        self.contract.max_modules_warn = warn;
        self.contract.max_modules_hard = hard;
        self
    }

    #[must_use]
    pub fn max_shadow_modules(mut self, hard: usize) -> Self {
        self.contract.max_shadow_modules_hard = hard;
        self
    }

    #[must_use]
    pub fn max_shadow_sample_bps(mut self, bps: u32) -> Self {
        self.contract.max_shadow_sample_bps = bps;
        self
    }

    #[must_use]
    pub fn fanout_range(mut self, min: u32, max: u32) -> Self {
        self.contract.min_fanout_max = min;
        self.contract.max_fanout_max = max;
        self
    }

    pub fn build(self) -> Result<StageContract, ContractError> {
        let c = self.contract;
        if c.max_shadow_sample_bps > MAX_SHADOW_SAMPLE_BPS {
            return Err(ContractError::ShadowSampleBpsOutOfRange {
                bps: c.max_shadow_sample_bps,
            });
        }
        if c.min_fanout_max > c.max_fanout_max || c.max_fanout_max > MAX_ALLOWED_FANOUT_MAX {
            return Err(ContractError::FanoutRangeInvalid {
                min: c.min_fanout_max,
                max: c.max_fanout_max,
            });
        }
        if c.max_modules_warn > c.max_modules_hard {
            return Err(ContractError::ModuleBudgetInvalid {
                warn: c.max_modules_warn,
                hard: c.max_modules_hard,
            });
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_inverted_fanout_range() {
        let err = StageContract::builder().fanout_range(5, 2).build();
        assert!(matches!(err, Err(ContractError::FanoutRangeInvalid { .. })));
    }

    #[test]
    fn test_empty_allowlist_allows_any_type() {
        let contract = StageContract::default();
        assert!(contract.allows_type("anything"));
        let restricted = StageContract::builder()
            .allow_module_type("noop")
            .build()
            .unwrap();
        assert!(restricted.allows_type("noop"));
        assert!(!restricted.allows_type("other"));
    }
}
