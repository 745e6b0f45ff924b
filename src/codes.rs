//! Stable code strings shared across the validator, decision computer, and
//! explain serializers.
//!
//! Every string in this module is part of the public tooling contract:
//! downstream dashboards and alerting key on them, so they must never drift.
//! New codes may be added; existing ones are frozen.

// ---------------------------------------------------------------------------
// Validation finding codes (CFG_*)
// ---------------------------------------------------------------------------

/// The patch document could not be parsed as JSON at all.
pub const CFG_PARSE_ERROR: &str = "CFG_PARSE_ERROR";
/// `schemaVersion` is missing or not `"v1"`.
pub const CFG_SCHEMA_VERSION_UNSUPPORTED: &str = "CFG_SCHEMA_VERSION_UNSUPPORTED";
/// A field not recognized at its position in the document.
pub const CFG_UNKNOWN_FIELD: &str = "CFG_UNKNOWN_FIELD";
/// A recognized field carrying a JSON value of the wrong shape.
pub const CFG_FIELD_TYPE_INVALID: &str = "CFG_FIELD_TYPE_INVALID";

pub const CFG_FLOW_NOT_REGISTERED: &str = "CFG_FLOW_NOT_REGISTERED";

pub const CFG_LIMIT_KEY_INVALID: &str = "CFG_LIMIT_KEY_INVALID";
pub const CFG_LIMIT_VALUE_INVALID: &str = "CFG_LIMIT_VALUE_INVALID";

pub const CFG_PARAMS_UNKNOWN_FIELD: &str = "CFG_PARAMS_UNKNOWN_FIELD";
pub const CFG_PARAMS_BIND_FAILED: &str = "CFG_PARAMS_BIND_FAILED";

pub const CFG_STAGE_NOT_IN_BLUEPRINT: &str = "CFG_STAGE_NOT_IN_BLUEPRINT";
pub const CFG_STAGE_DYNAMIC_MODULES_FORBIDDEN: &str = "CFG_STAGE_DYNAMIC_MODULES_FORBIDDEN";
pub const CFG_STAGE_SHADOW_MODULES_FORBIDDEN: &str = "CFG_STAGE_SHADOW_MODULES_FORBIDDEN";
pub const CFG_FANOUT_OUT_OF_RANGE: &str = "CFG_FANOUT_OUT_OF_RANGE";
/// More enabled primary modules than the stage can fan out to.
pub const CFG_FANOUT_TRIM_LIKELY: &str = "CFG_FANOUT_TRIM_LIKELY";

pub const CFG_MODULE_ID_INVALID: &str = "CFG_MODULE_ID_INVALID";
pub const CFG_MODULE_ID_DUPLICATE: &str = "CFG_MODULE_ID_DUPLICATE";
pub const CFG_MODULE_TYPE_UNKNOWN: &str = "CFG_MODULE_TYPE_UNKNOWN";
pub const CFG_MODULE_TYPE_FORBIDDEN: &str = "CFG_MODULE_TYPE_FORBIDDEN";
pub const CFG_MODULE_PRIORITY_OUT_OF_RANGE: &str = "CFG_MODULE_PRIORITY_OUT_OF_RANGE";
pub const CFG_MODULE_LIMIT_KEY_INVALID: &str = "CFG_MODULE_LIMIT_KEY_INVALID";
pub const CFG_MODULE_ARGS_UNKNOWN_FIELD: &str = "CFG_MODULE_ARGS_UNKNOWN_FIELD";
pub const CFG_MODULE_ARGS_BIND_FAILED: &str = "CFG_MODULE_ARGS_BIND_FAILED";
pub const CFG_MODULE_USE_OVERRIDE_FORBIDDEN: &str = "CFG_MODULE_USE_OVERRIDE_FORBIDDEN";

pub const CFG_GATE_INVALID: &str = "CFG_GATE_INVALID";
pub const CFG_GATE_UNKNOWN_SELECTOR: &str = "CFG_GATE_UNKNOWN_SELECTOR";
/// Info: a gate on a module that is already disabled.
pub const CFG_GATE_REDUNDANT: &str = "CFG_GATE_REDUNDANT";

pub const CFG_SHADOW_SAMPLE_OUT_OF_RANGE: &str = "CFG_SHADOW_SAMPLE_OUT_OF_RANGE";
pub const CFG_SHADOW_SAMPLE_EXCEEDS_CONTRACT: &str = "CFG_SHADOW_SAMPLE_EXCEEDS_CONTRACT";
pub const CFG_SHADOW_MODULES_HARD_EXCEEDED: &str = "CFG_SHADOW_MODULES_HARD_EXCEEDED";

pub const CFG_STAGE_MODULES_WARN: &str = "CFG_STAGE_MODULES_WARN";
pub const CFG_STAGE_MODULES_HARD_EXCEEDED: &str = "CFG_STAGE_MODULES_HARD_EXCEEDED";

pub const CFG_EXPERIMENT_FIELD_MISSING: &str = "CFG_EXPERIMENT_FIELD_MISSING";
pub const CFG_EXPERIMENT_PATCH_INVALID: &str = "CFG_EXPERIMENT_PATCH_INVALID";
pub const CFG_EXPERIMENT_STRUCTURAL_OVERRIDE: &str = "CFG_EXPERIMENT_STRUCTURAL_OVERRIDE";
pub const CFG_EXPERIMENT_DUPLICATE: &str = "CFG_EXPERIMENT_DUPLICATE";
pub const CFG_LAYER_PARAM_LEAK: &str = "CFG_LAYER_PARAM_LEAK";
pub const CFG_LAYER_MODULE_LEAK: &str = "CFG_LAYER_MODULE_LEAK";
pub const CFG_LAYER_CONFLICT: &str = "CFG_LAYER_CONFLICT";

pub const CFG_QOS_TIER_UNKNOWN: &str = "CFG_QOS_TIER_UNKNOWN";
pub const CFG_QOS_FANOUT_INCREASE_FORBIDDEN: &str = "CFG_QOS_FANOUT_INCREASE_FORBIDDEN";
pub const CFG_QOS_MODULE_ENABLE_FORBIDDEN: &str = "CFG_QOS_MODULE_ENABLE_FORBIDDEN";
pub const CFG_QOS_SHADOW_INCREASE_FORBIDDEN: &str = "CFG_QOS_SHADOW_INCREASE_FORBIDDEN";

pub const CFG_EMERGENCY_FIELD_MISSING: &str = "CFG_EMERGENCY_FIELD_MISSING";
pub const CFG_EMERGENCY_TTL_INVALID: &str = "CFG_EMERGENCY_TTL_INVALID";
pub const CFG_EMERGENCY_MODULE_UNKNOWN: &str = "CFG_EMERGENCY_MODULE_UNKNOWN";
pub const CFG_EMERGENCY_ENABLE_FORBIDDEN: &str = "CFG_EMERGENCY_ENABLE_FORBIDDEN";
pub const CFG_EMERGENCY_FIELD_FORBIDDEN: &str = "CFG_EMERGENCY_FIELD_FORBIDDEN";

// ---------------------------------------------------------------------------
// Stage decision outcome codes
// ---------------------------------------------------------------------------

pub const SELECTED: &str = "SELECTED";
pub const DISABLED: &str = "DISABLED";
pub const GATE_FALSE: &str = "GATE_FALSE";
pub const FANOUT_TRIM: &str = "FANOUT_TRIM";
pub const SHADOW_NOT_SAMPLED: &str = "SHADOW_NOT_SAMPLED";

pub const STAGE_CONTRACT_DYNAMIC_MODULES_FORBIDDEN: &str =
    "STAGE_CONTRACT_DYNAMIC_MODULES_FORBIDDEN";
pub const STAGE_CONTRACT_MODULE_TYPE_FORBIDDEN: &str = "STAGE_CONTRACT_MODULE_TYPE_FORBIDDEN";
pub const STAGE_CONTRACT_MAX_MODULES_HARD_EXCEEDED: &str =
    "STAGE_CONTRACT_MAX_MODULES_HARD_EXCEEDED";
pub const STAGE_CONTRACT_MAX_SHADOW_MODULES_HARD_EXCEEDED: &str =
    "STAGE_CONTRACT_MAX_SHADOW_MODULES_HARD_EXCEEDED";

// ---------------------------------------------------------------------------
// Overlay reason codes
// ---------------------------------------------------------------------------

/// An emergency overlay was present but its TTL had already elapsed.
pub const EMERGENCY_TTL_EXPIRED: &str = "EMERGENCY_TTL_EXPIRED";
