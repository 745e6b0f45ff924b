//! Short-circuit gate evaluation.
//!
//! `all` returns on the first deny, `any` on the first allow; `not` flips
//! the verdict but preserves the child's code and reason so explain output
//! still points at the triggering leaf. Selector gates need the
//! request-scoped [`FlowContext`]; every other gate evaluates from the
//! request options alone.

use rustc_hash::FxHashMap;

use super::GateExpr;
use crate::blueprint::SelectorRegistry;
use crate::context::FlowContext;

/// Decision codes produced by gate leaves. Stable identifiers; the
/// human-oriented reason string may evolve, these may not.
pub mod decision_codes {
    pub const GATE_ALLOWED: &str = "GATE_ALLOWED";
    pub const REQUEST_FIELD_MISMATCH: &str = "REQUEST_FIELD_MISMATCH";
    pub const VARIANT_MISMATCH: &str = "VARIANT_MISMATCH";
    pub const SELECTOR_DENIED: &str = "SELECTOR_DENIED";
    pub const SELECTOR_UNKNOWN: &str = "SELECTOR_UNKNOWN";
    pub const SELECTOR_CONTEXT_MISSING: &str = "SELECTOR_CONTEXT_MISSING";
    pub const ANY_ALL_DENIED: &str = "ANY_ALL_DENIED";
}

/// Evaluation environment for one request.
#[derive(Clone, Copy)]
pub struct GateEnv<'a> {
    pub variants: &'a FxHashMap<String, String>,
    pub request_attributes: &'a FxHashMap<String, String>,
    pub selectors: &'a SelectorRegistry,
    /// Required by selector gates; `None` denies them.
    pub context: Option<&'a FlowContext>,
}

/// The verdict of one gate evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    /// Machine-readable, stable identifier.
    pub code: String,
    /// Human-readable reason.
    pub reason_code: String,
    /// The selector that produced the verdict, when one did.
    pub selector: Option<String>,
}

impl GateDecision {
    fn allow(code: &str, reason: impl Into<String>) -> Self {
        GateDecision {
            allowed: true,
            code: code.to_string(),
            reason_code: reason.into(),
            selector: None,
        }
    }

    fn deny(code: &str, reason: impl Into<String>) -> Self {
        GateDecision {
            allowed: false,
            code: code.to_string(),
            reason_code: reason.into(),
            selector: None,
        }
    }

    fn with_selector(mut self, name: &str) -> Self {
        self.selector = Some(name.to_string());
        self
    }

    fn flipped(mut self) -> Self {
        self.allowed = !self.allowed;
        self
    }
}

impl GateExpr {
    /// Evaluate this gate against the request environment.
    #[must_use]
    pub fn evaluate(&self, env: &GateEnv<'_>) -> GateDecision {
        use decision_codes::*;
        match self {
            GateExpr::All(children) => {
                for child in children {
                    let decision = child.evaluate(env);
                    if !decision.allowed {
                        return decision;
                    }
                }
                GateDecision::allow(GATE_ALLOWED, "all children allowed")
            }
            GateExpr::Any(children) => {
                let mut last_denial = None;
                for child in children {
                    let decision = child.evaluate(env);
                    if decision.allowed {
                        return decision;
                    }
                    last_denial = Some(decision);
                }
                last_denial
                    .unwrap_or_else(|| GateDecision::deny(ANY_ALL_DENIED, "any with no children"))
            }
            GateExpr::Not(child) => child.evaluate(env).flipped(),
            GateExpr::Request { field, one_of } => {
                let matched = env
                    .request_attributes
                    .get(field)
                    .is_some_and(|value| one_of.iter().any(|candidate| candidate == value));
                if matched {
                    GateDecision::allow(GATE_ALLOWED, format!("request attribute '{field}' matched"))
                } else {
                    GateDecision::deny(
                        REQUEST_FIELD_MISMATCH,
                        format!("request attribute '{field}' not in allowed set"),
                    )
                }
            }
            GateExpr::Variant { layer, equals } => {
                let matched = env
                    .variants
                    .get(layer)
                    .is_some_and(|assigned| assigned == equals);
                if matched {
                    GateDecision::allow(GATE_ALLOWED, format!("variant '{layer}' == '{equals}'"))
                } else {
                    GateDecision::deny(
                        VARIANT_MISMATCH,
                        format!("variant '{layer}' != '{equals}'"),
                    )
                }
            }
            GateExpr::Selector { name } => {
                let Some(predicate) = env.selectors.get(name) else {
                    return GateDecision::deny(
                        SELECTOR_UNKNOWN,
                        format!("selector '{name}' is not registered"),
                    )
                    .with_selector(name);
                };
                let Some(context) = env.context else {
                    return GateDecision::deny(
                        SELECTOR_CONTEXT_MISSING,
                        format!("selector '{name}' requires a flow context"),
                    )
                    .with_selector(name);
                };
                if predicate(context) {
                    GateDecision::allow(GATE_ALLOWED, format!("selector '{name}' allowed"))
                        .with_selector(name)
                } else {
                    GateDecision::deny(SELECTOR_DENIED, format!("selector '{name}' denied"))
                        .with_selector(name)
                }
            }
        }
    }
}
