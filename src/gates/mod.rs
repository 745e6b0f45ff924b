//! Gate expressions: small boolean predicates over request context that
//! admit or deny a module.
//!
//! A gate is a closed sum type parsed from JSON ([`parser`]) and evaluated
//! with short-circuit semantics ([`eval`]). Parse failures are values, not
//! panics: the validator turns a [`GateParseError`] into a `CFG_GATE_*`
//! finding and the evaluator simply drops unparsable gates.

pub mod eval;
pub mod parser;

pub use eval::{GateDecision, GateEnv};
pub use parser::GateParseError;

/// A gate expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum GateExpr {
    /// Allows only when every child allows; denies on the first denial.
    All(Vec<GateExpr>),
    /// Allows on the first child that allows; denies when none do.
    Any(Vec<GateExpr>),
    /// Flips the child's verdict but keeps its code and reason.
    Not(Box<GateExpr>),
    /// Allows when the named request attribute is one of `one_of`.
    Request { field: String, one_of: Vec<String> },
    /// Allows when the request's assignment for `layer` equals `equals`.
    Variant { layer: String, equals: String },
    /// Allows when the host-registered predicate returns true.
    Selector { name: String },
}

impl GateExpr {
    /// Every selector name referenced anywhere in the tree, in encounter
    /// order. Used by the validator to check the registry.
    #[must_use]
    pub fn selector_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_selectors(&mut names);
        names
    }

    fn collect_selectors<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            GateExpr::All(children) | GateExpr::Any(children) => {
                for child in children {
                    child.collect_selectors(names);
                }
            }
            GateExpr::Not(child) => child.collect_selectors(names),
            GateExpr::Selector { name } => names.push(name),
            GateExpr::Request { .. } | GateExpr::Variant { .. } => {}
        }
    }

    /// Whether any selector gate appears in the tree (those require a
    /// [`crate::context::FlowContext`] to evaluate).
    #[must_use]
    pub fn requires_context(&self) -> bool {
        !self.selector_names().is_empty()
    }

    /// The wire form of this gate, inverse of [`GateExpr::parse`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            GateExpr::All(children) => {
                json!({"all": children.iter().map(GateExpr::to_json).collect::<Vec<_>>()})
            }
            GateExpr::Any(children) => {
                json!({"any": children.iter().map(GateExpr::to_json).collect::<Vec<_>>()})
            }
            GateExpr::Not(child) => json!({"not": child.to_json()}),
            GateExpr::Request { field, one_of } => {
                json!({"request": {"field": field, "in": one_of}})
            }
            GateExpr::Variant { layer, equals } => {
                json!({"variant": {"layer": layer, "equals": equals}})
            }
            GateExpr::Selector { name } => json!({"selector": {"name": name}}),
        }
    }
}
