//! Pure JSON → [`GateExpr`] parsing.
//!
//! The wire form is a single-key object tagging the variant:
//!
//! ```json
//! {"all": [{"variant": {"layer": "L1", "equals": "treatment"}},
//!          {"not": {"request": {"field": "tenant", "in": ["sandbox"]}}}]}
//! ```

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use super::GateExpr;
use crate::blueprint::schema::json_type_name;
use crate::patchdoc::fields;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GateParseError {
    #[error("gate must be an object, found {found}")]
    #[diagnostic(code(flowpatch::gates::not_an_object))]
    NotAnObject { found: &'static str },

    #[error("gate object must have exactly one key, found {count}")]
    #[diagnostic(code(flowpatch::gates::ambiguous_kind))]
    AmbiguousKind { count: usize },

    #[error("unknown gate kind '{kind}'")]
    #[diagnostic(code(flowpatch::gates::unknown_kind))]
    UnknownKind { kind: String },

    #[error("gate '{kind}' expects an array of children")]
    #[diagnostic(code(flowpatch::gates::children_not_array))]
    ChildrenNotArray { kind: &'static str },

    #[error("gate '{kind}' is missing required field '{field}'")]
    #[diagnostic(code(flowpatch::gates::missing_field))]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("gate '{kind}' field '{field}' has the wrong shape")]
    #[diagnostic(code(flowpatch::gates::invalid_field))]
    InvalidField {
        kind: &'static str,
        field: &'static str,
    },
}

impl GateExpr {
    /// Parse a gate tree from its JSON form.
    pub fn parse(value: &Value) -> Result<GateExpr, GateParseError> {
        let Some(object) = value.as_object() else {
            return Err(GateParseError::NotAnObject {
                found: json_type_name(value),
            });
        };
        if object.len() != 1 {
            return Err(GateParseError::AmbiguousKind {
                count: object.len(),
            });
        }
        let (kind, body) = object.iter().next().expect("len checked above");
        match kind.as_str() {
            "all" => Ok(GateExpr::All(parse_children("all", body)?)),
            "any" => Ok(GateExpr::Any(parse_children("any", body)?)),
            "not" => Ok(GateExpr::Not(Box::new(GateExpr::parse(body)?))),
            "request" => parse_request(body),
            "variant" => parse_variant(body),
            "selector" => parse_selector(body),
            other => Err(GateParseError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

fn parse_children(kind: &'static str, body: &Value) -> Result<Vec<GateExpr>, GateParseError> {
    let items = body
        .as_array()
        .ok_or(GateParseError::ChildrenNotArray { kind })?;
    items.iter().map(GateExpr::parse).collect()
}

fn required_str<'a>(
    kind: &'static str,
    body: &'a Value,
    field: &'static str,
) -> Result<&'a str, GateParseError> {
    let member = body
        .get(field)
        .ok_or(GateParseError::MissingField { kind, field })?;
    member
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or(GateParseError::InvalidField { kind, field })
}

fn parse_request(body: &Value) -> Result<GateExpr, GateParseError> {
    const KIND: &str = "request";
    let field = required_str(KIND, body, "field")?.to_string();
    let members = body
        .get("in")
        .ok_or(GateParseError::MissingField {
            kind: KIND,
            field: "in",
        })?
        .as_array()
        .ok_or(GateParseError::InvalidField {
            kind: KIND,
            field: "in",
        })?;
    let one_of = members
        .iter()
        .map(|m| {
            m.as_str()
                .map(str::to_string)
                .ok_or(GateParseError::InvalidField {
                    kind: KIND,
                    field: "in",
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GateExpr::Request { field, one_of })
}

fn parse_variant(body: &Value) -> Result<GateExpr, GateParseError> {
    const KIND: &str = "variant";
    Ok(GateExpr::Variant {
        layer: required_str(KIND, body, fields::LAYER)?.to_string(),
        equals: required_str(KIND, body, "equals")?.to_string(),
    })
}

fn parse_selector(body: &Value) -> Result<GateExpr, GateParseError> {
    const KIND: &str = "selector";
    Ok(GateExpr::Selector {
        name: required_str(KIND, body, "name")?.to_string(),
    })
}
