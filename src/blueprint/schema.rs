//! Builder-provided schema tables for params and module args.
//!
//! The original system discovered JSON-annotated properties by reflection at
//! runtime. Here each flow and module type registers an explicit
//! [`ParamsSchema`] at startup and the validator walks that table instead:
//! same checks, static dispatch, no runtime type discovery.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::jsonpath::JsonPath;

/// Expected shape of a single schema field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Bool,
    /// Whole number representable as `i64`.
    Int,
    /// Any JSON number.
    Float,
    Str,
    Object(ParamsSchema),
    Array(Box<FieldType>),
    /// Accepts anything, including nested objects. Used for pass-through
    /// bags the blueprint does not constrain.
    Any,
}

impl FieldType {
    fn expected_name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "integer",
            FieldType::Float => "number",
            FieldType::Str => "string",
            FieldType::Object(_) => "object",
            FieldType::Array(_) => "array",
            FieldType::Any => "any",
        }
    }
}

/// What went wrong while binding a JSON value against a schema table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindIssueKind {
    UnknownField,
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// A single binder diagnostic with the field-level path it occurred at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindIssue {
    pub kind: BindIssueKind,
    pub path: JsonPath,
}

/// A schema table: field name → expected type, plus whether unmapped
/// members are tolerated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamsSchema {
    fields: BTreeMap<String, FieldType>,
    allows_unknown: bool,
}

impl ParamsSchema {
    /// Strict schema: unknown members are reported.
    pub fn new() -> Self {
        ParamsSchema::default()
    }

    /// Permissive schema: unknown members pass through unreported.
    pub fn permissive() -> Self {
        ParamsSchema {
            fields: BTreeMap::new(),
            allows_unknown: true,
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    #[must_use]
    pub fn allow_unknown(mut self) -> Self {
        self.allows_unknown = true;
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn allows_unknown_members(&self) -> bool {
        self.allows_unknown
    }

    /// Walk `value` against this table, appending one issue per unknown
    /// field or type mismatch. The walk continues past failures so a single
    /// pass reports everything.
    pub fn check(&self, value: &Value, path: &JsonPath, issues: &mut Vec<BindIssue>) {
        let Some(object) = value.as_object() else {
            issues.push(BindIssue {
                kind: BindIssueKind::TypeMismatch {
                    expected: "object",
                    found: json_type_name(value),
                },
                path: path.clone(),
            });
            return;
        };
        for (key, member) in object {
            let member_path = path.key(key);
            match self.fields.get(key) {
                Some(ty) => check_field(ty, member, &member_path, issues),
                None if self.allows_unknown => {}
                None => issues.push(BindIssue {
                    kind: BindIssueKind::UnknownField,
                    path: member_path,
                }),
            }
        }
    }
}

fn check_field(ty: &FieldType, value: &Value, path: &JsonPath, issues: &mut Vec<BindIssue>) {
    let mismatch = |found: &Value, issues: &mut Vec<BindIssue>| {
        issues.push(BindIssue {
            kind: BindIssueKind::TypeMismatch {
                expected: ty.expected_name(),
                found: json_type_name(found),
            },
            path: path.clone(),
        });
    };
    match ty {
        FieldType::Any => {}
        FieldType::Bool => {
            if !value.is_boolean() {
                mismatch(value, issues);
            }
        }
        FieldType::Int => {
            if value.as_i64().is_none() {
                mismatch(value, issues);
            }
        }
        FieldType::Float => {
            if !value.is_number() {
                mismatch(value, issues);
            }
        }
        FieldType::Str => {
            if !value.is_string() {
                mismatch(value, issues);
            }
        }
        FieldType::Object(schema) => schema.check(value, path, issues),
        FieldType::Array(element) => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    check_field(element, item, &path.index(idx), issues);
                }
            }
            None => mismatch(value, issues),
        },
    }
}

/// Human-readable JSON type name for binder messages.
#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
