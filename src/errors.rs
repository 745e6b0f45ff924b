//! Typed failures at public entry points.
//!
//! Findings (the normal "this patch is wrong" channel) live in
//! [`crate::findings`]; this module holds the two kinds that do surface as
//! `Err`: caller-attributable input errors (tooling exit code 2) and
//! internal errors captured at tooling boundaries (exit code 1).

use miette::Diagnostic;
use thiserror::Error;

/// A malformed argument at a public entry point: null/empty required field,
/// unsupported tier, out-of-range enum. Maps to exit code 2.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("{code}: {message}")]
#[diagnostic(code(flowpatch::input_error))]
pub struct InputError {
    pub code: String,
    pub message: String,
}

impl InputError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        InputError {
            code: code.into(),
            message: message.into(),
        }
    }
}
