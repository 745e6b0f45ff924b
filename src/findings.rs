//! Validation findings and the report that aggregates them.
//!
//! Findings are the normal, non-exceptional mechanism for communicating
//! "this patch is wrong": the validator never raises for patch content, it
//! accumulates [`Finding`] values into a [`ValidationReport`]. A report is
//! constructed by one call and immutable afterwards.
//!
//! # Examples
//!
//! ```
//! use flowpatch::findings::{Finding, Severity, ValidationReport};
//! use flowpatch::jsonpath::JsonPath;
//!
//! let report = ValidationReport::from_findings(vec![Finding::new(
//!     Severity::Warn,
//!     "CFG_FANOUT_TRIM_LIKELY",
//!     JsonPath::root().key("flows").key("F"),
//!     "2 enabled modules but fanoutMax=1",
//! )]);
//! assert!(report.is_valid());
//! assert_eq!(report.findings().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::jsonpath::JsonPath;

/// Severity of a validation finding.
///
/// Only `Error` invalidates a report; `Warn` is operator-actionable and
/// `Info` is advisory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warn,
    Info,
}

impl Severity {
    /// The serialized form, which is also the canonical sort key
    /// (`"error" < "info" < "warn"` in codepoint order).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validator diagnostic: severity, stable code, JSONPath, message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: String,
    #[serde(rename = "jsonPath")]
    pub json_path: String,
    pub message: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        path: JsonPath,
        message: impl Into<String>,
    ) -> Self {
        Finding {
            severity,
            code: code.into(),
            json_path: path.into(),
            message: message.into(),
        }
    }

    pub fn error(code: impl Into<String>, path: JsonPath, message: impl Into<String>) -> Self {
        Finding::new(Severity::Error, code, path, message)
    }

    pub fn warn(code: impl Into<String>, path: JsonPath, message: impl Into<String>) -> Self {
        Finding::new(Severity::Warn, code, path, message)
    }

    pub fn info(code: impl Into<String>, path: JsonPath, message: impl Into<String>) -> Self {
        Finding::new(Severity::Info, code, path, message)
    }

    /// Canonical sort key: `(severity, code, path, message)`, each compared
    /// by codepoint.
    fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.severity.as_str(),
            &self.code,
            &self.json_path,
            &self.message,
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.severity, self.code, self.json_path, self.message
        )
    }
}

/// The outcome of validating one patch document.
///
/// Findings are stored in the validator's natural pass order; serializers
/// apply the canonical sort via [`ValidationReport::sorted_findings`]. Two
/// runs over the same bytes always produce the same multiset of findings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        ValidationReport { findings }
    }

    /// Findings in pass order.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Findings in the canonical `(severity, code, path, message)` order.
    #[must_use]
    pub fn sorted_findings(&self) -> Vec<Finding> {
        let mut sorted = self.findings.clone();
        sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        sorted
    }

    /// A report is valid when it carries no `Error`-severity finding.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .findings
            .iter()
            .any(|f| f.severity == Severity::Error)
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_findings_severity_order_is_lexicographic() {
        let root = JsonPath::root;
        let report = ValidationReport::from_findings(vec![
            Finding::warn("B", root(), "w"),
            Finding::info("A", root(), "i"),
            Finding::error("C", root(), "e"),
        ]);
        let sorted = report.sorted_findings();
        let severities: Vec<&str> = sorted.iter().map(|f| f.severity.as_str()).collect();
        assert_eq!(severities, vec!["error", "info", "warn"]);
    }

    #[test]
    fn test_is_valid_ignores_warn_and_info() {
        let report = ValidationReport::from_findings(vec![
            Finding::warn("W", JsonPath::root(), "w"),
            Finding::info("I", JsonPath::root(), "i"),
        ]);
        assert!(report.is_valid());
        assert_eq!(report.error_count(), 0);
    }
}
