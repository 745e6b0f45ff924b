//! Patch validation.
//!
//! One pass over the parsed patch tree checks it against the registered
//! blueprint contracts and produces a [`ValidationReport`]. Nothing here
//! raises for patch content: a malformed document becomes a single
//! `CFG_PARSE_ERROR` finding, and validation continues after most errors so
//! operators see as many findings as possible in one run.
//!
//! The pass is split across submodules by patch area; each adds methods to
//! the crate-private [`Pass`] the way the stage-specific checks are grouped
//! in the original system.

mod emergency;
mod experiments;
mod flows;
mod limits;
mod params;
mod qos;
mod stages;

use serde_json::Value;
use tracing::instrument;

use crate::blueprint::{FlowRegistry, ModuleCatalog, SelectorRegistry};
use crate::codes;
use crate::findings::{Finding, Severity, ValidationReport};
use crate::jsonpath::JsonPath;
use crate::patchdoc::{SUPPORTED_SCHEMA_VERSION, fields};

/// Validates patch documents against the registered blueprints.
///
/// Borrows the startup-built registries; cheap to construct per call.
#[derive(Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a FlowRegistry,
    catalog: &'a ModuleCatalog,
    selectors: &'a SelectorRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(
        registry: &'a FlowRegistry,
        catalog: &'a ModuleCatalog,
        selectors: &'a SelectorRegistry,
    ) -> Self {
        Validator {
            registry,
            catalog,
            selectors,
        }
    }

    /// Validate a patch document from its JSON text.
    #[instrument(level = "debug", skip_all, fields(bytes = patch_json.len()))]
    #[must_use]
    pub fn validate(&self, patch_json: &str) -> ValidationReport {
        match serde_json::from_str::<Value>(patch_json) {
            Ok(root) => self.validate_value(&root),
            Err(parse_error) => ValidationReport::from_findings(vec![Finding::error(
                codes::CFG_PARSE_ERROR,
                JsonPath::root(),
                format!("invalid JSON: {parse_error}"),
            )]),
        }
    }

    /// Validate an already-parsed patch document.
    #[must_use]
    pub fn validate_value(&self, root: &Value) -> ValidationReport {
        let mut pass = Pass {
            registry: self.registry,
            catalog: self.catalog,
            selectors: self.selectors,
            findings: Vec::new(),
        };
        pass.run(root);
        ValidationReport::from_findings(pass.findings)
    }
}

/// Mutable state of one validation pass: the registries and the findings
/// accumulated so far.
pub(crate) struct Pass<'a> {
    pub(crate) registry: &'a FlowRegistry,
    pub(crate) catalog: &'a ModuleCatalog,
    pub(crate) selectors: &'a SelectorRegistry,
    pub(crate) findings: Vec<Finding>,
}

impl Pass<'_> {
    pub(crate) fn emit(
        &mut self,
        severity: Severity,
        code: &str,
        path: JsonPath,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding::new(severity, code, path, message));
    }

    pub(crate) fn error(&mut self, code: &str, path: JsonPath, message: impl Into<String>) {
        self.emit(Severity::Error, code, path, message);
    }

    pub(crate) fn warn(&mut self, code: &str, path: JsonPath, message: impl Into<String>) {
        self.emit(Severity::Warn, code, path, message);
    }

    pub(crate) fn info(&mut self, code: &str, path: JsonPath, message: impl Into<String>) {
        self.emit(Severity::Info, code, path, message);
    }

    /// Emit a type-shape error and return `false` when `value` is not an
    /// object.
    pub(crate) fn require_object<'v>(
        &mut self,
        value: &'v Value,
        path: &JsonPath,
        what: &str,
    ) -> Option<&'v serde_json::Map<String, Value>> {
        match value.as_object() {
            Some(object) => Some(object),
            None => {
                self.error(
                    codes::CFG_FIELD_TYPE_INVALID,
                    path.clone(),
                    format!("{what} must be a JSON object"),
                );
                None
            }
        }
    }

    fn run(&mut self, root: &Value) {
        let root_path = JsonPath::root();
        let Some(document) = root.as_object() else {
            self.error(
                codes::CFG_PARSE_ERROR,
                root_path,
                "patch document must be a JSON object",
            );
            return;
        };

        // Schema version first; everything else still runs so one pass
        // reports the full picture.
        match document.get(fields::SCHEMA_VERSION).and_then(Value::as_str) {
            Some(SUPPORTED_SCHEMA_VERSION) => {}
            Some(other) => self.error(
                codes::CFG_SCHEMA_VERSION_UNSUPPORTED,
                root_path.key(fields::SCHEMA_VERSION),
                format!("unsupported schemaVersion '{other}', expected 'v1'"),
            ),
            None => self.error(
                codes::CFG_SCHEMA_VERSION_UNSUPPORTED,
                root_path.key(fields::SCHEMA_VERSION),
                "schemaVersion is required and must be the string 'v1'",
            ),
        }

        for key in document.keys() {
            if !matches!(
                key.as_str(),
                fields::SCHEMA_VERSION | fields::FLOWS | fields::LIMITS
            ) {
                self.error(
                    codes::CFG_UNKNOWN_FIELD,
                    root_path.key(key),
                    format!("unknown top-level field '{key}'"),
                );
            }
        }

        if let Some(limits) = document.get(fields::LIMITS) {
            self.check_limits(limits, &root_path.key(fields::LIMITS));
        }

        if let Some(flows) = document.get(fields::FLOWS) {
            let flows_path = root_path.key(fields::FLOWS);
            if let Some(flows_map) = self.require_object(flows, &flows_path, "'flows'") {
                for (flow_name, flow_patch) in flows_map {
                    self.check_flow(flow_name, flow_patch, &flows_path.key(flow_name));
                }
            }
        }
    }
}
