//! Flow `params` checks: unknown fields against the default-params schema,
//! bind failures against the patch schema.

use serde_json::Value;

use super::Pass;
use super::flows::FlowScope;
use crate::blueprint::schema::BindIssueKind;
use crate::codes;
use crate::jsonpath::JsonPath;

impl Pass<'_> {
    pub(crate) fn check_flow_params(
        &mut self,
        params: &Value,
        scope: &FlowScope<'_>,
        path: &JsonPath,
    ) {
        if self.require_object(params, path, "'params'").is_none() {
            return;
        }
        let Some(blueprint) = scope.blueprint else {
            // Unregistered flow: no schema to bind against.
            return;
        };

        // Unknown fields come from the full params schema walk.
        let mut issues = Vec::new();
        blueprint.params_schema.check(params, path, &mut issues);
        for issue in issues {
            if issue.kind == BindIssueKind::UnknownField {
                self.error(
                    codes::CFG_PARAMS_UNKNOWN_FIELD,
                    issue.path.clone(),
                    format!("unknown params field at {}", issue.path),
                );
            }
        }

        // Bind failures come from the patch schema, reported at the
        // binder's field-level path.
        let mut bind_issues = Vec::new();
        blueprint.patch_schema.check(params, path, &mut bind_issues);
        for issue in bind_issues {
            if let BindIssueKind::TypeMismatch { expected, found } = issue.kind {
                self.error(
                    codes::CFG_PARAMS_BIND_FAILED,
                    issue.path,
                    format!("cannot bind params value: expected {expected}, found {found}"),
                );
            }
        }
    }
}
