//! The module catalog: module type id → args schema, output type, and an
//! optional module-supplied args validator.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use super::schema::ParamsSchema;
use crate::findings::Finding;
use crate::jsonpath::JsonPath;

/// Module-specific validation of bound args, run after the schema walk.
///
/// Implementations append findings; they never fail. Closures with the
/// matching signature implement this automatically.
pub trait ArgsValidator: Send + Sync {
    fn validate(&self, args: &Value, path: &JsonPath, findings: &mut Vec<Finding>);
}

impl<F> ArgsValidator for F
where
    F: Fn(&Value, &JsonPath, &mut Vec<Finding>) + Send + Sync,
{
    fn validate(&self, args: &Value, path: &JsonPath, findings: &mut Vec<Finding>) {
        self(args, path, findings)
    }
}

/// Catalog entry for one module type.
#[derive(Clone)]
pub struct ModuleSpec {
    pub args_schema: ParamsSchema,
    pub output_type: String,
    pub args_validator: Option<Arc<dyn ArgsValidator>>,
}

impl ModuleSpec {
    pub fn new(args_schema: ParamsSchema, output_type: impl Into<String>) -> Self {
        ModuleSpec {
            args_schema,
            output_type: output_type.into(),
            args_validator: None,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ArgsValidator>) -> Self {
        self.args_validator = Some(validator);
        self
    }
}

impl std::fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("args_schema", &self.args_schema)
            .field("output_type", &self.output_type)
            .field("args_validator", &self.args_validator.is_some())
            .finish()
    }
}

/// Immutable registry of known module types, built at startup.
#[derive(Clone, Debug, Default)]
pub struct ModuleCatalog {
    modules: FxHashMap<String, ModuleSpec>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        ModuleCatalog::default()
    }

    #[must_use]
    pub fn register(mut self, type_id: impl Into<String>, spec: ModuleSpec) -> Self {
        self.modules.insert(type_id.into(), spec);
        self
    }

    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&ModuleSpec> {
        self.modules.get(type_id)
    }

    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.modules.contains_key(type_id)
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
