//! Blueprint-side contracts consumed read-only by the core.
//!
//! A *blueprint* is the code-side definition of a flow; this module holds
//! everything the host registers at startup: per-stage contracts, the module
//! catalog, selector predicates, experiment-layer ownership, and the flow
//! registry that ties them together. All of it is built once, immutable
//! afterwards, and shared across requests without synchronization.

pub mod catalog;
pub mod contract;
pub mod ownership;
pub mod schema;
pub mod selectors;

pub use catalog::{ArgsValidator, ModuleCatalog, ModuleSpec};
pub use contract::{MAX_ALLOWED_FANOUT_MAX, MAX_SHADOW_SAMPLE_BPS, StageContract};
pub use ownership::{ExperimentLayerOwnershipContract, LayerOwnership};
pub use schema::{BindIssue, BindIssueKind, FieldType, ParamsSchema};
pub use selectors::{SelectorFn, SelectorRegistry};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BlueprintError {
    #[error("default params for flow '{flow}' must be a JSON object")]
    #[diagnostic(code(flowpatch::blueprint::default_params_not_object))]
    DefaultParamsNotObject { flow: String },

    #[error("flow '{flow}' declares stage '{stage}' more than once")]
    #[diagnostic(code(flowpatch::blueprint::duplicate_stage))]
    DuplicateStage { flow: String, stage: String },
}

/// The registered definition of one flow.
#[derive(Clone, Debug)]
pub struct FlowBlueprint {
    pub name: String,
    /// Stage names in declared order.
    pub stage_names: Vec<String>,
    /// Plan-template node names, in the compiler's topological order.
    pub node_names: Vec<String>,
    stage_contracts: FxHashMap<String, StageContract>,
    /// Schema of the full params tree (the default-params type).
    pub params_schema: ParamsSchema,
    /// Schema the flow patch `params` binds into.
    pub patch_schema: ParamsSchema,
    /// Default parameter document, always an object.
    pub default_params: Value,
    pub ownership: ExperimentLayerOwnershipContract,
}

impl FlowBlueprint {
    pub fn builder(name: impl Into<String>) -> FlowBlueprintBuilder {
        FlowBlueprintBuilder {
            name: name.into(),
            stage_names: Vec::new(),
            node_names: Vec::new(),
            stage_contracts: FxHashMap::default(),
            params_schema: ParamsSchema::permissive(),
            patch_schema: ParamsSchema::permissive(),
            default_params: Value::Object(serde_json::Map::new()),
            ownership: ExperimentLayerOwnershipContract::new(),
        }
    }

    #[must_use]
    pub fn has_stage(&self, stage: &str) -> bool {
        self.stage_contracts.contains_key(stage)
    }

    #[must_use]
    pub fn stage_contract(&self, stage: &str) -> Option<&StageContract> {
        self.stage_contracts.get(stage)
    }
}

/// Fluent builder for a [`FlowBlueprint`].
#[derive(Debug)]
pub struct FlowBlueprintBuilder {
    name: String,
    stage_names: Vec<String>,
    node_names: Vec<String>,
    stage_contracts: FxHashMap<String, StageContract>,
    params_schema: ParamsSchema,
    patch_schema: ParamsSchema,
    default_params: Value,
    ownership: ExperimentLayerOwnershipContract,
}

impl FlowBlueprintBuilder {
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>, contract: StageContract) -> Self {
        let name = name.into();
        self.stage_names.push(name.clone());
        self.stage_contracts.insert(name, contract);
        self
    }

    #[must_use]
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.node_names.push(name.into());
        self
    }

    #[must_use]
    pub fn params_schema(mut self, schema: ParamsSchema) -> Self {
        self.params_schema = schema;
        self
    }

    #[must_use]
    pub fn patch_schema(mut self, schema: ParamsSchema) -> Self {
        self.patch_schema = schema;
        self
    }

    #[must_use]
    pub fn default_params(mut self, params: Value) -> Self {
        self.default_params = params;
        self
    }

    #[must_use]
    pub fn ownership(mut self, contract: ExperimentLayerOwnershipContract) -> Self {
        self.ownership = contract;
        self
    }

    pub fn build(self) -> Result<FlowBlueprint, BlueprintError> {
        if !self.default_params.is_object() {
            return Err(BlueprintError::DefaultParamsNotObject { flow: self.name });
        }
        if self.stage_names.len() != self.stage_contracts.len() {
            // A repeated stage() call overwrote the contract but duplicated
            // the declared-order entry.
            let mut seen = rustc_hash::FxHashSet::default();
            for stage in &self.stage_names {
                if !seen.insert(stage.clone()) {
                    return Err(BlueprintError::DuplicateStage {
                        flow: self.name,
                        stage: stage.clone(),
                    });
                }
            }
        }
        Ok(FlowBlueprint {
            name: self.name,
            stage_names: self.stage_names,
            node_names: self.node_names,
            stage_contracts: self.stage_contracts,
            params_schema: self.params_schema,
            patch_schema: self.patch_schema,
            default_params: self.default_params,
            ownership: self.ownership,
        })
    }
}

/// Flow name → blueprint, built at startup and read-only thereafter.
#[derive(Clone, Debug, Default)]
pub struct FlowRegistry {
    flows: FxHashMap<String, FlowBlueprint>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        FlowRegistry::default()
    }

    #[must_use]
    pub fn register(mut self, blueprint: FlowBlueprint) -> Self {
        self.flows.insert(blueprint.name.clone(), blueprint);
        self
    }

    #[must_use]
    pub fn get(&self, flow: &str) -> Option<&FlowBlueprint> {
        self.flows.get(flow)
    }

    #[must_use]
    pub fn contains(&self, flow: &str) -> bool {
        self.flows.contains_key(flow)
    }

    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.flows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
