//! # Flowpatch: Flow Configuration Compiler and Evaluator
//!
//! Flowpatch turns `(blueprint, patch JSON, request context)` into an
//! unambiguous, validated, explainable execution plan. Operators change
//! runtime behavior by publishing a JSON *patch document* that overlays a
//! compiled *blueprint*; this crate validates the patch, applies its
//! overlay layers per request, resolves effective parameters, and explains
//! every decision as deterministic JSON.
//!
//! ## Core Concepts
//!
//! - **Blueprint**: the code-side definition of a flow: stage contracts,
//!   module catalog, selectors, experiment-layer ownership
//! - **Patch**: the JSON overlay changing a blueprint's behavior at runtime
//! - **Overlays**: applied in the invariant order
//!   *base → experiments (array order) → qos → emergency*
//! - **Findings**: validator diagnostics with stable codes and JSONPaths,
//!   never exceptions
//! - **Decisions**: which modules a stage executes, skips, or
//!   shadow-samples for one request, and why
//!
//! ## Quick Start
//!
//! ```
//! use flowpatch::blueprint::{
//!     FlowBlueprint, FlowRegistry, ModuleCatalog, ModuleSpec, ParamsSchema, SelectorRegistry,
//!     StageContract,
//! };
//! use flowpatch::validator::Validator;
//!
//! let registry = FlowRegistry::new().register(
//!     FlowBlueprint::builder("search")
//!         .stage("retrieve", StageContract::default())
//!         .build()
//!         .unwrap(),
//! );
//! let catalog = ModuleCatalog::new().register(
//!     "noop",
//!     ModuleSpec::new(ParamsSchema::permissive(), "unit"),
//! );
//! let selectors = SelectorRegistry::new();
//!
//! let validator = Validator::new(&registry, &catalog, &selectors);
//! let report = validator.validate(
//!     r#"{"schemaVersion":"v1","flows":{"search":{"stages":{"retrieve":{
//!         "fanoutMax":2,"modules":[{"id":"m1","use":"noop","with":{}}]}}}}}"#,
//! );
//! assert!(report.is_valid());
//! ```
//!
//! ## Purity
//!
//! Every component is pure: no I/O, no wall clock except a caller-supplied
//! `now`, and all randomness derived deterministically from the request's
//! user identity. Registries and catalogs are built once at startup and
//! shared read-only across requests; the only per-request mutable is the
//! [`context::FlowContext`] scratchpad. The single async seam is the
//! config provider and its last-known-good wrapper in [`provider`].
//!
//! ## Module Guide
//!
//! - [`blueprint`] - Contracts registered by the host at startup
//! - [`validator`] - Patch validation producing [`findings`]
//! - [`overlay`] - Per-request overlay evaluation
//! - [`decision`] - Stage decisions and shadow sampling
//! - [`params`] - Layered parameter merge with provenance
//! - [`gates`] - Gate expressions and evaluation
//! - [`explain`] - Deterministic explain/diff/preview serializers
//! - [`provider`] - Config snapshots and the LKG fallback wrapper
//! - [`context`] - The request-scoped scratchpad

pub mod blueprint;
pub mod canonical;
pub mod codes;
pub mod context;
pub mod decision;
pub mod errors;
pub mod explain;
pub mod findings;
pub mod gates;
pub mod hashing;
pub mod jsonpath;
pub mod overlay;
pub mod params;
pub mod patchdoc;
pub mod provider;
pub mod telemetry;
pub mod validator;
