//! Stage decisions: which modules execute, which are skipped, and why.
//!
//! Consumed by the execution engine and by the explain/preview serializers.
//! Pure and deterministic: the same `(evaluation, request, contracts)`
//! always yields the same decisions, including the shadow sampler, which
//! derives its buckets from the request's user identity alone.

pub mod sampler;

pub use sampler::shadow_sampled;

use rustc_hash::FxHashMap;

use crate::blueprint::{FlowBlueprint, SelectorRegistry, StageContract};
use crate::codes;
use crate::context::{FlowContext, RequestOptions};
use crate::gates::{GateDecision, GateEnv};
use crate::overlay::{FlowPatchEvaluation, ModulePatch, StagePatch};

/// Terminal outcome for one module in one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Selected,
    Skipped,
}

/// One module's decision with its stable outcome code and, for gate skips,
/// the gate's own verdict for explain.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleDecision {
    pub module_id: String,
    pub module_type: String,
    pub outcome: Outcome,
    /// `SELECTED`, `DISABLED`, `GATE_FALSE`, `FANOUT_TRIM`, …
    pub code: &'static str,
    pub gate: Option<GateDecision>,
    pub priority: i32,
    pub declared_index: usize,
    pub disabled_by_emergency: bool,
}

impl ModuleDecision {
    fn skipped(module: &ModulePatch, code: &'static str) -> Self {
        ModuleDecision {
            module_id: module.id.clone(),
            module_type: module.module_type.clone(),
            outcome: Outcome::Skipped,
            code,
            gate: None,
            priority: module.priority,
            declared_index: module.declared_index,
            disabled_by_emergency: module.disabled_by_emergency,
        }
    }

    fn selected(module: &ModulePatch) -> Self {
        ModuleDecision {
            module_id: module.id.clone(),
            module_type: module.module_type.clone(),
            outcome: Outcome::Selected,
            code: codes::SELECTED,
            gate: None,
            priority: module.priority,
            declared_index: module.declared_index,
            disabled_by_emergency: false,
        }
    }
}

/// Decisions for one stage, primaries and shadows separately, both in
/// declared order.
#[derive(Clone, Debug, PartialEq)]
pub struct StageDecision {
    pub stage_name: String,
    /// `min(clamped fanoutMax, survivors)` for this request.
    pub fanout_effective: usize,
    pub modules: Vec<ModuleDecision>,
    pub shadow_modules: Vec<ModuleDecision>,
}

impl StageDecision {
    pub fn selected_ids(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .filter(|d| d.outcome == Outcome::Selected)
            .map(|d| d.module_id.as_str())
    }

    pub fn sampled_shadow_ids(&self) -> impl Iterator<Item = &str> {
        self.shadow_modules
            .iter()
            .filter(|d| d.outcome == Outcome::Selected)
            .map(|d| d.module_id.as_str())
    }
}

/// Computes per-stage decisions from an evaluation and the blueprint's
/// stage contracts.
#[derive(Clone, Copy)]
pub struct StageDecisionComputer<'a> {
    blueprint: &'a FlowBlueprint,
    selectors: &'a SelectorRegistry,
}

impl<'a> StageDecisionComputer<'a> {
    pub fn new(blueprint: &'a FlowBlueprint, selectors: &'a SelectorRegistry) -> Self {
        StageDecisionComputer {
            blueprint,
            selectors,
        }
    }

    /// Decide every stage of the evaluation. Stages the blueprint does not
    /// know get an empty-contract default (everything skipped by the
    /// dynamic-modules check is still reported, never dropped).
    #[must_use]
    pub fn compute(
        &self,
        evaluation: &FlowPatchEvaluation,
        options: &RequestOptions,
        context: Option<&FlowContext>,
    ) -> Vec<StageDecision> {
        evaluation
            .stages
            .iter()
            .map(|stage| {
                let contract = self
                    .blueprint
                    .stage_contract(&stage.stage_name)
                    .cloned()
                    .unwrap_or_default();
                self.compute_stage(stage, &contract, options, context)
            })
            .collect()
    }

    fn gate_env<'e>(
        &'e self,
        options: &'e RequestOptions,
        context: Option<&'e FlowContext>,
    ) -> GateEnv<'e> {
        GateEnv {
            variants: &options.variants,
            request_attributes: &options.request_attributes,
            selectors: self.selectors,
            context,
        }
    }

    fn compute_stage(
        &self,
        stage: &StagePatch,
        contract: &StageContract,
        options: &RequestOptions,
        context: Option<&FlowContext>,
    ) -> StageDecision {
        let env = self.gate_env(options, context);

        // Primary modules: gate checks in declared order, then priority
        // ordering, hard cap, and fan-out trim.
        let mut decisions: FxHashMap<usize, ModuleDecision> = FxHashMap::default();
        let mut candidates: Vec<&ModulePatch> = Vec::new();
        for module in &stage.modules {
            match gate_check(module, contract, &env, false) {
                Some(skip) => {
                    decisions.insert(module.declared_index, skip);
                }
                None => candidates.push(module),
            }
        }

        sort_candidates(&mut candidates);
        let surviving = candidates.len().min(contract.max_modules_hard);
        for module in candidates.drain(surviving..) {
            decisions.insert(
                module.declared_index,
                ModuleDecision::skipped(module, codes::STAGE_CONTRACT_MAX_MODULES_HARD_EXCEEDED),
            );
        }

        let fanout_limit = effective_fanout_limit(stage, contract);
        let fanout_effective = fanout_limit.min(candidates.len());
        for (rank, module) in candidates.iter().enumerate() {
            let decision = if rank < fanout_effective {
                ModuleDecision::selected(module)
            } else {
                ModuleDecision::skipped(module, codes::FANOUT_TRIM)
            };
            decisions.insert(module.declared_index, decision);
        }

        let modules = stage
            .modules
            .iter()
            .map(|m| {
                decisions
                    .remove(&m.declared_index)
                    .expect("every module decided")
            })
            .collect();

        let shadow_modules = self.compute_shadow(stage, contract, &env, options);

        StageDecision {
            stage_name: stage.stage_name.clone(),
            fanout_effective,
            modules,
            shadow_modules,
        }
    }

    fn compute_shadow(
        &self,
        stage: &StagePatch,
        contract: &StageContract,
        env: &GateEnv<'_>,
        options: &RequestOptions,
    ) -> Vec<ModuleDecision> {
        let mut decisions: FxHashMap<usize, ModuleDecision> = FxHashMap::default();
        let mut candidates: Vec<&ModulePatch> = Vec::new();
        for module in &stage.shadow_modules {
            if let Some(skip) = gate_check(module, contract, env, true) {
                decisions.insert(module.declared_index, skip);
                continue;
            }
            let sample_bps = module.sample_bps().unwrap_or(0);
            let effective_bps = sample_bps.min(contract.max_shadow_sample_bps);
            if shadow_sampled(&options.user_id, &module.id, effective_bps) {
                candidates.push(module);
            } else {
                decisions.insert(
                    module.declared_index,
                    ModuleDecision::skipped(module, codes::SHADOW_NOT_SAMPLED),
                );
            }
        }

        sort_candidates(&mut candidates);
        let retained = candidates.len().min(contract.max_shadow_modules_hard);
        for module in candidates.drain(retained..) {
            decisions.insert(
                module.declared_index,
                ModuleDecision::skipped(
                    module,
                    codes::STAGE_CONTRACT_MAX_SHADOW_MODULES_HARD_EXCEEDED,
                ),
            );
        }
        for module in candidates {
            decisions.insert(module.declared_index, ModuleDecision::selected(module));
        }

        stage
            .shadow_modules
            .iter()
            .map(|m| {
                decisions
                    .remove(&m.declared_index)
                    .expect("every shadow module decided")
            })
            .collect()
    }
}

/// The first four checks shared by primary and shadow decisions. Returns
/// the skip decision, or `None` for a surviving candidate.
fn gate_check(
    module: &ModulePatch,
    contract: &StageContract,
    env: &GateEnv<'_>,
    shadow: bool,
) -> Option<ModuleDecision> {
    if !module.enabled {
        return Some(ModuleDecision::skipped(module, codes::DISABLED));
    }
    let allowed_here = if shadow {
        contract.allows_shadow_modules
    } else {
        contract.allows_dynamic_modules
    };
    if !allowed_here {
        return Some(ModuleDecision::skipped(
            module,
            codes::STAGE_CONTRACT_DYNAMIC_MODULES_FORBIDDEN,
        ));
    }
    if !contract.allows_type(&module.module_type) {
        return Some(ModuleDecision::skipped(
            module,
            codes::STAGE_CONTRACT_MODULE_TYPE_FORBIDDEN,
        ));
    }
    if let Some(gate) = &module.gate {
        let verdict = gate.evaluate(env);
        if !verdict.allowed {
            let mut decision = ModuleDecision::skipped(module, codes::GATE_FALSE);
            decision.gate = Some(verdict);
            return Some(decision);
        }
    }
    None
}

/// Stable ordering: priority descending, declared index ascending.
fn sort_candidates(candidates: &mut [&ModulePatch]) {
    candidates.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.declared_index.cmp(&b.declared_index))
    });
}

/// Clamp the stage's `fanoutMax` to `[0, contract.max_fanout_max]`;
/// an omitted `fanoutMax` means "unbounded before clamping".
fn effective_fanout_limit(stage: &StagePatch, contract: &StageContract) -> usize {
    if stage.has_fanout_max {
        stage.fanout_max.min(contract.max_fanout_max) as usize
    } else {
        contract.max_fanout_max as usize
    }
}
