//! Request-scoped execution context.
//!
//! [`FlowContext`] is the only per-request mutable in the core: a
//! scratchpad owned by exactly one request, carrying the request's identity
//! and variant assignments plus three write-once slots: the memoized config
//! snapshot, the resolved-params cache, and the node-outcome table. Each
//! slot can be written exactly once; a second write to the same node index
//! is an error, not a silent overwrite.
//!
//! Cancellation and deadline are checked only at entry to top-level calls;
//! the core's work is bounded by input size, so no interior checkpoints are
//! needed.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::params::ResolvedParams;
use crate::provider::ConfigSnapshot;

/// Per-request inputs to overlay evaluation and gate decisions.
///
/// All fields default to empty; an empty `user_id` means the request is
/// anonymous (shadow sampling then never fires).
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub variants: FxHashMap<String, String>,
    pub user_id: String,
    pub request_attributes: FxHashMap<String, String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        RequestOptions::default()
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    #[must_use]
    pub fn with_variant(mut self, layer: impl Into<String>, variant: impl Into<String>) -> Self {
        self.variants.insert(layer.into(), variant.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_attributes.insert(key.into(), value.into());
        self
    }
}

/// Outcome recorded for one plan-template node after execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeOutcome {
    /// Stable outcome code (`SELECTED`, `GATE_FALSE`, engine-specific, …).
    pub code: String,
    pub detail: Option<String>,
}

impl NodeOutcome {
    pub fn new(code: impl Into<String>) -> Self {
        NodeOutcome {
            code: code.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    #[error("outcome for node index {index} was already recorded")]
    #[diagnostic(code(flowpatch::context::outcome_already_recorded))]
    OutcomeAlreadyRecorded { index: usize },

    #[error("node index {index} out of range (table holds {len} slots)")]
    #[diagnostic(code(flowpatch::context::outcome_index_out_of_range))]
    OutcomeIndexOutOfRange { index: usize, len: usize },

    #[error("config snapshot was already memoized on this context")]
    #[diagnostic(code(flowpatch::context::snapshot_already_set))]
    SnapshotAlreadySet,

    #[error("resolved params were already cached on this context")]
    #[diagnostic(code(flowpatch::context::params_already_set))]
    ParamsAlreadySet,

    #[error("request was cancelled")]
    #[diagnostic(code(flowpatch::context::cancelled))]
    Cancelled,

    #[error("request deadline {deadline} has passed")]
    #[diagnostic(code(flowpatch::context::deadline_exceeded))]
    DeadlineExceeded { deadline: DateTime<Utc> },
}

/// Request-scoped scratchpad. Owned by one request; concurrent calls from
/// that request are allowed because every mutable slot is write-once.
#[derive(Debug)]
pub struct FlowContext {
    pub options: RequestOptions,
    cancelled: Arc<AtomicBool>,
    deadline: Option<DateTime<Utc>>,
    snapshot: OnceLock<Arc<ConfigSnapshot>>,
    params: OnceLock<Arc<ResolvedParams>>,
    outcomes: Box<[OnceLock<NodeOutcome>]>,
}

impl FlowContext {
    /// Create a context with `node_count` outcome slots (one per plan
    /// template node, in topological order).
    pub fn new(options: RequestOptions, node_count: usize) -> Self {
        let mut outcomes = Vec::with_capacity(node_count);
        outcomes.resize_with(node_count, OnceLock::new);
        FlowContext {
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
            snapshot: OnceLock::new(),
            params: OnceLock::new(),
            outcomes: outcomes.into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Shared flag the owner can use to cancel from another task.
    #[must_use]
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Entry check for top-level calls: cancellation, then deadline.
    pub fn check_entry(&self, now: DateTime<Utc>) -> Result<(), ContextError> {
        if self.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && now >= deadline
        {
            return Err(ContextError::DeadlineExceeded { deadline });
        }
        Ok(())
    }

    /// Memoize the config snapshot this request resolved against.
    pub fn set_snapshot(&self, snapshot: Arc<ConfigSnapshot>) -> Result<(), ContextError> {
        self.snapshot
            .set(snapshot)
            .map_err(|_| ContextError::SnapshotAlreadySet)
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&Arc<ConfigSnapshot>> {
        self.snapshot.get()
    }

    /// Cache the resolved params, once per request.
    pub fn set_params(&self, params: Arc<ResolvedParams>) -> Result<(), ContextError> {
        self.params
            .set(params)
            .map_err(|_| ContextError::ParamsAlreadySet)
    }

    #[must_use]
    pub fn params(&self) -> Option<&Arc<ResolvedParams>> {
        self.params.get()
    }

    /// Record the outcome for one node. Write-once per slot.
    pub fn record_outcome(&self, index: usize, outcome: NodeOutcome) -> Result<(), ContextError> {
        let slot = self
            .outcomes
            .get(index)
            .ok_or(ContextError::OutcomeIndexOutOfRange {
                index,
                len: self.outcomes.len(),
            })?;
        slot.set(outcome)
            .map_err(|_| ContextError::OutcomeAlreadyRecorded { index })
    }

    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&NodeOutcome> {
        self.outcomes.get(index).and_then(OnceLock::get)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.outcomes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_slots_are_write_once() {
        let ctx = FlowContext::new(RequestOptions::new(), 2);
        ctx.record_outcome(0, NodeOutcome::new("SELECTED")).unwrap();
        let err = ctx.record_outcome(0, NodeOutcome::new("DISABLED"));
        assert!(matches!(
            err,
            Err(ContextError::OutcomeAlreadyRecorded { index: 0 })
        ));
        assert_eq!(ctx.outcome(0).unwrap().code, "SELECTED");
        assert!(ctx.outcome(1).is_none());
    }

    #[test]
    fn test_entry_check_deadline() {
        let now = Utc::now();
        let ctx = FlowContext::new(RequestOptions::new(), 0).with_deadline(now);
        assert!(matches!(
            ctx.check_entry(now),
            Err(ContextError::DeadlineExceeded { .. })
        ));
    }
}
