//! Diff results and the ledger that assembles them.

use crate::document::WorkflowDocument;
use crate::error::OperationError;
use crate::operation::{Effect, Operation};
use serde::{Deserialize, Serialize};

/// An operation that was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOperation {
    pub index: usize,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
}

/// An operation that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedOperation {
    pub index: usize,
    pub operation: Operation,
    /// Machine-readable failure code, e.g. `NodeNotFound`.
    pub reason: String,
    /// Human-readable description of the failure.
    pub message: String,
}

/// The outcome of running a diff request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// True if no operation failed.
    pub success: bool,
    /// The working copy after every applied operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDocument>,
    pub operations_applied: usize,
    pub applied: Vec<AppliedOperation>,
    pub failed: Vec<FailedOperation>,
    pub errors: Vec<String>,
    pub message: String,
    /// Echo of the request flags the result was produced under.
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl DiffResult {
    /// Whether a caller should persist `workflow`.
    ///
    /// Never for a preview. Otherwise when everything applied, or when
    /// running with `continueOnError` and at least one operation applied.
    #[must_use]
    pub fn should_persist(&self) -> bool {
        if self.validate_only || self.workflow.is_none() {
            return false;
        }
        self.success || (self.continue_on_error && self.operations_applied > 0)
    }
}

/// Accumulates per-operation outcomes while a batch runs.
#[derive(Debug)]
pub(crate) struct Ledger {
    total: usize,
    applied: Vec<AppliedOperation>,
    failed: Vec<FailedOperation>,
    errors: Vec<String>,
    halted_at: Option<usize>,
}

impl Ledger {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            applied: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
            halted_at: None,
        }
    }

    pub(crate) fn record_applied(
        &mut self,
        index: usize,
        operation: &Operation,
        effect: Option<Effect>,
    ) {
        self.applied.push(AppliedOperation {
            index,
            operation: operation.clone(),
            effect,
        });
    }

    pub(crate) fn record_failed(
        &mut self,
        index: usize,
        operation: &Operation,
        error: &OperationError,
    ) {
        self.errors
            .push(format!("Operation {index} ({}): {error}", operation.kind()));
        self.failed.push(FailedOperation {
            index,
            operation: operation.clone(),
            reason: error.code().to_string(),
            message: error.to_string(),
        });
    }

    pub(crate) fn halt(&mut self, index: usize) {
        self.halted_at = Some(index);
    }

    /// Builds the final result around the working copy.
    pub(crate) fn finish(
        self,
        workflow: WorkflowDocument,
        validate_only: bool,
        continue_on_error: bool,
    ) -> DiffResult {
        let operations_applied = self.applied.len();
        let success = self.failed.is_empty();

        let mut message = if validate_only {
            format!(
                "Validation: {operations_applied} of {} operations would apply",
                self.total
            )
        } else {
            format!("Applied {operations_applied} of {} operations", self.total)
        };
        if let Some(index) = self.halted_at {
            message.push_str(&format!("; stopped at operation {index}"));
        }

        let nothing_applied = operations_applied == 0 && !success;
        let workflow = (!nothing_applied || validate_only).then_some(workflow);

        DiffResult {
            success,
            workflow,
            operations_applied,
            applied: self.applied,
            failed: self.failed,
            errors: self.errors,
            message,
            validate_only,
            continue_on_error,
        }
    }
}
