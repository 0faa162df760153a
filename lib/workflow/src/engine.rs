//! The diff engine: applies an operation batch to a private working copy.
//!
//! Each operation moves through `pending -> running -> applied | failed`.
//! After a failure the batch either halts (the default) or, with
//! `continueOnError`, moves on to the next index. Operations are never
//! reordered; each one sees every effect of the operations before it,
//! including ids generated for newly added nodes.
//!
//! The caller's document is cloned once and never touched. Whether the
//! resulting workflow is persisted is the caller's decision, see
//! [`DiffResult::should_persist`].

use crate::document::WorkflowDocument;
use crate::error::RequestError;
use crate::graph::WorkingCopy;
use crate::options::EngineOptions;
use crate::report::{DiffResult, Ledger};
use crate::request::DiffRequest;
use flowpatch_core::Result;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

/// Applies diff requests to workflow documents.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: EngineOptions,
}

impl DiffEngine {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Parses a JSON request and applies it.
    ///
    /// # Errors
    ///
    /// Returns a request-level error if the request is malformed or
    /// rejected; no operation has been attempted in that case.
    pub fn apply_json(
        &self,
        document: &WorkflowDocument,
        request: &JsonValue,
    ) -> Result<DiffResult, RequestError> {
        let request = DiffRequest::parse(request)?;
        self.apply(document, &request)
    }

    /// Applies a request to a clone of `document`.
    ///
    /// Operation failures are recorded in the result, never returned.
    ///
    /// # Errors
    ///
    /// Returns a request-level error if the request fails validation, is
    /// over the operation or index limits, targets another document, or the
    /// document itself has duplicate node names or ids.
    #[instrument(
        skip_all,
        fields(
            document_id = %request.document_id,
            operations = request.operations.len(),
            validate_only = request.validate_only,
            continue_on_error = request.continue_on_error
        )
    )]
    pub fn apply(
        &self,
        document: &WorkflowDocument,
        request: &DiffRequest,
    ) -> Result<DiffResult, RequestError> {
        self.check(document, request)?;

        let mut copy = WorkingCopy::new(document);
        let mut ledger = Ledger::new(request.operations.len());

        for (index, operation) in request.operations.iter().enumerate() {
            match operation.apply(&mut copy) {
                Ok(effect) => {
                    debug!(index, kind = operation.kind(), "operation applied");
                    ledger.record_applied(index, operation, effect);
                }
                Err(err) => {
                    warn!(
                        index,
                        kind = operation.kind(),
                        reason = err.code(),
                        error = %err,
                        "operation failed"
                    );
                    ledger.record_failed(index, operation, &err);
                    if !request.continue_on_error {
                        debug!(index, "halting batch");
                        ledger.halt(index);
                        break;
                    }
                }
            }
        }

        let result = ledger.finish(
            copy.into_document(),
            request.validate_only,
            request.continue_on_error,
        );
        info!(
            applied = result.operations_applied,
            failed = result.failed.len(),
            success = result.success,
            "diff batch finished"
        );
        Ok(result)
    }

    fn check(
        &self,
        document: &WorkflowDocument,
        request: &DiffRequest,
    ) -> Result<(), RequestError> {
        request.validate()?;

        if let Some(limit) = self.options.max_operations {
            let count = request.operations.len();
            if count > limit {
                return Err(RequestError::TooManyOperations { count, limit }.into());
            }
        }

        request.check_indices(self.options.max_output_index)?;

        if self.options.verify_document_id
            && !document.id.is_empty()
            && document.id != request.document_id
        {
            return Err(RequestError::DocumentMismatch {
                requested: request.document_id.clone(),
                supplied: document.id.clone(),
            }
            .into());
        }

        let nodes = document.duplicate_nodes();
        if !nodes.is_empty() {
            return Err(RequestError::DuplicateNodes { nodes }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::operation::{Operation, Tag};
    use serde_json::json;

    fn document() -> WorkflowDocument {
        WorkflowDocument::new("wf-1", "Test").with_node(Node::new("Start", "trigger").with_id("n1"))
    }

    fn tag(name: &str) -> Operation {
        Operation::AddTag(Tag {
            tag: name.to_string(),
        })
    }

    #[test]
    fn rejects_batches_over_the_limit() {
        let engine = DiffEngine::new(EngineOptions {
            max_operations: Some(1),
            ..EngineOptions::default()
        });
        let request = DiffRequest::new("wf-1", vec![tag("a"), tag("b")]);

        let err = engine.apply(&document(), &request).expect_err("should fail");
        assert!(err.to_string().contains("limit is 1"));
    }

    #[test]
    fn rejects_mismatched_document() {
        let engine = DiffEngine::default();
        let request = DiffRequest::new("wf-2", vec![tag("a")]);
        let err = engine.apply(&document(), &request).expect_err("should fail");
        assert!(err.to_string().contains("'wf-2'"));

        let lenient = DiffEngine::new(EngineOptions {
            verify_document_id: false,
            ..EngineOptions::default()
        });
        assert!(lenient.apply(&document(), &request).is_ok());
    }

    #[test]
    fn apply_json_rejects_malformed_batch_before_running() {
        let engine = DiffEngine::default();
        let err = engine
            .apply_json(
                &document(),
                &json!({
                    "documentId": "wf-1",
                    "operations": [
                        {"type": "addTag", "tag": "a"},
                        {"type": "addConnection", "source": "Start"}
                    ]
                }),
            )
            .expect_err("should fail");
        assert!(err.to_string().contains("operations[1]"));
    }

    #[test]
    fn rejects_document_with_duplicate_names() {
        let document = document().with_node(Node::new("Start", "trigger").with_id("n2"));
        let request = DiffRequest::new("wf-1", vec![tag("a")]);

        let err = DiffEngine::default()
            .apply(&document, &request)
            .expect_err("should fail");
        assert!(err.to_string().contains("duplicate nodes: 'Start'"));
    }

    #[test]
    fn index_limit_comes_from_options() {
        let engine = DiffEngine::new(EngineOptions {
            max_output_index: 1,
            ..EngineOptions::default()
        });
        let request = json!({
            "documentId": "wf-1",
            "operations": [
                {"type": "addConnection", "source": "Start", "target": "Start", "case": 2}
            ]
        });

        let err = engine
            .apply_json(&document(), &request)
            .expect_err("should fail");
        assert!(err.to_string().contains("operations[0].case"));
    }

    #[test]
    fn added_node_gets_generated_id() {
        let engine = DiffEngine::default();
        let request = DiffRequest::new(
            "wf-1",
            vec![serde_json::from_value(json!({
                "type": "addNode",
                "node": {"name": "Set1", "type": "set"}
            }))
            .expect("operation")],
        );

        let result = engine.apply(&document(), &request).expect("apply");
        let workflow = result.workflow.expect("workflow");
        let added = workflow.node("Set1").expect("node");
        assert!(!added.id.is_empty());
    }
}
