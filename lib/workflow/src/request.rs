//! Diff requests and their request-level validation.
//!
//! A request is checked as a whole before any operation runs. Every shape
//! problem is collected, so the caller sees all offending operations in a
//! single [`RequestError::InvalidShape`] instead of fixing them one by one.

use crate::error::{RequestError, RequestIssue};
use crate::operation::{NodeSelector, OPERATION_KINDS, Operation};
use flowpatch_core::DocumentId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An ordered batch of operations against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    pub document_id: DocumentId,
    pub operations: Vec<Operation>,
    /// Run the batch as a preview; the caller must not persist the result.
    #[serde(default)]
    pub validate_only: bool,
    /// Keep going after a failed operation instead of halting.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl DiffRequest {
    #[must_use]
    pub fn new(document_id: impl Into<DocumentId>, operations: Vec<Operation>) -> Self {
        Self {
            document_id: document_id.into(),
            operations,
            validate_only: false,
            continue_on_error: false,
        }
    }

    #[must_use]
    pub fn validate_only(mut self) -> Self {
        self.validate_only = true;
        self
    }

    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Parses and validates a request from its JSON form.
    ///
    /// Unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MissingDocumentId` if the request names no document, or
    /// `InvalidShape` listing every malformed field and operation.
    pub fn parse(value: &JsonValue) -> Result<Self, Report<RequestError>> {
        let Some(object) = value.as_object() else {
            return Err(RequestError::InvalidShape {
                issues: vec![RequestIssue::new("request", "expected an object")],
            }
            .into());
        };

        let mut issues = Vec::new();

        let document_id = match object.get("documentId") {
            Some(JsonValue::String(id)) if !id.trim().is_empty() => Some(DocumentId::new(id)),
            None | Some(JsonValue::Null) => return Err(RequestError::MissingDocumentId.into()),
            Some(JsonValue::String(_)) => return Err(RequestError::MissingDocumentId.into()),
            Some(_) => {
                issues.push(RequestIssue::new("documentId", "expected a string"));
                None
            }
        };

        let validate_only = flag(object.get("validateOnly"), "validateOnly", &mut issues);
        let continue_on_error =
            flag(object.get("continueOnError"), "continueOnError", &mut issues);

        let mut operations = Vec::new();
        match object.get("operations") {
            Some(JsonValue::Array(raw)) => {
                for (index, raw) in raw.iter().enumerate() {
                    match parse_operation(raw) {
                        Ok(operation) => operations.push(operation),
                        Err(problems) => issues.extend(problems.into_iter().map(|(field, message)| {
                            let location = match field {
                                Some(field) => format!("operations[{index}].{field}"),
                                None => format!("operations[{index}]"),
                            };
                            RequestIssue::new(location, message)
                        })),
                    }
                }
            }
            Some(_) => issues.push(RequestIssue::new("operations", "expected an array")),
            None => issues.push(RequestIssue::new("operations", "missing field")),
        }

        match document_id {
            Some(document_id) if issues.is_empty() => Ok(Self {
                document_id,
                operations,
                validate_only,
                continue_on_error,
            }),
            _ => Err(RequestError::InvalidShape { issues }.into()),
        }
    }

    /// Checks invariants the type system cannot express.
    ///
    /// Requests built in code skip [`Self::parse`], so the engine runs this
    /// before applying anything.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::parse`] for semantic problems.
    pub fn validate(&self) -> Result<(), Report<RequestError>> {
        if self.document_id.as_str().trim().is_empty() {
            return Err(RequestError::MissingDocumentId.into());
        }

        let issues: Vec<RequestIssue> = self
            .operations
            .iter()
            .enumerate()
            .flat_map(|(index, operation)| {
                semantic_issues(operation)
                    .into_iter()
                    .map(move |(field, message)| {
                        RequestIssue::new(format!("operations[{index}].{field}"), message)
                    })
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(RequestError::InvalidShape { issues }.into())
        }
    }

    /// Rejects connection operations whose `sourceIndex`, `case` or
    /// `targetIndex` is above `limit`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` listing every index over the limit.
    pub fn check_indices(&self, limit: usize) -> Result<(), Report<RequestError>> {
        let issues: Vec<RequestIssue> = self
            .operations
            .iter()
            .enumerate()
            .flat_map(|(index, operation)| {
                index_fields(operation)
                    .into_iter()
                    .filter(move |(_, value)| *value > limit)
                    .map(move |(field, value)| {
                        RequestIssue::new(
                            format!("operations[{index}].{field}"),
                            format!("{value} is above the limit of {limit}"),
                        )
                    })
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(RequestError::InvalidShape { issues }.into())
        }
    }
}

/// The caller-supplied slot indices of a connection operation.
fn index_fields(operation: &Operation) -> Vec<(&'static str, usize)> {
    let (slot, target_index) = match operation {
        Operation::AddConnection(op) => (&op.slot, op.target_index),
        Operation::RemoveConnection(op) => (&op.slot, op.target_index),
        Operation::RewireConnection(op) => (&op.slot, op.target_index),
        _ => return Vec::new(),
    };
    [
        ("sourceIndex", slot.source_index),
        ("case", slot.case),
        ("targetIndex", target_index),
    ]
    .into_iter()
    .filter_map(|(field, value)| value.map(|value| (field, value)))
    .collect()
}

type Problem = (Option<String>, String);

fn flag(value: Option<&JsonValue>, field: &str, issues: &mut Vec<RequestIssue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::Bool(flag)) => *flag,
        Some(_) => {
            issues.push(RequestIssue::new(field, "expected a boolean"));
            false
        }
    }
}

fn parse_operation(raw: &JsonValue) -> Result<Operation, Vec<Problem>> {
    let Some(object) = raw.as_object() else {
        return Err(vec![(None, "expected an object".to_string())]);
    };

    match object.get("type") {
        Some(JsonValue::String(kind)) if OPERATION_KINDS.contains(&kind.as_str()) => {}
        Some(JsonValue::String(kind)) => {
            return Err(vec![(
                Some("type".to_string()),
                format!("unknown operation '{kind}'"),
            )]);
        }
        Some(_) => return Err(vec![(Some("type".to_string()), "expected a string".to_string())]),
        None => return Err(vec![(Some("type".to_string()), "missing field".to_string())]),
    }

    let operation: Operation = serde_json::from_value(raw.clone())
        .map_err(|err| vec![(None, err.to_string())])?;

    let problems: Vec<Problem> = semantic_issues(&operation)
        .into_iter()
        .map(|(field, message)| (Some(field), message))
        .collect();
    if problems.is_empty() {
        Ok(operation)
    } else {
        Err(problems)
    }
}

/// Required-field checks beyond what deserialization enforces.
fn semantic_issues(operation: &Operation) -> Vec<(String, String)> {
    let mut issues = Vec::new();
    match operation {
        Operation::AddNode(op) => {
            require(&mut issues, "node.name", &op.node.name);
            require(&mut issues, "node.type", &op.node.node_type);
        }
        Operation::RemoveNode(selector)
        | Operation::EnableNode(selector)
        | Operation::DisableNode(selector) => selector_issue(selector, &mut issues),
        Operation::UpdateNode(op) => selector_issue(&op.selector, &mut issues),
        Operation::MoveNode(op) => selector_issue(&op.selector, &mut issues),
        Operation::AddConnection(op) => {
            require(&mut issues, "source", &op.source);
            require(&mut issues, "target", &op.target);
        }
        Operation::RemoveConnection(op) => {
            require(&mut issues, "source", &op.source);
            require(&mut issues, "target", &op.target);
        }
        Operation::RewireConnection(op) => {
            require(&mut issues, "source", &op.source);
            require(&mut issues, "from", &op.from);
            require(&mut issues, "to", &op.to);
        }
        Operation::AddTag(op) | Operation::RemoveTag(op) => require(&mut issues, "tag", &op.tag),
        Operation::CleanupConnections(_)
        | Operation::UpdateSettings(_)
        | Operation::RenameWorkflow(_)
        | Operation::ActivateWorkflow
        | Operation::DeactivateWorkflow => {}
    }
    issues
}

fn require(issues: &mut Vec<(String, String)>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push((field.to_string(), "must not be empty".to_string()));
    }
}

fn selector_issue(selector: &NodeSelector, issues: &mut Vec<(String, String)>) {
    if selector.node_ref().is_none_or(|node| node.key().trim().is_empty()) {
        issues.push((
            "nodeId".to_string(),
            "either nodeId or nodeName is required".to_string(),
        ));
    }
}
