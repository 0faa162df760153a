//! Error types for the workflow crate.
//!
//! Errors come in two tiers:
//! - `OperationError`: one operation in a batch could not be applied. These
//!   never escape the engine; they are recorded in the result ledger.
//! - `RequestError`: the batch as a whole is unusable. These are returned as
//!   `rootcause` reports before any operation runs.

use crate::node::NodeRef;
use flowpatch_core::DocumentId;
use std::fmt;

/// Which endpoint of a connection an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSide {
    Source,
    Target,
}

impl fmt::Display for ConnectionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

/// Failure of a single operation against the working copy.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationError {
    /// No node matches the reference.
    NodeNotFound { node: NodeRef },
    /// Another node already uses this name.
    DuplicateNodeName { name: String },
    /// Another node already uses this id.
    DuplicateNodeId { id: String },
    /// One endpoint of a new connection does not exist.
    ConnectionEndpointMissing { side: ConnectionSide, node: String },
    /// No existing connection matches.
    ConnectionNotFound { source: String, target: String },
    /// Workflow settings must be a JSON object.
    InvalidSettingsShape { found: &'static str },
    /// Workflow name must not be blank.
    EmptyName,
    /// A field in a node update has the wrong type or cannot be changed.
    InvalidUpdate { field: String, reason: String },
    /// A rename targets a name that dangling connections still use.
    DanglingConnections { name: String },
}

impl OperationError {
    /// Stable machine-readable code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound { .. } => "NodeNotFound",
            Self::DuplicateNodeName { .. } => "DuplicateNodeName",
            Self::DuplicateNodeId { .. } => "DuplicateNodeId",
            Self::ConnectionEndpointMissing { .. } => "ConnectionEndpointMissing",
            Self::ConnectionNotFound { .. } => "ConnectionNotFound",
            Self::InvalidSettingsShape { .. } => "InvalidSettingsShape",
            Self::EmptyName => "EmptyName",
            Self::InvalidUpdate { .. } => "InvalidUpdate",
            Self::DanglingConnections { .. } => "DanglingConnections",
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node } => write!(f, "node not found: {node}"),
            Self::DuplicateNodeName { name } => {
                write!(f, "a node named '{name}' already exists")
            }
            Self::DuplicateNodeId { id } => write!(f, "a node with id '{id}' already exists"),
            Self::ConnectionEndpointMissing { side, node } => {
                write!(f, "{side} node not found: '{node}'")
            }
            Self::ConnectionNotFound { source, target } => {
                write!(f, "no connection from '{source}' to '{target}'")
            }
            Self::InvalidSettingsShape { found } => {
                write!(f, "settings must be an object, found {found}")
            }
            Self::EmptyName => write!(f, "workflow name must not be empty"),
            Self::InvalidUpdate { field, reason } => {
                write!(f, "invalid update for '{field}': {reason}")
            }
            Self::DanglingConnections { name } => write!(
                f,
                "connections still reference missing node '{name}'; remove them first"
            ),
        }
    }
}

impl std::error::Error for OperationError {}

/// One problem found while validating a request's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIssue {
    /// Where the problem is, e.g. `operations[2].node.name`.
    pub location: String,
    pub message: String,
}

impl RequestIssue {
    #[must_use]
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RequestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Rejection of a whole diff request before any operation is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request or some of its operations are malformed.
    InvalidShape { issues: Vec<RequestIssue> },
    /// The request names no document.
    MissingDocumentId,
    /// The request targets a different document than the one supplied.
    DocumentMismatch {
        requested: DocumentId,
        supplied: DocumentId,
    },
    /// The batch exceeds the configured operation limit.
    TooManyOperations { count: usize, limit: usize },
    /// The supplied document breaks node name or id uniqueness.
    DuplicateNodes { nodes: Vec<NodeRef> },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShape { issues } => {
                write!(f, "invalid request ({} issue", issues.len())?;
                if issues.len() != 1 {
                    f.write_str("s")?;
                }
                f.write_str(")")?;
                for issue in issues {
                    write!(f, "; {issue}")?;
                }
                Ok(())
            }
            Self::MissingDocumentId => write!(f, "request has no document id"),
            Self::DocumentMismatch {
                requested,
                supplied,
            } => {
                write!(
                    f,
                    "request targets document '{requested}' but document '{supplied}' was supplied"
                )
            }
            Self::TooManyOperations { count, limit } => {
                write!(f, "request has {count} operations, limit is {limit}")
            }
            Self::DuplicateNodes { nodes } => {
                f.write_str("document has duplicate nodes:")?;
                for (position, node) in nodes.iter().enumerate() {
                    let separator = if position == 0 { " " } else { ", " };
                    write!(f, "{separator}{node}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RequestError {}
