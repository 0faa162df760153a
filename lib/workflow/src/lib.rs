//! Workflow document model and diff/patch engine for flowpatch.
//!
//! This crate applies batches of structural edits to automation-workflow
//! documents without resending the whole document:
//!
//! - **Graph Model**: nodes, the port-indexed connection map, and a working
//!   copy with a name/id resolution index
//! - **Operation Vocabulary**: the tagged set of edit operations
//! - **Diff Engine**: sequential, fail-fast or continue-on-error execution
//! - **Result Reporter**: the per-operation outcome ledger
//!
//! ```
//! use flowpatch_workflow::{DiffEngine, Node, WorkflowDocument};
//! use serde_json::json;
//!
//! let document = WorkflowDocument::new("wf-1", "Example")
//!     .with_node(Node::new("Start", "n8n-nodes-base.manualTrigger").with_id("n1"));
//!
//! let result = DiffEngine::default()
//!     .apply_json(
//!         &document,
//!         &json!({
//!             "documentId": "wf-1",
//!             "operations": [
//!                 {"type": "addNode", "node": {"name": "Set", "type": "n8n-nodes-base.set"}},
//!                 {"type": "addConnection", "source": "Start", "target": "Set"}
//!             ]
//!         }),
//!     )
//!     .expect("valid request");
//!
//! assert!(result.success);
//! assert_eq!(result.operations_applied, 2);
//! ```

pub mod connection;
pub mod document;
pub mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod operation;
pub mod options;
pub mod report;
pub mod request;

pub use connection::{ConnectionGraph, ConnectionPattern, ConnectionRef, Edge, MAIN_PORT};
pub use document::WorkflowDocument;
pub use engine::DiffEngine;
pub use error::{ConnectionSide, OperationError, RequestError, RequestIssue};
pub use graph::WorkingCopy;
pub use node::{Node, NodeRef, Position};
pub use operation::{Effect, NodeSelector, Operation};
pub use options::EngineOptions;
pub use report::{AppliedOperation, DiffResult, FailedOperation};
pub use request::DiffRequest;
