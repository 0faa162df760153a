//! Engine configuration.

use crate::connection::MAX_OUTPUT_INDEX;
use serde::{Deserialize, Serialize};

/// Request-level limits and checks applied before a batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Largest accepted batch. `None` accepts any size.
    pub max_operations: Option<usize>,
    /// Reject requests whose `documentId` differs from the supplied
    /// document's id. Documents without an id are never rejected.
    pub verify_document_id: bool,
    /// Largest accepted `sourceIndex`, `case` or `targetIndex`. Output
    /// slots are padded up to the source index.
    pub max_output_index: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_operations: None,
            verify_document_id: true,
            max_output_index: MAX_OUTPUT_INDEX,
        }
    }
}
