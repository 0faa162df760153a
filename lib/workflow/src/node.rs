//! Workflow node types.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - An id, assigned once and never reused within the document
//! - A unique, human-addressable name
//! - An opaque type identifier and version
//! - A canvas position and an opaque parameter payload

use flowpatch_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::fmt;

/// A point on the editor canvas, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Position {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Position> for [f64; 2] {
    fn from(position: Position) -> Self {
        [position.x, position.y]
    }
}

/// A node in a workflow document.
///
/// Fields the engine does not interpret (`credentials`, `notes`,
/// `webhookId`, ...) are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable identifier. Empty until the document assigns one.
    #[serde(default, skip_serializing_if = "NodeId::is_empty")]
    pub id: NodeId,
    /// Unique name within the document; connections are keyed by it.
    pub name: String,
    /// Opaque node type identifier.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "default_type_version")]
    pub type_version: Number,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

fn default_type_version() -> Number {
    Number::from(1)
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    /// Creates a node with no id, at the origin, with empty parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: NodeId::default(),
            name: name.into(),
            node_type: node_type.into(),
            type_version: default_type_version(),
            position: Position::default(),
            parameters: Map::new(),
            disabled: false,
            extra: Map::new(),
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Sets a single top-level parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// A reference to a node, either by id or by name.
///
/// Resolution tries the declared kind first and falls back to the other,
/// so a caller that passes a name in an id field still finds the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(NodeId),
    Name(String),
}

impl NodeRef {
    #[must_use]
    pub fn id(id: impl Into<NodeId>) -> Self {
        Self::Id(id.into())
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Returns the raw key regardless of kind.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Id(id) => id.as_str(),
            Self::Name(name) => name,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id '{id}'"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}
