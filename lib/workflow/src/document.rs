//! Workflow document types.
//!
//! A workflow document is the unit the engine patches. It consists of:
//! - Metadata (id, name, active flag, tags, opaque settings)
//! - An ordered list of nodes
//! - The connection map between node ports

use crate::connection::ConnectionGraph;
use crate::node::{Node, NodeRef};
use flowpatch_core::{DocumentId, NodeId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashSet};

/// A complete workflow document as exchanged with the editor.
///
/// Top-level fields the engine does not interpret (`pinData`, `meta`,
/// `versionId`, ...) are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    #[serde(default)]
    pub id: DocumentId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: ConnectionGraph,
    #[serde(default)]
    pub settings: Map<String, JsonValue>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl WorkflowDocument {
    /// Creates an empty, inactive document.
    #[must_use]
    pub fn new(id: impl Into<DocumentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: false,
            nodes: Vec::new(),
            connections: ConnectionGraph::new(),
            settings: Map::new(),
            tags: BTreeSet::new(),
            extra: Map::new(),
        }
    }

    /// Appends a node.
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Returns a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node_by_id(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == *id)
    }

    /// Returns the node names in document order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Returns every name and non-empty id used by more than one node, once
    /// each, in document order.
    #[must_use]
    pub fn duplicate_nodes(&self) -> Vec<NodeRef> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        let mut duplicates = Vec::new();
        for node in &self.nodes {
            let name = NodeRef::name(node.name.as_str());
            if !names.insert(node.name.as_str()) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
            if node.id.is_empty() {
                continue;
            }
            let id = NodeRef::Id(node.id.clone());
            if !ids.insert(&node.id) && !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }
        duplicates
    }
}

/// Tags arrive either as plain strings or as `{ "id", "name" }` objects
/// from the platform API; both collapse to the tag name.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTag {
        Name(String),
        Object { name: String },
    }

    let raw = Option::<Vec<RawTag>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|tag| match tag {
            RawTag::Name(name) | RawTag::Object { name } => name,
        })
        .collect())
}
