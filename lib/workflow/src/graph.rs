//! The engine's working copy of a workflow document.
//!
//! `WorkingCopy` owns a private clone of the caller's document plus a
//! name/id resolution index that is kept in step with every mutation, so
//! later operations in a batch can address nodes added by earlier ones.
//!
//! Every mutating method validates before it touches the document: a method
//! that returns an error leaves the working copy exactly as it was.

use crate::connection::{ConnectionPattern, ConnectionRef};
use crate::document::WorkflowDocument;
use crate::error::{ConnectionSide, OperationError};
use crate::node::{Node, NodeRef, Position};
use flowpatch_core::NodeId;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// A node removed from the document together with the connections that
/// went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub node: Node,
    pub connections: Vec<ConnectionRef>,
}

/// The outcome of rewiring a connection to a new target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewired {
    pub removed: ConnectionRef,
    pub added: ConnectionRef,
}

/// Mutable working copy of a workflow document with a resolution index.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    document: WorkflowDocument,
    /// Node name -> slot in `document.nodes`.
    by_name: HashMap<String, usize>,
    /// Node id -> slot in `document.nodes`.
    by_id: HashMap<NodeId, usize>,
}

impl WorkingCopy {
    /// Clones the caller's document into a new working copy.
    #[must_use]
    pub fn new(document: &WorkflowDocument) -> Self {
        Self::from_document(document.clone())
    }

    /// Takes ownership of a document and indexes it.
    #[must_use]
    pub fn from_document(document: WorkflowDocument) -> Self {
        let mut copy = Self {
            document,
            by_name: HashMap::new(),
            by_id: HashMap::new(),
        };
        copy.rebuild_index();
        copy
    }

    /// Rebuilds the resolution index from the node list.
    ///
    /// Nodes without an id are only addressable by name. Names and ids are
    /// assumed unique; the engine rejects documents that break this (see
    /// [`WorkflowDocument::duplicate_nodes`]) before building a copy.
    pub fn rebuild_index(&mut self) {
        self.by_name.clear();
        self.by_id.clear();
        for (slot, node) in self.document.nodes.iter().enumerate() {
            self.by_name.insert(node.name.clone(), slot);
            if !node.id.is_empty() {
                self.by_id.insert(node.id.clone(), slot);
            }
        }
    }

    #[must_use]
    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    /// Mutable access to the document-level fields.
    ///
    /// Callers must not touch `nodes` through this; use the node methods so
    /// the index stays in sync.
    pub(crate) fn document_mut(&mut self) -> &mut WorkflowDocument {
        &mut self.document
    }

    #[must_use]
    pub fn into_document(self) -> WorkflowDocument {
        self.document
    }

    fn slot_of(&self, node: &NodeRef) -> Option<usize> {
        let slot = match node {
            NodeRef::Id(id) => self
                .by_id
                .get(id)
                .or_else(|| self.by_name.get(id.as_str())),
            NodeRef::Name(name) => self
                .by_name
                .get(name)
                .or_else(|| self.by_id.get(name.as_str())),
        };
        slot.copied()
    }

    fn require_slot(&self, node: &NodeRef) -> Result<usize, OperationError> {
        self.slot_of(node)
            .ok_or_else(|| OperationError::NodeNotFound { node: node.clone() })
    }

    /// Resolves a node reference against the current state of the copy.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if neither an id nor a name matches.
    pub fn resolve_node(&self, node: &NodeRef) -> Result<&Node, OperationError> {
        let slot = self.require_slot(node)?;
        Ok(&self.document.nodes[slot])
    }

    /// Resolves a connection endpoint (name first, then id) to a node name.
    #[must_use]
    pub fn resolve_endpoint(&self, key: &str) -> Option<&str> {
        self.slot_of(&NodeRef::name(key))
            .map(|slot| self.document.nodes[slot].name.as_str())
    }

    /// Returns true if a node with this exact name exists.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Inserts a new node, assigning a fresh id when none was given.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNodeName` or `DuplicateNodeId` on collision.
    pub fn insert_node(&mut self, mut node: Node) -> Result<NodeId, OperationError> {
        if self.by_name.contains_key(&node.name) {
            return Err(OperationError::DuplicateNodeName { name: node.name });
        }

        if node.id.is_empty() {
            node.id = loop {
                let candidate = NodeId::generate();
                if !self.by_id.contains_key(&candidate) {
                    break candidate;
                }
            };
        } else if self.by_id.contains_key(&node.id) {
            return Err(OperationError::DuplicateNodeId {
                id: node.id.to_string(),
            });
        }

        let slot = self.document.nodes.len();
        let id = node.id.clone();
        self.by_name.insert(node.name.clone(), slot);
        self.by_id.insert(id.clone(), slot);
        self.document.nodes.push(node);
        Ok(id)
    }

    /// Removes a node and every connection from or to it.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the reference does not resolve.
    pub fn remove_node(&mut self, node: &NodeRef) -> Result<RemovedNode, OperationError> {
        let slot = self.require_slot(node)?;
        let removed = self.document.nodes.remove(slot);

        self.by_name.remove(&removed.name);
        self.by_id.remove(&removed.id);
        for index in self.by_name.values_mut().chain(self.by_id.values_mut()) {
            if *index > slot {
                *index -= 1;
            }
        }

        let connections = &mut self.document.connections;
        let mut dropped: Vec<ConnectionRef> = connections
            .iter()
            .filter(|connection| connection.source == removed.name)
            .collect();
        connections.remove_source(&removed.name);
        dropped.extend(connections.retain(|connection| connection.target != removed.name));

        Ok(RemovedNode {
            node: removed,
            connections: dropped,
        })
    }

    /// Applies field-by-field updates to a node.
    ///
    /// Returns the previous name when the update renamed the node; every
    /// connection key and edge target is rewritten to the new name.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound`, `DuplicateNodeName` on a colliding rename,
    /// `DanglingConnections` when connections of a removed node still use
    /// the new name, or `InvalidUpdate` for a field of the wrong type.
    pub fn update_node(
        &mut self,
        node: &NodeRef,
        updates: &Map<String, JsonValue>,
    ) -> Result<Option<String>, OperationError> {
        let slot = self.require_slot(node)?;
        let current = &self.document.nodes[slot];
        let mut updated = current.clone();
        for (field, value) in updates {
            apply_field(&mut updated, field, value)?;
        }

        let renamed = updated.name != current.name;
        if renamed {
            if updated.name.trim().is_empty() {
                return Err(invalid_update("name", "must not be empty"));
            }
            if self.by_name.contains_key(&updated.name) {
                return Err(OperationError::DuplicateNodeName { name: updated.name });
            }
            if self.document.connections.references(&updated.name) {
                return Err(OperationError::DanglingConnections { name: updated.name });
            }
        }

        let previous = std::mem::replace(&mut self.document.nodes[slot], updated);
        if !renamed {
            return Ok(None);
        }

        let new_name = self.document.nodes[slot].name.clone();
        self.by_name.remove(&previous.name);
        self.by_name.insert(new_name.clone(), slot);
        self.document
            .connections
            .rename_node(&previous.name, &new_name);
        Ok(Some(previous.name))
    }

    /// Replaces a node's canvas position.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the reference does not resolve.
    pub fn move_node(&mut self, node: &NodeRef, position: Position) -> Result<(), OperationError> {
        let slot = self.require_slot(node)?;
        self.document.nodes[slot].position = position;
        Ok(())
    }

    /// Sets a node's disabled flag.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the reference does not resolve.
    pub fn set_disabled(&mut self, node: &NodeRef, disabled: bool) -> Result<(), OperationError> {
        let slot = self.require_slot(node)?;
        self.document.nodes[slot].disabled = disabled;
        Ok(())
    }

    /// Adds a connection. Endpoints may be given by name or id; the stored
    /// connection always uses names.
    ///
    /// Returns the stored connection and whether it was newly inserted
    /// (`false` if an identical connection already existed).
    ///
    /// # Errors
    ///
    /// Returns `ConnectionEndpointMissing` naming the unresolved side.
    pub fn add_edge(
        &mut self,
        connection: &ConnectionRef,
    ) -> Result<(ConnectionRef, bool), OperationError> {
        let source = self.require_endpoint(&connection.source, ConnectionSide::Source)?;
        let target = self.require_endpoint(&connection.target, ConnectionSide::Target)?;
        let resolved = ConnectionRef {
            source,
            target,
            ..connection.clone()
        };
        let inserted = self.document.connections.insert(&resolved);
        Ok((resolved, inserted))
    }

    fn require_endpoint(&self, key: &str, side: ConnectionSide) -> Result<String, OperationError> {
        self.resolve_endpoint(key)
            .map(str::to_string)
            .ok_or_else(|| OperationError::ConnectionEndpointMissing {
                side,
                node: key.to_string(),
            })
    }

    /// Canonicalizes a pattern's endpoints to node names where they resolve.
    ///
    /// Unresolvable endpoints are kept literally so connections left behind
    /// by a missing node can still be addressed.
    fn canonical_pattern(&self, pattern: &ConnectionPattern) -> ConnectionPattern {
        let canonical = |key: &str| {
            self.resolve_endpoint(key)
                .map_or_else(|| key.to_string(), str::to_string)
        };
        ConnectionPattern {
            source: canonical(&pattern.source),
            target: canonical(&pattern.target),
            ..pattern.clone()
        }
    }

    /// Removes the first connection matching the pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotFound` if nothing matches.
    pub fn remove_edge(
        &mut self,
        pattern: &ConnectionPattern,
    ) -> Result<ConnectionRef, OperationError> {
        let pattern = self.canonical_pattern(pattern);
        self.document
            .connections
            .remove_first(&pattern)
            .ok_or(OperationError::ConnectionNotFound {
                source: pattern.source,
                target: pattern.target,
            })
    }

    /// Moves the first connection matching `pattern` onto a new target node.
    ///
    /// The source side is kept; the target input and index are taken from
    /// the arguments, falling back to those of the old connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionEndpointMissing` if the new target does not exist
    /// and `ConnectionNotFound` if nothing matches. Neither leaves a partial
    /// change behind.
    pub fn rewire_edge(
        &mut self,
        pattern: &ConnectionPattern,
        to: &str,
        target_input: Option<&str>,
        target_index: Option<usize>,
    ) -> Result<Rewired, OperationError> {
        let to = self.require_endpoint(to, ConnectionSide::Target)?;
        let pattern = self.canonical_pattern(pattern);
        let existing = self.document.connections.find(&pattern).ok_or_else(|| {
            OperationError::ConnectionNotFound {
                source: pattern.source.clone(),
                target: pattern.target.clone(),
            }
        })?;

        let added = ConnectionRef {
            target: to,
            target_input: target_input
                .map_or_else(|| existing.target_input.clone(), str::to_string),
            target_index: target_index.unwrap_or(existing.target_index),
            ..existing.clone()
        };

        let connections = &mut self.document.connections;
        connections.remove(&existing);
        connections.insert(&added);
        Ok(Rewired {
            removed: existing,
            added,
        })
    }

    /// Finds connections whose source or target node no longer exists and,
    /// unless `dry_run`, removes them.
    ///
    /// Always returns the connections that were (or would be) removed.
    pub fn sweep_dangling_edges(&mut self, dry_run: bool) -> Vec<ConnectionRef> {
        let by_name = &self.by_name;
        let dangling = |connection: &ConnectionRef| {
            !by_name.contains_key(&connection.source) || !by_name.contains_key(&connection.target)
        };

        if dry_run {
            return self
                .document
                .connections
                .iter()
                .filter(|connection| dangling(connection))
                .collect();
        }

        let connections = &mut self.document.connections;
        let removed = connections.retain(|connection| !dangling(connection));
        let orphaned: Vec<String> = connections
            .sources()
            .filter(|source| !by_name.contains_key(*source))
            .map(str::to_string)
            .collect();
        for source in orphaned {
            connections.remove_source(&source);
        }
        removed
    }
}

fn invalid_update(field: &str, reason: impl Into<String>) -> OperationError {
    OperationError::InvalidUpdate {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Applies one update entry to a detached node.
fn apply_field(node: &mut Node, field: &str, value: &JsonValue) -> Result<(), OperationError> {
    let expected = |what: &str| {
        invalid_update(field, format!("expected {what}, found {}", json_kind(value)))
    };

    match field {
        "id" => match value.as_str() {
            Some(id) if id == node.id.as_str() => {}
            _ => return Err(invalid_update(field, "node ids cannot be changed")),
        },
        "name" => {
            node.name = value.as_str().ok_or_else(|| expected("a string"))?.to_string();
        }
        "type" => {
            node.node_type = value.as_str().ok_or_else(|| expected("a string"))?.to_string();
        }
        "typeVersion" => match value {
            JsonValue::Number(number) => node.type_version = number.clone(),
            _ => return Err(expected("a number")),
        },
        "position" => {
            node.position = serde_json::from_value(value.clone())
                .map_err(|_| expected("an [x, y] pair"))?;
        }
        "disabled" => {
            node.disabled = value.as_bool().ok_or_else(|| expected("a boolean"))?;
        }
        "parameters" => {
            let patch = value.as_object().ok_or_else(|| expected("an object"))?;
            merge_shallow(&mut node.parameters, patch);
        }
        _ => {
            if let Some(path) = field.strip_prefix("parameters.") {
                set_path(&mut node.parameters, path, value)
                    .map_err(|reason| invalid_update(field, reason))?;
            } else if value.is_null() {
                node.extra.remove(field);
            } else {
                node.extra.insert(field.to_string(), value.clone());
            }
        }
    }
    Ok(())
}

/// Replaces top-level keys; a `null` value deletes the key.
fn merge_shallow(target: &mut Map<String, JsonValue>, patch: &Map<String, JsonValue>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Sets a dotted path inside a parameter object, creating intermediate
/// objects as needed. A `null` value deletes the leaf.
fn set_path(
    target: &mut Map<String, JsonValue>,
    path: &str,
    value: &JsonValue,
) -> Result<(), String> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if head.is_empty() {
        return Err("empty path segment".to_string());
    }

    let Some(rest) = rest else {
        if value.is_null() {
            target.remove(head);
        } else {
            target.insert(head.to_string(), value.clone());
        }
        return Ok(());
    };

    let child = target
        .entry(head.to_string())
        .or_insert_with(|| JsonValue::Object(Map::new()));
    match child {
        JsonValue::Object(map) => set_path(map, rest, value),
        other => Err(format!("'{head}' is {}, not an object", json_kind(other))),
    }
}
