//! The edit operation vocabulary.
//!
//! Each operation is one caller intent. Operations are serialized with a
//! `type` discriminant, e.g.
//!
//! ```json
//! {"type": "addConnection", "source": "Start", "target": "HTTP"}
//! ```
//!
//! Applying an operation either succeeds with an optional [`Effect`] or
//! fails with an [`OperationError`]; a failed operation leaves the working
//! copy unchanged.

use crate::connection::{ConnectionPattern, ConnectionRef, MAIN_PORT};
use crate::error::OperationError;
use crate::graph::WorkingCopy;
use crate::node::{Node, NodeRef, Position};
use flowpatch_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Selects a node by id or by name. At least one must be present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl NodeSelector {
    #[must_use]
    pub fn by_id(id: impl Into<NodeId>) -> Self {
        Self {
            node_id: Some(id.into()),
            node_name: None,
        }
    }

    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            node_id: None,
            node_name: Some(name.into()),
        }
    }

    /// The reference to resolve. An id takes precedence over a name.
    #[must_use]
    pub fn node_ref(&self) -> Option<NodeRef> {
        match (&self.node_id, &self.node_name) {
            (Some(id), _) => Some(NodeRef::Id(id.clone())),
            (None, Some(name)) => Some(NodeRef::Name(name.clone())),
            (None, None) => None,
        }
    }

    fn require(&self) -> Result<NodeRef, OperationError> {
        // Parsed requests always carry one of the two.
        self.node_ref().ok_or_else(|| OperationError::NodeNotFound {
            node: NodeRef::name(""),
        })
    }
}

/// Output branch of a two-way conditional node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    True,
    False,
}

impl Branch {
    #[must_use]
    pub const fn output_index(self) -> usize {
        match self {
            Self::True => 0,
            Self::False => 1,
        }
    }
}

/// Selects the source side of a connection.
///
/// `branch` and `case` pick the output index of conditional and switch
/// nodes; an explicit `sourceIndex` wins over both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<usize>,
}

impl SourceSlot {
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.source_index
            .or(self.case)
            .or(self.branch.map(Branch::output_index))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNode {
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNode {
    #[serde(flatten)]
    pub selector: NodeSelector,
    pub updates: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNode {
    #[serde(flatten)]
    pub selector: NodeSelector,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddConnection {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub slot: SourceSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<usize>,
    #[serde(default)]
    pub ignore_errors: bool,
}

impl AddConnection {
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            slot: SourceSlot::default(),
            target_input: None,
            target_index: None,
            ignore_errors: false,
        }
    }

    fn connection(&self) -> ConnectionRef {
        ConnectionRef {
            source: self.source.clone(),
            source_output: self
                .slot
                .source_output
                .clone()
                .unwrap_or_else(|| MAIN_PORT.to_string()),
            source_index: self.slot.index().unwrap_or(0),
            target: self.target.clone(),
            target_input: self
                .target_input
                .clone()
                .unwrap_or_else(|| MAIN_PORT.to_string()),
            target_index: self.target_index.unwrap_or(0),
        }
    }
}

/// Removes the first connection between two nodes matching the given
/// qualifiers; omitted qualifiers match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveConnection {
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub slot: SourceSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<usize>,
    #[serde(default)]
    pub ignore_errors: bool,
}

impl RemoveConnection {
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            slot: SourceSlot::default(),
            target_input: None,
            target_index: None,
            ignore_errors: false,
        }
    }

    fn pattern(&self) -> ConnectionPattern {
        ConnectionPattern {
            source: self.source.clone(),
            target: self.target.clone(),
            source_output: self.slot.source_output.clone(),
            source_index: self.slot.index(),
            target_input: self.target_input.clone(),
            target_index: self.target_index,
        }
    }
}

/// Moves a connection from `source -> from` to `source -> to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewireConnection {
    pub source: String,
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub slot: SourceSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<usize>,
    #[serde(default)]
    pub ignore_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupConnections {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub settings: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameWorkflow {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
}

/// A single edit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    AddNode(AddNode),
    RemoveNode(NodeSelector),
    UpdateNode(UpdateNode),
    MoveNode(MoveNode),
    EnableNode(NodeSelector),
    DisableNode(NodeSelector),
    AddConnection(AddConnection),
    RemoveConnection(RemoveConnection),
    RewireConnection(RewireConnection),
    CleanupConnections(CleanupConnections),
    UpdateSettings(UpdateSettings),
    RenameWorkflow(RenameWorkflow),
    AddTag(Tag),
    RemoveTag(Tag),
    ActivateWorkflow,
    DeactivateWorkflow,
}

/// Every `type` discriminant, in declaration order.
pub const OPERATION_KINDS: &[&str] = &[
    "addNode",
    "removeNode",
    "updateNode",
    "moveNode",
    "enableNode",
    "disableNode",
    "addConnection",
    "removeConnection",
    "rewireConnection",
    "cleanupConnections",
    "updateSettings",
    "renameWorkflow",
    "addTag",
    "removeTag",
    "activateWorkflow",
    "deactivateWorkflow",
];

/// Structured detail about what an applied operation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Effect {
    /// A node was inserted under this id.
    NodeAdded {
        #[serde(rename = "nodeId")]
        node_id: NodeId,
    },
    /// A node was removed along with its connections.
    NodeRemoved {
        #[serde(rename = "nodeId")]
        node_id: NodeId,
        #[serde(rename = "removedConnections")]
        removed_connections: Vec<ConnectionRef>,
    },
    /// A node update changed the node's name.
    NodeRenamed { from: String, to: String },
    /// The requested state already held; nothing changed.
    AlreadySatisfied,
    /// A connection was moved to a new target.
    ConnectionRewired {
        removed: ConnectionRef,
        added: ConnectionRef,
    },
    /// Dangling connections that were (or, on a dry run, would be) removed.
    ConnectionsSwept {
        #[serde(rename = "dryRun")]
        dry_run: bool,
        connections: Vec<ConnectionRef>,
    },
    /// The operation failed but `ignoreErrors` was set.
    Skipped { reason: String },
}

impl Operation {
    /// The `type` discriminant of this operation.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddNode(_) => "addNode",
            Self::RemoveNode(_) => "removeNode",
            Self::UpdateNode(_) => "updateNode",
            Self::MoveNode(_) => "moveNode",
            Self::EnableNode(_) => "enableNode",
            Self::DisableNode(_) => "disableNode",
            Self::AddConnection(_) => "addConnection",
            Self::RemoveConnection(_) => "removeConnection",
            Self::RewireConnection(_) => "rewireConnection",
            Self::CleanupConnections(_) => "cleanupConnections",
            Self::UpdateSettings(_) => "updateSettings",
            Self::RenameWorkflow(_) => "renameWorkflow",
            Self::AddTag(_) => "addTag",
            Self::RemoveTag(_) => "removeTag",
            Self::ActivateWorkflow => "activateWorkflow",
            Self::DeactivateWorkflow => "deactivateWorkflow",
        }
    }

    /// Whether failures of this operation are converted into skips.
    #[must_use]
    pub const fn ignores_errors(&self) -> bool {
        match self {
            Self::AddConnection(op) => op.ignore_errors,
            Self::RemoveConnection(op) => op.ignore_errors,
            Self::RewireConnection(op) => op.ignore_errors,
            _ => false,
        }
    }

    /// Applies the operation to the working copy.
    ///
    /// # Errors
    ///
    /// Returns the operation-level failure; the working copy is unchanged.
    pub fn apply(&self, copy: &mut WorkingCopy) -> Result<Option<Effect>, OperationError> {
        let result = self.apply_strict(copy);
        match result {
            Err(err) if self.ignores_errors() => Ok(Some(Effect::Skipped {
                reason: err.to_string(),
            })),
            other => other,
        }
    }

    fn apply_strict(&self, copy: &mut WorkingCopy) -> Result<Option<Effect>, OperationError> {
        match self {
            Self::AddNode(op) => {
                let node_id = copy.insert_node(op.node.clone())?;
                Ok(Some(Effect::NodeAdded { node_id }))
            }
            Self::RemoveNode(selector) => {
                let removed = copy.remove_node(&selector.require()?)?;
                Ok(Some(Effect::NodeRemoved {
                    node_id: removed.node.id,
                    removed_connections: removed.connections,
                }))
            }
            Self::UpdateNode(op) => {
                let node = op.selector.require()?;
                let renamed = copy.update_node(&node, &op.updates)?;
                Ok(renamed.map(|from| {
                    let to = op
                        .updates
                        .get("name")
                        .and_then(JsonValue::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Effect::NodeRenamed { from, to }
                }))
            }
            Self::MoveNode(op) => {
                copy.move_node(&op.selector.require()?, op.position)?;
                Ok(None)
            }
            Self::EnableNode(selector) => {
                copy.set_disabled(&selector.require()?, false)?;
                Ok(None)
            }
            Self::DisableNode(selector) => {
                copy.set_disabled(&selector.require()?, true)?;
                Ok(None)
            }
            Self::AddConnection(op) => {
                let (_, inserted) = copy.add_edge(&op.connection())?;
                Ok((!inserted).then_some(Effect::AlreadySatisfied))
            }
            Self::RemoveConnection(op) => {
                copy.remove_edge(&op.pattern())?;
                Ok(None)
            }
            Self::RewireConnection(op) => {
                let pattern = ConnectionPattern {
                    source: op.source.clone(),
                    target: op.from.clone(),
                    source_output: op.slot.source_output.clone(),
                    source_index: op.slot.index(),
                    target_input: None,
                    target_index: None,
                };
                let rewired = copy.rewire_edge(
                    &pattern,
                    &op.to,
                    op.target_input.as_deref(),
                    op.target_index,
                )?;
                Ok(Some(Effect::ConnectionRewired {
                    removed: rewired.removed,
                    added: rewired.added,
                }))
            }
            Self::CleanupConnections(op) => {
                let connections = copy.sweep_dangling_edges(op.dry_run);
                Ok(Some(Effect::ConnectionsSwept {
                    dry_run: op.dry_run,
                    connections,
                }))
            }
            Self::UpdateSettings(op) => {
                let JsonValue::Object(settings) = &op.settings else {
                    return Err(OperationError::InvalidSettingsShape {
                        found: json_type_name(&op.settings),
                    });
                };
                copy.document_mut().settings = settings.clone();
                Ok(None)
            }
            Self::RenameWorkflow(op) => {
                let name = op.name.trim();
                if name.is_empty() {
                    return Err(OperationError::EmptyName);
                }
                copy.document_mut().name = name.to_string();
                Ok(None)
            }
            Self::AddTag(op) => {
                let inserted = copy.document_mut().tags.insert(op.tag.clone());
                Ok((!inserted).then_some(Effect::AlreadySatisfied))
            }
            Self::RemoveTag(op) => {
                let removed = copy.document_mut().tags.remove(&op.tag);
                Ok((!removed).then_some(Effect::AlreadySatisfied))
            }
            Self::ActivateWorkflow => Ok(set_active(copy, true)),
            Self::DeactivateWorkflow => Ok(set_active(copy, false)),
        }
    }
}

fn set_active(copy: &mut WorkingCopy, active: bool) -> Option<Effect> {
    let document = copy.document_mut();
    let changed = document.active != active;
    document.active = active;
    (!changed).then_some(Effect::AlreadySatisfied)
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::WorkflowDocument;
    use serde_json::json;

    fn copy() -> WorkingCopy {
        let mut document = WorkflowDocument::new("wf-1", "Test")
            .with_node(Node::new("Start", "trigger").with_id("n1"))
            .with_node(Node::new("If", "if").with_id("n2"))
            .with_node(Node::new("Yes", "noop").with_id("n3"))
            .with_node(Node::new("No", "noop").with_id("n4"));
        document
            .connections
            .insert(&ConnectionRef::main("Start", "If"));
        WorkingCopy::from_document(document)
    }

    fn operation(value: JsonValue) -> Operation {
        serde_json::from_value(value).expect("operation")
    }

    #[test]
    fn operation_uses_type_discriminant() {
        let op = operation(json!({"type": "moveNode", "nodeName": "Start", "position": [50, 50]}));
        assert_eq!(op.kind(), "moveNode");
        assert_eq!(
            op,
            Operation::MoveNode(MoveNode {
                selector: NodeSelector::by_name("Start"),
                position: Position::new(50.0, 50.0),
            })
        );
    }

    #[test]
    fn unit_operations_roundtrip() {
        let value = serde_json::to_value(Operation::ActivateWorkflow).expect("serialize");
        assert_eq!(value, json!({"type": "activateWorkflow"}));
    }

    #[test]
    fn branch_selects_output_index() {
        let mut copy = copy();
        let add =
            json!({"type": "addConnection", "source": "If", "target": "No", "branch": "false"});
        operation(add).apply(&mut copy).expect("apply");

        assert!(copy.document().connections.contains(&ConnectionRef {
            source_index: 1,
            ..ConnectionRef::main("If", "No")
        }));
    }

    #[test]
    fn explicit_source_index_wins_over_branch() {
        let slot = SourceSlot {
            source_index: Some(3),
            branch: Some(Branch::False),
            ..SourceSlot::default()
        };
        assert_eq!(slot.index(), Some(3));
    }

    #[test]
    fn duplicate_connection_is_already_satisfied() {
        let mut copy = copy();
        let effect = Operation::AddConnection(AddConnection::new("Start", "If"))
            .apply(&mut copy)
            .expect("apply");
        assert_eq!(effect, Some(Effect::AlreadySatisfied));
        assert_eq!(copy.document().connections.edge_count(), 1);
    }

    #[test]
    fn ignore_errors_turns_failure_into_skip() {
        let mut copy = copy();
        let mut op = RemoveConnection::new("Yes", "No");
        op.ignore_errors = true;

        let effect = Operation::RemoveConnection(op).apply(&mut copy).expect("apply");
        assert!(matches!(effect, Some(Effect::Skipped { .. })));
    }

    #[test]
    fn remove_connection_without_ignore_fails() {
        let mut copy = copy();
        let result =
            Operation::RemoveConnection(RemoveConnection::new("Yes", "No")).apply(&mut copy);
        assert_eq!(result.map_err(|e| e.code()), Err("ConnectionNotFound"));
    }

    #[test]
    fn update_settings_requires_object() {
        let mut copy = copy();
        let result =
            operation(json!({"type": "updateSettings", "settings": [1, 2]})).apply(&mut copy);
        assert_eq!(
            result,
            Err(OperationError::InvalidSettingsShape { found: "array" })
        );

        operation(json!({"type": "updateSettings", "settings": {"timezone": "UTC"}}))
            .apply(&mut copy)
            .expect("apply");
        assert_eq!(copy.document().settings["timezone"], json!("UTC"));
    }

    #[test]
    fn rename_workflow_rejects_blank_name() {
        let mut copy = copy();
        let result = operation(json!({"type": "renameWorkflow", "name": "   "})).apply(&mut copy);
        assert_eq!(result, Err(OperationError::EmptyName));
        assert_eq!(copy.document().name, "Test");
    }

    #[test]
    fn tags_are_idempotent() {
        let mut copy = copy();
        let add = operation(json!({"type": "addTag", "tag": "prod"}));
        assert_eq!(add.apply(&mut copy), Ok(None));
        assert_eq!(add.apply(&mut copy), Ok(Some(Effect::AlreadySatisfied)));

        let remove = operation(json!({"type": "removeTag", "tag": "prod"}));
        assert_eq!(remove.apply(&mut copy), Ok(None));
        assert_eq!(remove.apply(&mut copy), Ok(Some(Effect::AlreadySatisfied)));
    }

    #[test]
    fn disable_and_enable_node() {
        let mut copy = copy();
        operation(json!({"type": "disableNode", "nodeId": "n3"}))
            .apply(&mut copy)
            .expect("disable");
        assert!(copy.document().node("Yes").is_some_and(|n| n.disabled));

        operation(json!({"type": "enableNode", "nodeName": "Yes"}))
            .apply(&mut copy)
            .expect("enable");
        assert!(copy.document().node("Yes").is_some_and(|n| !n.disabled));
    }

    #[test]
    fn rename_effect_reports_both_names() {
        let mut copy = copy();
        let rename =
            json!({"type": "updateNode", "nodeName": "Yes", "updates": {"name": "Approved"}});
        let effect = operation(rename)
            .apply(&mut copy)
            .expect("apply");
        assert_eq!(
            effect,
            Some(Effect::NodeRenamed {
                from: "Yes".to_string(),
                to: "Approved".to_string()
            })
        );
    }

    #[test]
    fn rewire_keeps_source_slot() {
        let mut copy = copy();
        let rewire =
            json!({"type": "rewireConnection", "source": "Start", "from": "If", "to": "Yes"});
        let effect = operation(rewire)
            .apply(&mut copy)
            .expect("apply");

        assert!(matches!(effect, Some(Effect::ConnectionRewired { .. })));
        assert!(copy
            .document()
            .connections
            .contains(&ConnectionRef::main("Start", "Yes")));
        assert_eq!(copy.document().connections.edge_count(), 1);
    }

    #[test]
    fn kinds_table_matches_serialized_tags() {
        assert_eq!(OPERATION_KINDS.len(), 16);
        let op = Operation::CleanupConnections(CleanupConnections::default());
        let value = serde_json::to_value(&op).expect("serialize");
        assert_eq!(value["type"], json!(op.kind()));
        assert!(OPERATION_KINDS.contains(&op.kind()));
    }
}
