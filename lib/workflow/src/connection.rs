//! Connection types for workflow documents.
//!
//! Connections are stored the way the editor exports them: keyed by the
//! *source node name*, then by output port, then by output slot index,
//! with each slot holding the edges leaving that output:
//!
//! ```text
//! { "Start": { "main": [ [ {"node": "HTTP", "type": "main", "index": 0} ] ] } }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Default port name for both outputs and inputs.
pub const MAIN_PORT: &str = "main";

/// Default upper bound for output and input indices accepted in requests.
pub const MAX_OUTPUT_INDEX: usize = 1024;

fn main_port() -> String {
    MAIN_PORT.to_string()
}

/// A single edge leaving an output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Name of the target node.
    pub node: String,
    /// Input port on the target node.
    #[serde(rename = "type", default = "main_port")]
    pub port: String,
    /// Input index on the target node.
    #[serde(default)]
    pub index: usize,
}

impl Edge {
    #[must_use]
    pub fn new(node: impl Into<String>, port: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            index,
        }
    }
}

/// A fully-qualified connection: both endpoints with ports and indices.
///
/// This is the flattened form used for lookups and for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRef {
    pub source: String,
    pub source_output: String,
    pub source_index: usize,
    pub target: String,
    pub target_input: String,
    pub target_index: usize,
}

impl ConnectionRef {
    /// Creates a connection between the `main` ports at index 0.
    #[must_use]
    pub fn main(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_output: main_port(),
            source_index: 0,
            target: target.into(),
            target_input: main_port(),
            target_index: 0,
        }
    }

    fn edge(&self) -> Edge {
        Edge::new(&self.target, &self.target_input, self.target_index)
    }
}

/// A match against connections between two nodes.
///
/// Qualifiers left as `None` match any value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionPattern {
    pub source: String,
    pub target: String,
    pub source_output: Option<String>,
    pub source_index: Option<usize>,
    pub target_input: Option<String>,
    pub target_index: Option<usize>,
}

impl ConnectionPattern {
    #[must_use]
    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, connection: &ConnectionRef) -> bool {
        fn qualifier<T: PartialEq>(wanted: Option<&T>, actual: &T) -> bool {
            wanted.is_none_or(|wanted| wanted == actual)
        }

        self.source == connection.source
            && self.target == connection.target
            && qualifier(self.source_output.as_ref(), &connection.source_output)
            && qualifier(self.source_index.as_ref(), &connection.source_index)
            && qualifier(self.target_input.as_ref(), &connection.target_input)
            && qualifier(self.target_index.as_ref(), &connection.target_index)
    }
}

/// Output port name -> output slots -> edges.
pub type PortMap = BTreeMap<String, Vec<Vec<Edge>>>;

/// The connection map of a workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionGraph {
    by_source: BTreeMap<String, PortMap>,
}

impl ConnectionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the output ports of a source node.
    #[must_use]
    pub fn outputs(&self, source: &str) -> Option<&PortMap> {
        self.by_source.get(source)
    }

    /// Returns the edges leaving one output slot.
    #[must_use]
    pub fn slot(&self, source: &str, output: &str, index: usize) -> Option<&[Edge]> {
        self.by_source
            .get(source)?
            .get(output)?
            .get(index)
            .map(Vec::as_slice)
    }

    /// Returns the names of all nodes with an outgoing connection entry.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.by_source.keys().map(String::as_str)
    }

    /// Iterates every connection in source, port, slot, edge order.
    pub fn iter(&self) -> impl Iterator<Item = ConnectionRef> + '_ {
        self.by_source.iter().flat_map(|(source, ports)| {
            ports.iter().flat_map(move |(output, slots)| {
                slots.iter().enumerate().flat_map(move |(slot, edges)| {
                    edges.iter().map(move |edge| ConnectionRef {
                        source: source.clone(),
                        source_output: output.clone(),
                        source_index: slot,
                        target: edge.node.clone(),
                        target_input: edge.port.clone(),
                        target_index: edge.index,
                    })
                })
            })
        })
    }

    /// Returns the total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.by_source
            .values()
            .flat_map(BTreeMap::values)
            .flatten()
            .map(Vec::len)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    #[must_use]
    pub fn contains(&self, connection: &ConnectionRef) -> bool {
        self.slot(
            &connection.source,
            &connection.source_output,
            connection.source_index,
        )
        .is_some_and(|edges| edges.contains(&connection.edge()))
    }

    /// Inserts a connection, padding output slots up to its source index.
    ///
    /// Returns `false` if the identical connection already exists, or if
    /// the source index is `usize::MAX` and cannot be addressed.
    pub fn insert(&mut self, connection: &ConnectionRef) -> bool {
        let Some(len) = connection.source_index.checked_add(1) else {
            return false;
        };
        if self.contains(connection) {
            return false;
        }

        let slots = self
            .by_source
            .entry(connection.source.clone())
            .or_default()
            .entry(connection.source_output.clone())
            .or_default();
        if slots.len() < len {
            slots.resize_with(len, Vec::new);
        }
        slots[connection.source_index].push(connection.edge());
        true
    }

    /// Finds the first connection matching the pattern.
    #[must_use]
    pub fn find(&self, pattern: &ConnectionPattern) -> Option<ConnectionRef> {
        self.by_source.get(&pattern.source)?;
        self.iter().find(|connection| pattern.matches(connection))
    }

    /// Removes one specific connection. Emptied slots are kept.
    pub fn remove(&mut self, connection: &ConnectionRef) -> bool {
        let Some(edges) = self
            .by_source
            .get_mut(&connection.source)
            .and_then(|ports| ports.get_mut(&connection.source_output))
            .and_then(|slots| slots.get_mut(connection.source_index))
        else {
            return false;
        };

        let edge = connection.edge();
        match edges.iter().position(|candidate| *candidate == edge) {
            Some(position) => {
                edges.remove(position);
                true
            }
            None => false,
        }
    }

    /// Removes the first connection matching the pattern.
    pub fn remove_first(&mut self, pattern: &ConnectionPattern) -> Option<ConnectionRef> {
        let found = self.find(pattern)?;
        self.remove(&found).then_some(found)
    }

    /// Removes every connection the predicate rejects, returning them.
    ///
    /// A source whose connections are all removed keeps its (now empty)
    /// slots; drop the source entry explicitly with [`Self::remove_source`].
    pub fn retain(&mut self, mut keep: impl FnMut(&ConnectionRef) -> bool) -> Vec<ConnectionRef> {
        let mut removed = Vec::new();
        for (source, ports) in &mut self.by_source {
            for (output, slots) in ports.iter_mut() {
                for (slot, edges) in slots.iter_mut().enumerate() {
                    edges.retain(|edge| {
                        let connection = ConnectionRef {
                            source: source.clone(),
                            source_output: output.clone(),
                            source_index: slot,
                            target: edge.node.clone(),
                            target_input: edge.port.clone(),
                            target_index: edge.index,
                        };
                        let kept = keep(&connection);
                        if !kept {
                            removed.push(connection);
                        }
                        kept
                    });
                }
            }
        }
        removed
    }

    /// Drops the whole outgoing entry of a source node.
    pub fn remove_source(&mut self, source: &str) -> Option<PortMap> {
        self.by_source.remove(source)
    }

    /// Returns true if any connection uses `name` as its source or target.
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        self.by_source.contains_key(name) || self.iter().any(|connection| connection.target == name)
    }

    /// Rewrites every occurrence of a node name, as source key and as target.
    ///
    /// If `to` already has an outgoing entry, the two are merged slot by
    /// slot; edges present in both are kept once.
    pub fn rename_node(&mut self, from: &str, to: &str) {
        if let Some(ports) = self.by_source.remove(from) {
            let merged = self.by_source.entry(to.to_string()).or_default();
            for (output, slots) in ports {
                let existing = merged.entry(output).or_default();
                if existing.len() < slots.len() {
                    existing.resize_with(slots.len(), Vec::new);
                }
                for (edges, into) in slots.into_iter().zip(existing.iter_mut()) {
                    for edge in edges {
                        if !into.contains(&edge) {
                            into.push(edge);
                        }
                    }
                }
            }
        }
        for edge in self
            .by_source
            .values_mut()
            .flat_map(BTreeMap::values_mut)
            .flatten()
            .flatten()
        {
            if edge.node == from {
                edge.node = to.to_string();
            }
        }
    }
}

impl Serialize for ConnectionGraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.by_source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConnectionGraph {
    /// Exports occasionally carry `null` for an unused output slot; those
    /// become empty slots.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        type RawPorts = BTreeMap<String, Vec<Option<Vec<Edge>>>>;

        let raw = BTreeMap::<String, RawPorts>::deserialize(deserializer)?;
        let by_source = raw
            .into_iter()
            .map(|(source, ports)| {
                let ports: PortMap = ports
                    .into_iter()
                    .map(|(port, slots)| {
                        let slots: Vec<Vec<Edge>> =
                            slots.into_iter().map(Option::unwrap_or_default).collect();
                        (port, slots)
                    })
                    .collect();
                (source, ports)
            })
            .collect();
        Ok(Self { by_source })
    }
}
