//! In-memory node/edge canvas for one project.
//!
//! All operators are synchronous and deterministic: generated ids derive
//! from the current contents, never from clocks or randomness. The model
//! tracks its own revision so callers can tell unsaved edits apart from
//! the last state the backend acknowledged.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

pub type NodeId = String;
pub type EdgeId = String;

pub const DEFAULT_NODE_POSITION: Position = Position { x: 0.0, y: 0.0 };

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A canvas node. Fields the model does not interpret are kept in `extra`
/// so they survive a load/save round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            position,
            data: NodeData {
                label: label.into(),
                extra: Map::new(),
            },
            selected: false,
            extra: Map::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.data.label
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            selected: false,
            extra: Map::new(),
        }
    }

    fn touches(&self, node: &str) -> bool {
        self.source == node || self.target == node
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The serializable node/edge state exchanged with the backend. Top-level
/// keys other than `nodes` and `edges` (the canvas viewport, for one) are
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Interprets a persisted graph field.
    ///
    /// `None`, `null` and `{}` mean "never saved" and yield an empty
    /// snapshot. Anything else must decode and carry unique node and edge
    /// ids, otherwise `MalformedGraphData` is returned.
    pub fn from_persisted(value: Option<&Value>) -> Result<Self, SyncError> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Self::empty()),
            Some(Value::Object(map)) if map.is_empty() => return Ok(Self::empty()),
            Some(value) => value,
        };
        let snapshot: GraphSnapshot = serde_json::from_value(value.clone())
            .map_err(|err| SyncError::MalformedGraphData(err.to_string()))?;
        snapshot.check_unique_ids()?;
        Ok(snapshot)
    }

    fn check_unique_ids(&self) -> Result<(), SyncError> {
        let mut nodes = HashSet::new();
        if let Some(node) = self.nodes.iter().find(|node| !nodes.insert(node.id.as_str())) {
            return Err(SyncError::MalformedGraphData(format!(
                "duplicate node id `{}`",
                node.id
            )));
        }
        let mut edges = HashSet::new();
        if let Some(edge) = self.edges.iter().find(|edge| !edges.insert(edge.id.as_str())) {
            return Err(SyncError::MalformedGraphData(format!(
                "duplicate edge id `{}`",
                edge.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeChange {
    /// `position: None` marks the end of a drag without a new coordinate.
    Position {
        id: NodeId,
        #[serde(default)]
        position: Option<Position>,
    },
    Select {
        id: NodeId,
        selected: bool,
    },
    Remove {
        id: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeChange {
    Select { id: EdgeId, selected: bool },
    Remove { id: EdgeId },
}

/// A proposed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub id: Option<EdgeId>,
    pub source: NodeId,
    pub target: NodeId,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectRejection {
    #[error("source node `{0}` does not exist")]
    MissingSource(NodeId),
    #[error("target node `{0}` does not exist")]
    MissingTarget(NodeId),
    #[error("edge id `{0}` is already in use")]
    DuplicateId(EdgeId),
    #[error("`{from}` is already connected to `{to}`")]
    AlreadyConnected { from: NodeId, to: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Persisted,
    Dirty,
}

#[derive(Debug, Clone)]
pub struct GraphModel {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    extra: Map<String, Value>,
    revision: u64,
    persisted_revision: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            extra: Map::new(),
            revision: 0,
            persisted_revision: 0,
        }
    }

    /// Builds a model that counts as persisted. Edges whose endpoints are
    /// missing are dropped.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut model = Self::new();
        model.replace_with(snapshot);
        model
    }

    /// Swaps in a snapshot (typically freshly loaded) and marks it persisted.
    pub fn replace_with(&mut self, snapshot: GraphSnapshot) {
        let GraphSnapshot {
            nodes,
            mut edges,
            extra,
        } = snapshot;
        let known: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let before = edges.len();
        edges.retain(|edge| {
            known.contains(edge.source.as_str()) && known.contains(edge.target.as_str())
        });
        if edges.len() != before {
            warn!(dropped = before - edges.len(), "dropped dangling edges from snapshot");
        }
        self.nodes = nodes;
        self.edges = edges;
        self.extra = extra;
        self.revision += 1;
        self.persisted_revision = self.revision;
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            extra: self.extra.clone(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.persisted_revision
    }

    pub fn sync_status(&self) -> SyncStatus {
        if self.is_dirty() {
            SyncStatus::Dirty
        } else {
            SyncStatus::Persisted
        }
    }

    /// Records that the state at `revision` reached the backend. Edits made
    /// after that revision keep the model dirty.
    pub fn mark_persisted_at(&mut self, revision: u64) {
        if revision <= self.revision {
            self.persisted_revision = revision;
        }
    }

    /// Applies a batch of node deltas and returns how many took effect.
    /// Unknown ids are skipped. Removing a node also removes its edges.
    pub fn apply_node_changes(&mut self, changes: impl IntoIterator<Item = NodeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let effective = match change {
                NodeChange::Position { id, position } => match self.node_mut(&id) {
                    Some(node) => {
                        if let Some(position) = position {
                            node.position = position;
                        }
                        true
                    }
                    None => false,
                },
                NodeChange::Select { id, selected } => match self.node_mut(&id) {
                    Some(node) => {
                        node.selected = selected;
                        true
                    }
                    None => false,
                },
                NodeChange::Remove { id } => self.remove_node(&id),
            };
            if effective {
                applied += 1;
            }
        }
        if applied > 0 {
            self.revision += 1;
        }
        applied
    }

    pub fn apply_edge_changes(&mut self, changes: impl IntoIterator<Item = EdgeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let effective = match change {
                EdgeChange::Select { id, selected } => {
                    match self.edges.iter_mut().find(|edge| edge.id == id) {
                        Some(edge) => {
                            edge.selected = selected;
                            true
                        }
                        None => false,
                    }
                }
                EdgeChange::Remove { id } => {
                    let before = self.edges.len();
                    self.edges.retain(|edge| edge.id != id);
                    self.edges.len() != before
                }
            };
            if effective {
                applied += 1;
            }
        }
        if applied > 0 {
            self.revision += 1;
        }
        applied
    }

    /// Adds an edge if both endpoints exist. Rejections leave the model
    /// untouched.
    pub fn connect(&mut self, candidate: Connection) -> Result<&Edge, ConnectRejection> {
        let Connection { id, source, target } = candidate;
        if !self.contains_node(&source) {
            return Err(ConnectRejection::MissingSource(source));
        }
        if !self.contains_node(&target) {
            return Err(ConnectRejection::MissingTarget(target));
        }
        if self
            .edges
            .iter()
            .any(|edge| edge.source == source && edge.target == target)
        {
            return Err(ConnectRejection::AlreadyConnected {
                from: source,
                to: target,
            });
        }
        let id = match id {
            Some(id) if self.edge(&id).is_some() => return Err(ConnectRejection::DuplicateId(id)),
            Some(id) => id,
            None => self.fresh_edge_id(&source, &target),
        };
        self.edges.push(Edge::new(id, source, target));
        self.revision += 1;
        Ok(&self.edges[self.edges.len() - 1])
    }

    pub fn add_node(&mut self, label: impl Into<String>) -> &Node {
        self.add_node_at(label, DEFAULT_NODE_POSITION)
    }

    /// Appends a node with a fresh id; existing nodes keep their positions.
    pub fn add_node_at(&mut self, label: impl Into<String>, position: Position) -> &Node {
        let id = self.fresh_node_id();
        self.nodes.push(Node::new(id, label, position));
        self.revision += 1;
        &self.nodes[self.nodes.len() - 1]
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|edge| !edge.touches(id));
        true
    }

    fn fresh_node_id(&self) -> NodeId {
        let mut counter = self.nodes.len() + 1;
        loop {
            let candidate = format!("node-{counter}");
            if !self.contains_node(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn fresh_edge_id(&self, source: &str, target: &str) -> EdgeId {
        let base = format!("edge-{source}-{target}");
        if self.edge(&base).is_none() {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}-{suffix}");
            if self.edge(&candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }
}
