// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::VecDeque;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::caps::CapabilityFilter;
use super::queue::QueueSpec;
use super::stage::{Stage, StageRole};

/// Index of a node inside its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Stage(Stage),
    Caps(CapabilityFilter),
    Queue(QueueSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Unique instance name: the declared name, or one derived from the
    /// element and its position.
    pub label: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn stage(&self) -> Option<&Stage> {
        match &self.kind {
            NodeKind::Stage(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn caps(&self) -> Option<&CapabilityFilter> {
        match &self.kind {
            NodeKind::Caps(caps) => Some(caps),
            _ => None,
        }
    }

    pub fn queue(&self) -> Option<&QueueSpec> {
        match &self.kind {
            NodeKind::Queue(queue) => Some(queue),
            _ => None,
        }
    }

    pub fn is_source(&self) -> bool {
        self.stage().is_some_and(|s| s.role == StageRole::Source)
    }

    pub fn is_sink(&self) -> bool {
        self.stage().is_some_and(|s| s.role == StageRole::Sink)
    }

    /// Engine element name.
    pub fn factory(&self) -> String {
        match &self.kind {
            NodeKind::Stage(stage) => stage.factory(),
            NodeKind::Caps(_) => "capsfilter".to_string(),
            NodeKind::Queue(_) => "queue".to_string(),
        }
    }

    /// Element declaration in gst-launch syntax.
    pub fn launch_declaration(&self) -> String {
        match &self.kind {
            NodeKind::Stage(stage) => {
                let mut out = format!("{} name={}", stage.factory(), self.label);
                for (key, value) in &stage.options {
                    out.push_str(&format!(" {}={}", key.replace('_', "-"), value));
                }
                out
            }
            NodeKind::Caps(caps) => format!("capsfilter name={} caps=\"{}\"", self.label, caps),
            NodeKind::Queue(queue) => {
                let mut out = format!("queue name={}", self.label);
                if let Some(max) = queue.max_buffered {
                    out.push_str(&format!(" max-size-buffers={}", max));
                }
                if queue.is_leaky() {
                    out.push_str(" leaky=downstream");
                }
                out
            }
        }
    }
}

/// Link between two nodes. `ordinal` is the global declaration order, which
/// decides pad order on branch and merge points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub ordinal: usize,
}

/// Fully assembled pipeline graph. Built once by the
/// [`Assembler`](super::Assembler), immutable afterward.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Node by label (declared name or derived instance name).
    pub fn find(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label == label)
    }

    /// Downstream neighbours in declaration order.
    pub fn outputs(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<&Edge> = self.edges.iter().filter(|e| e.from == id).collect();
        edges.sort_by_key(|e| e.ordinal);
        edges.into_iter().map(|e| e.to).collect()
    }

    /// Upstream neighbours in declaration order. For a merge point this is the
    /// compositing order: first input at the bottom, last on top.
    pub fn inputs(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<&Edge> = self.edges.iter().filter(|e| e.to == id).collect();
        edges.sort_by_key(|e| e.ordinal);
        edges.into_iter().map(|e| e.from).collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_source())
    }

    pub fn sinks(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_sink())
    }

    /// Shortest downstream path from `from` to `to`, both included.
    pub fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        let mut previous: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([from]);
        seen[from.0] = true;

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(prev) = previous[cursor.0] {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.outputs(current) {
                if !seen[next.0] {
                    seen[next.0] = true;
                    previous[next.0] = Some(current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// First source from which `target` is reachable.
    pub fn source_of(&self, target: NodeId) -> Option<(&Node, Vec<NodeId>)> {
        self.sources()
            .find_map(|source| self.path(source.id, target).map(|path| (source, path)))
    }

    /// Nearest capability filter walking upstream from `id` along first inputs.
    pub fn caps_upstream(&self, id: NodeId) -> Option<&CapabilityFilter> {
        let mut cursor = self.inputs(id).into_iter().next();
        while let Some(current) = cursor {
            let node = self.node(current);
            if let Some(caps) = node.caps() {
                return Some(caps);
            }
            cursor = self.inputs(current).into_iter().next();
        }
        None
    }

    /// Nearest capability filter walking downstream from `id` along first outputs.
    pub fn caps_downstream(&self, id: NodeId) -> Option<&CapabilityFilter> {
        let mut cursor = self.outputs(id).into_iter().next();
        while let Some(current) = cursor {
            let node = self.node(current);
            if let Some(caps) = node.caps() {
                return Some(caps);
            }
            cursor = self.outputs(current).into_iter().next();
        }
        None
    }

    /// petgraph view for topology algorithms. Node weights are [`NodeId`]s,
    /// edge weights are ordinals.
    pub fn to_petgraph(&self) -> DiGraph<NodeId, usize> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let indices: Vec<NodeIndex> = self.nodes.iter().map(|n| graph.add_node(n.id)).collect();
        for edge in &self.edges {
            graph.add_edge(indices[edge.from.0], indices[edge.to.0], edge.ordinal);
        }
        graph
    }

    /// gst-launch description: every element declared once, then one link per
    /// edge in declaration order (`a. ! b.`), so tee and mixer pads are
    /// requested in that order.
    pub fn to_launch_description(&self) -> String {
        let mut parts: Vec<String> = self.nodes.iter().map(Node::launch_declaration).collect();
        let mut edges: Vec<&Edge> = self.edges.iter().collect();
        edges.sort_by_key(|e| e.ordinal);
        for edge in edges {
            parts.push(format!(
                "{}. ! {}.",
                self.node(edge.from).label,
                self.node(edge.to).label
            ));
        }
        parts.join(" ")
    }
}

impl fmt::Display for Graph {
    /// One line per edge, `from -> to`, in declaration order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut edges: Vec<&Edge> = self.edges.iter().collect();
        edges.sort_by_key(|e| e.ordinal);
        for edge in edges {
            let from = self.node(edge.from);
            let to = self.node(edge.to);
            writeln!(f, "{} ({}) -> {} ({})", from.label, from.factory(), to.label, to.factory())?;
        }
        Ok(())
    }
}
