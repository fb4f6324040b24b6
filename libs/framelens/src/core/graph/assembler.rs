// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::{BTreeMap, HashMap};

use super::fragment::{Element, Fragment};
use super::graph::{Edge, Graph, Node, NodeId, NodeKind};
use super::stage::{Options, Stage, Value};
use super::validation::validate_graph;
use crate::core::error::GraphBuildError;
use crate::core::layout::Layout;

/// Turns an ordered list of [`Fragment`]s into one linked, validated [`Graph`].
///
/// Named stages are join points: every declaration or reference of a name maps
/// to the same node, and every link to or from it becomes its own edge, in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    bindings: BTreeMap<String, Value>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `${key}` placeholders to a concrete value.
    pub fn bind(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    /// Bind the layout's sizes (`render.width`, `scaled.height`, ...).
    pub fn with_layout(mut self, layout: &Layout) -> Result<Self, GraphBuildError> {
        for (key, value) in layout.bindings()? {
            self.bindings.insert(key, Value::Int(value));
        }
        Ok(self)
    }

    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    pub fn assemble(&self, fragments: &[Fragment]) -> Result<Graph, GraphBuildError> {
        let chains: Vec<Vec<&Element>> = fragments
            .iter()
            .map(Fragment::leaves)
            .filter(|leaves| !leaves.is_empty())
            .collect();
        if chains.is_empty() {
            return Err(GraphBuildError::EmptyPipeline);
        }

        let declared = collect_declarations(&chains)?;
        let mut builder = GraphBuilder::new(&declared);

        for chain in &chains {
            let mut previous: Option<NodeId> = None;
            for element in chain {
                let id = builder.node_for(element)?;
                if let Some(from) = previous {
                    builder.link(from, id);
                }
                previous = Some(id);
            }
        }

        let mut graph = builder.finish();
        self.resolve_placeholders(&mut graph)?;
        validate_graph(&graph)?;

        tracing::debug!(
            "Assembled graph with {} nodes and {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    fn resolve_placeholders(&self, graph: &mut Graph) -> Result<(), GraphBuildError> {
        for node in &mut graph.nodes {
            let options = match &mut node.kind {
                NodeKind::Stage(stage) => &mut stage.options,
                NodeKind::Caps(caps) => &mut caps.constraints,
                NodeKind::Queue(_) => continue,
            };
            resolve_options(options, &self.bindings, &node.label)?;
        }
        Ok(())
    }
}

/// Assemble without placeholder bindings.
pub fn assemble(fragments: &[Fragment]) -> Result<Graph, GraphBuildError> {
    Assembler::new().assemble(fragments)
}

fn resolve_options(
    options: &mut Options,
    bindings: &BTreeMap<String, Value>,
    owner: &str,
) -> Result<(), GraphBuildError> {
    for value in options.values_mut() {
        if let Some(key) = value.placeholder() {
            let bound = bindings
                .get(key)
                .ok_or_else(|| GraphBuildError::UnresolvedPlaceholder {
                    owner: owner.to_string(),
                    placeholder: key.to_string(),
                })?;
            *value = bound.clone();
        }
    }
    Ok(())
}

/// First declaration of every named stage. A repeated declaration must match
/// the first one exactly.
fn collect_declarations<'a>(
    chains: &[Vec<&'a Element>],
) -> Result<HashMap<&'a str, &'a Stage>, GraphBuildError> {
    let mut declared: HashMap<&str, &Stage> = HashMap::new();
    for element in chains.iter().flatten().copied() {
        let Element::Stage(stage) = element else {
            continue;
        };
        let Some(name) = stage.name.as_deref() else {
            continue;
        };
        match declared.get(name) {
            Some(first) if *first != stage => {
                return Err(GraphBuildError::ConflictingStage {
                    name: name.to_string(),
                    first: first.to_string(),
                    second: stage.to_string(),
                });
            }
            Some(_) => {}
            None => {
                declared.insert(name, stage);
            }
        }
    }
    Ok(declared)
}

struct GraphBuilder<'a> {
    declared: &'a HashMap<&'a str, &'a Stage>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    by_name: HashMap<String, NodeId>,
    counters: HashMap<String, usize>,
}

impl<'a> GraphBuilder<'a> {
    fn new(declared: &'a HashMap<&'a str, &'a Stage>) -> Self {
        Self {
            declared,
            nodes: Vec::new(),
            edges: Vec::new(),
            by_name: HashMap::new(),
            counters: HashMap::new(),
        }
    }

    fn node_for(&mut self, element: &Element) -> Result<NodeId, GraphBuildError> {
        match element {
            Element::Stage(stage) => match stage.name.as_deref() {
                Some(name) => Ok(self.named(name, stage)),
                None => Ok(self.anonymous(NodeKind::Stage(stage.clone()))),
            },
            Element::Caps(caps) => Ok(self.anonymous(NodeKind::Caps(caps.clone()))),
            Element::Queue(queue) => Ok(self.anonymous(NodeKind::Queue(*queue))),
            Element::Ref(name) => {
                let stage = self.declared.get(name.as_str()).copied().ok_or_else(|| {
                    GraphBuildError::UndeclaredReference { name: name.clone() }
                })?;
                Ok(self.named(name, stage))
            }
            // Leaves never contain chains.
            Element::Chain(_) => Err(GraphBuildError::EmptyPipeline),
        }
    }

    fn named(&mut self, name: &str, stage: &Stage) -> NodeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = self.push(name.to_string(), NodeKind::Stage(stage.clone()));
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn anonymous(&mut self, kind: NodeKind) -> NodeId {
        let factory = match &kind {
            NodeKind::Stage(stage) => stage.factory(),
            NodeKind::Caps(_) => "capsfilter".to_string(),
            NodeKind::Queue(_) => "queue".to_string(),
        };
        let label = self.unique_label(&factory);
        self.push(label, kind)
    }

    /// `videoconvert0`, `videoconvert1`, ... skipping names declared elsewhere.
    fn unique_label(&mut self, factory: &str) -> String {
        let counter = self.counters.entry(factory.to_string()).or_insert(0);
        loop {
            let label = format!("{}{}", factory, counter);
            *counter += 1;
            if !self.declared.contains_key(label.as_str()) {
                return label;
            }
        }
    }

    fn push(&mut self, label: String, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, label, kind });
        id
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        let ordinal = self.edges.len();
        self.edges.push(Edge { from, to, ordinal });
    }

    fn finish(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}
