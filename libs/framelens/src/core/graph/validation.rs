// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use petgraph::algo::toposort;

use super::graph::Graph;
use crate::core::error::GraphBuildError;

/// Validate graph structure
pub fn validate_graph(graph: &Graph) -> Result<(), GraphBuildError> {
    if graph.nodes().is_empty() {
        return Err(GraphBuildError::EmptyPipeline);
    }

    // Check for cycles
    let topology = graph.to_petgraph();
    if let Err(cycle) = toposort(&topology, None) {
        let id = topology[cycle.node_id()];
        return Err(GraphBuildError::Cycle {
            stage: graph.node(id).label.clone(),
        });
    }

    for node in graph.nodes() {
        let outputs = graph.outputs(node.id).len();
        if node.is_sink() && outputs > 0 {
            return Err(GraphBuildError::SinkHasOutput {
                stage: node.label.clone(),
            });
        }
        if node.is_source() && !graph.inputs(node.id).is_empty() {
            return Err(GraphBuildError::SourceHasInput {
                stage: node.label.clone(),
            });
        }
        let splits = node.stage().is_some_and(|stage| stage.is_tee());
        if outputs > 1 && !splits {
            return Err(GraphBuildError::MultipleOutputs {
                stage: node.label.clone(),
                outputs,
            });
        }
        if !node.is_sink() && outputs == 0 {
            return Err(GraphBuildError::DanglingOutput {
                stage: node.label.clone(),
            });
        }
        if !node.is_source() && graph.inputs(node.id).is_empty() {
            return Err(GraphBuildError::UnfedInput {
                stage: node.label.clone(),
            });
        }
    }

    Ok(())
}
