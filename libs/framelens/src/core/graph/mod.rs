// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod assembler;
mod caps;
mod file;
mod fragment;
#[allow(clippy::module_inception)]
mod graph;
mod queue;
mod stage;
mod validation;

pub use assembler::{assemble, Assembler};
pub use caps::CapabilityFilter;
pub use file::PipelineFile;
pub use fragment::{Element, Fragment};
pub use graph::{Edge, Graph, Node, NodeId, NodeKind};
pub use queue::{OverflowPolicy, QueueSpec};
pub use stage::{Options, Stage, StageRole, Value};
pub use validation::validate_graph;
