// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

/// Errors raised while turning fragments into a linked [`Graph`](crate::core::graph::Graph).
///
/// All of these are fatal and surface before any engine resource is acquired.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphBuildError {
    #[error("Pipeline has no elements")]
    EmptyPipeline,

    #[error("Reference to undeclared stage '{name}'")]
    UndeclaredReference { name: String },

    #[error("Stage '{name}' declared as '{first}' and again as '{second}'")]
    ConflictingStage {
        name: String,
        first: String,
        second: String,
    },

    #[error("Output of '{stage}' is not linked to anything")]
    DanglingOutput { stage: String },

    #[error("Input of '{stage}' is not fed by anything")]
    UnfedInput { stage: String },

    #[error("Stage '{stage}' has {outputs} outputs; only a tee can split a stream")]
    MultipleOutputs { stage: String, outputs: usize },

    #[error("Sink '{stage}' cannot link to another stage")]
    SinkHasOutput { stage: String },

    #[error("Source '{stage}' cannot be fed by another stage")]
    SourceHasInput { stage: String },

    #[error("Placeholder '{placeholder}' in '{owner}' has no binding")]
    UnresolvedPlaceholder { owner: String, placeholder: String },

    #[error("Pipeline graph contains a cycle through '{stage}'")]
    Cycle { stage: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Graph build error: {0}")]
    GraphBuild(#[from] GraphBuildError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Frame callback failed: {0}")]
    Callback(anyhow::Error),

    #[error("Invalid runtime state: {0}")]
    State(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// Whether this error was raised while describing the graph, before any
    /// engine resource was touched.
    pub fn is_build_error(&self) -> bool {
        matches!(self, Self::GraphBuild(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
