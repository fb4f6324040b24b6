// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod layout;
pub mod overlay;
pub mod pipelines;
pub mod runtime;
pub mod signals;
pub mod source;

pub use config::RunConfig;
pub use engine::{
    Endpoints, Engine, EngineEvent, EngineKind, EngineStats, OverlaySlot, OverlayTarget, Sample,
    SampleFlow, SampleHandler, SyntheticConfig, SyntheticEngine,
};
pub use error::*;
pub use graph::{
    assemble, Assembler, CapabilityFilter, Element, Fragment, Graph, Node, NodeId, NodeKind,
    OverflowPolicy, PipelineFile, QueueSpec, Stage, StageRole, Value,
};
pub use layout::{max_inner_size, Layout, Rect, Size};
pub use overlay::{render_overlay, InferenceTiming, LineKind, OverlayDocument, OverlayLine};
pub use runtime::{
    Classification, ClassificationCallback, Classifier, Control, FrameCallback, Labels,
    PipelineRuntime, RunOptions, RunSummary, RuntimeOptions, RuntimeState, StopReason,
};
pub use source::{CaptureFormat, Source};
