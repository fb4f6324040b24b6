// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline runtime: owns one engine, delivers inference-branch samples to a
//! frame callback and hands the callback's overlays back to the engine.

mod callback;
mod classify;
mod driver;
mod state;

use std::path::PathBuf;

pub use callback::{Control, FrameCallback};
pub use classify::{
    rank, Classification, ClassificationCallback, Classifier, Labels, DEFAULT_THRESHOLD,
    DEFAULT_TITLE, DEFAULT_TOP_K,
};
pub use driver::{PipelineRuntime, RunSummary, RuntimeOptions};
pub use state::{RuntimeState, StopReason};

use crate::core::engine::{EngineKind, SyntheticConfig};
use crate::core::error::Result;
use crate::core::graph::{assemble, Graph, PipelineFile};
use crate::core::layout::{Layout, Size};
use crate::core::pipelines::{self, Display};
use crate::core::source::Source;

/// Everything [`run`] needs besides the callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub source: Source,
    pub display: Display,
    pub loop_stream: bool,
    pub engine: EngineKind,
    /// End-of-stream after this many captured frames.
    pub frame_limit: Option<u64>,
    /// Pipeline file used instead of the standard topology.
    pub pipeline: Option<PathBuf>,
    pub synthetic: SyntheticConfig,
}

impl RunOptions {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            display: Display::default(),
            loop_stream: false,
            engine: EngineKind::default(),
            frame_limit: None,
            pipeline: None,
            synthetic: SyntheticConfig::default(),
        }
    }

    /// Layout for the source canvas and the model input.
    pub fn layout(&self, inference_size: Size) -> Result<Layout> {
        Ok(Layout::new(self.source.size(), inference_size)?)
    }

    /// Assemble the graph these options describe.
    pub fn graph(&self, layout: &Layout) -> Result<Graph> {
        if let Some(path) = &self.pipeline {
            let mut file = PipelineFile::load(path)?;
            if let Some(frames) = self.frame_limit {
                pipelines::limit_frames(&mut file.fragments, frames);
            }
            tracing::info!("Using pipeline file {}", path.display());
            return file.assemble(Some(layout));
        }

        let mut fragments = pipelines::topology(&self.source, layout, self.display)?;
        if let Some(frames) = self.frame_limit {
            pipelines::limit_frames(&mut fragments, frames);
        }
        Ok(assemble(&fragments)?)
    }
}

/// Build the layout, topology and graph for `options`, then run `callback`
/// on every inference frame until end-of-stream, a stop request, an
/// interrupt or a fault.
pub fn run<C: FrameCallback>(
    inference_size: Size,
    callback: C,
    options: &RunOptions,
) -> Result<RunSummary> {
    let layout = options.layout(inference_size)?;
    let graph = options.graph(&layout)?;
    tracing::info!(
        "Running {} on {} engine, render {}, inference {}",
        options.source,
        options.engine,
        layout.render_size,
        layout.inference_size
    );

    let engine = options.engine.create(options.synthetic.clone())?;
    let mut runtime = PipelineRuntime::build(
        graph,
        layout,
        engine,
        RuntimeOptions {
            loop_stream: options.loop_stream,
            ..Default::default()
        },
    )?;
    runtime.run(callback)
}
