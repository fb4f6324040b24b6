// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::callback::{Control, FrameCallback};
use super::state::{RuntimeState, StopReason};
use crate::core::engine::{
    Endpoints, Engine, EngineEvent, EngineStats, OverlayTarget, Sample, SampleFlow,
};
use crate::core::error::{Result, StreamError};
use crate::core::graph::Graph;
use crate::core::layout::Layout;
use crate::core::overlay::OverlayDocument;
use crate::core::pipelines::{INFERENCE_SINK, OVERLAY_SOURCE};
use crate::core::signals;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    /// Sink whose buffers reach the frame callback.
    pub inference_sink: String,
    /// Source overlay documents are pushed into, if the graph has it.
    pub overlay_source: Option<String>,
    /// Restart the stream at end-of-stream instead of stopping.
    pub loop_stream: bool,
    /// Bus poll timeout of the run loop; bounds stop/interrupt latency.
    pub poll_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            inference_sink: INFERENCE_SINK.to_string(),
            overlay_source: Some(OVERLAY_SOURCE.to_string()),
            loop_stream: false,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    /// Samples handed to the frame callback.
    pub frames_delivered: u64,
    pub overlays_published: u64,
    pub stats: EngineStats,
    pub elapsed: Duration,
}

/// State shared with the sample handler on the engine's thread.
#[derive(Default)]
struct Shared {
    /// Closed on stop; no callback starts afterward.
    gate: AtomicBool,
    callback_error: Mutex<Option<anyhow::Error>>,
    overlay: RwLock<Option<Arc<dyn OverlayTarget>>>,
    frames_delivered: AtomicU64,
    overlays_published: AtomicU64,
}

/// Owns one engine instance running one assembled graph.
pub struct PipelineRuntime {
    graph: Graph,
    layout: Layout,
    engine: Box<dyn Engine>,
    options: RuntimeOptions,
    state: RuntimeState,
    control: Control,
    shared: Arc<Shared>,
    started_at: Option<Instant>,
}

impl PipelineRuntime {
    /// Check the graph against the options. Acquires no engine resources.
    pub fn build(
        graph: Graph,
        layout: Layout,
        engine: Box<dyn Engine>,
        options: RuntimeOptions,
    ) -> Result<Self> {
        match graph.find(&options.inference_sink) {
            Some(node) if node.is_sink() => {}
            Some(_) => {
                return Err(StreamError::Configuration(format!(
                    "'{}' is not a sink",
                    options.inference_sink
                )));
            }
            None => {
                return Err(StreamError::Configuration(format!(
                    "Inference sink '{}' not found in graph",
                    options.inference_sink
                )));
            }
        }

        tracing::debug!(
            "Runtime built on {} engine: {} nodes, {} edges",
            engine.name(),
            graph.nodes().len(),
            graph.edges().len()
        );

        Ok(Self {
            graph,
            layout,
            engine,
            options,
            state: RuntimeState::Built,
            control: Control::new(),
            shared: Arc::new(Shared::default()),
            started_at: None,
        })
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Handle that stops the run from any thread.
    pub fn control(&self) -> Control {
        self.control.clone()
    }

    /// Overlay currently composited onto the display branch.
    pub fn current_overlay(&self) -> Option<Arc<OverlayDocument>> {
        self.shared.overlay.read().as_ref()?.current()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Instantiate the graph on the engine and start the flow.
    pub fn start<C: FrameCallback>(&mut self, mut callback: C) -> Result<()> {
        if !self.state.can_start() {
            return Err(StreamError::State(format!(
                "cannot start a {} runtime",
                self.state
            )));
        }

        let shared = Arc::clone(&self.shared);
        let control = self.control.clone();
        let layout = self.layout;
        let handler = move |sample: Sample| {
            if !shared.gate.load(Ordering::Acquire) {
                return SampleFlow::Halt;
            }
            shared.frames_delivered.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Frame {} to callback", sample.sequence);

            match callback.on_frame(&sample, &layout, &control) {
                Ok(Some(document)) => {
                    publish(&shared, document);
                    SampleFlow::Continue
                }
                Ok(None) => SampleFlow::Continue,
                Err(e) => {
                    tracing::error!("Frame callback failed: {:#}", e);
                    *shared.callback_error.lock() = Some(e);
                    shared.gate.store(false, Ordering::Release);
                    control.request_stop();
                    SampleFlow::Halt
                }
            }
        };

        let endpoints = Endpoints {
            inference_sink: self.options.inference_sink.clone(),
            overlay_source: self.options.overlay_source.clone(),
        };

        self.shared.gate.store(true, Ordering::Release);
        if let Err(e) = self.engine.prepare(&self.graph, &endpoints, Box::new(handler)) {
            self.fail();
            return Err(e);
        }
        *self.shared.overlay.write() = self.engine.overlay_target();

        if let Err(e) = self.engine.play() {
            self.fail();
            return Err(e);
        }

        self.state = RuntimeState::Running;
        self.started_at = Some(Instant::now());
        tracing::info!(
            "Pipeline running on {} engine (loop: {})",
            self.engine.name(),
            self.options.loop_stream
        );
        Ok(())
    }

    /// Block until the run ends. Engine faults leave the runtime `Failed`, a
    /// callback error leaves it `Stopped`; both are returned as errors.
    pub fn run_until_stopped(&mut self) -> Result<StopReason> {
        if !self.state.is_active() {
            return Err(StreamError::State(format!(
                "cannot run a {} runtime",
                self.state
            )));
        }

        loop {
            if self.control.stop_requested() {
                let callback_error = self.shared.callback_error.lock().take();
                self.stop()?;
                return match callback_error {
                    Some(e) => Err(StreamError::Callback(e)),
                    None => Ok(StopReason::StopRequested),
                };
            }

            if signals::interrupt_requested() {
                tracing::info!("Interrupt received, stopping pipeline");
                self.stop()?;
                // Consumed; a later runtime in this process starts clean.
                signals::clear_interrupt();
                return Ok(StopReason::Interrupted);
            }

            match self.engine.poll_event(self.options.poll_interval) {
                Some(EngineEvent::EndOfStream) if self.options.loop_stream => {
                    tracing::debug!("End of stream, rewinding");
                    if let Err(e) = self.engine.rewind() {
                        self.fail();
                        return Err(e);
                    }
                }
                Some(EngineEvent::EndOfStream) => {
                    tracing::info!("End of stream");
                    self.stop()?;
                    return Ok(StopReason::EndOfStream);
                }
                Some(EngineEvent::Error { source, message }) => {
                    tracing::error!("Engine error from {}: {}", source, message);
                    self.fail();
                    return Err(StreamError::Engine(format!("{}: {}", source, message)));
                }
                Some(EngineEvent::Warning { source, message }) => {
                    tracing::warn!("Engine warning from {}: {}", source, message);
                }
                None => {}
            }
        }
    }

    /// Close the callback gate and release the engine. Waits for an
    /// in-flight callback. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.shared.gate.store(false, Ordering::Release);
        let result = self.engine.shutdown();
        self.state = RuntimeState::Stopped;
        tracing::info!(
            "Pipeline stopped after {} frames",
            self.shared.frames_delivered.load(Ordering::Relaxed)
        );
        result
    }

    /// start + run loop + stop.
    pub fn run<C: FrameCallback>(&mut self, callback: C) -> Result<RunSummary> {
        self.start(callback)?;
        let stop_reason = self.run_until_stopped()?;
        Ok(self.summary(stop_reason))
    }

    pub fn summary(&self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            stop_reason,
            frames_delivered: self.shared.frames_delivered.load(Ordering::Relaxed),
            overlays_published: self.shared.overlays_published.load(Ordering::Relaxed),
            stats: self.engine.stats(),
            elapsed: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }

    fn fail(&mut self) {
        self.shared.gate.store(false, Ordering::Release);
        if let Err(e) = self.engine.shutdown() {
            tracing::warn!("Engine shutdown after failure: {}", e);
        }
        self.state = RuntimeState::Failed;
    }
}

impl Drop for PipelineRuntime {
    fn drop(&mut self) {
        if self.state.is_active() {
            let _ = self.stop();
        }
    }
}

fn publish(shared: &Shared, document: OverlayDocument) {
    let target = shared.overlay.read().clone();
    let Some(target) = target else {
        tracing::trace!("No overlay target, document discarded");
        return;
    };
    match target.publish(Arc::new(document)) {
        Ok(()) => {
            shared.overlays_published.fetch_add(1, Ordering::Relaxed);
        }
        // Previous overlay stays visible.
        Err(e) => tracing::warn!("Overlay update failed: {}", e),
    }
}
