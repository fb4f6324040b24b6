// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! GStreamer engine. The assembled graph is rendered to a launch description
//! and parsed into one pipeline; the inference sink's streaming thread runs
//! the sample handler.
//!
//! End-of-stream is taken from the inference sink, not the bus. A mixer fed
//! by the live overlay appsrc never drains, so the pipeline itself would not
//! post EOS in display mode.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::{
    BranchPlan, Endpoints, Engine, EngineEvent, EngineStats, FrameSequencer, OverlaySlot,
    OverlayTarget, Sample, SampleFlow, SampleHandler, StatsCounters,
};
use crate::core::error::{Result, StreamError};
use crate::core::graph::Graph;
use crate::core::layout::Size;
use crate::core::overlay::OverlayDocument;

struct GstOverlay {
    slot: OverlaySlot,
    appsrc: gst_app::AppSrc,
}

impl OverlayTarget for GstOverlay {
    fn publish(&self, document: Arc<OverlayDocument>) -> Result<()> {
        let buffer = gst::Buffer::from_slice(document.to_bytes());
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| StreamError::Engine(format!("overlay push failed: {:?}", e)))?;
        self.slot.swap(document);
        Ok(())
    }

    fn current(&self) -> Option<Arc<OverlayDocument>> {
        self.slot.current()
    }
}

#[derive(Default)]
pub struct GstEngine {
    pipeline: Option<gst::Pipeline>,
    overlay: Option<Arc<GstOverlay>>,
    events: Option<Receiver<EngineEvent>>,
    stats: Arc<StatsCounters>,
}

impl GstEngine {
    pub fn new() -> Result<Self> {
        gst::init().map_err(|e| StreamError::Engine(format!("GStreamer init failed: {}", e)))?;
        Ok(Self::default())
    }

    fn pending_event(&self) -> Option<EngineEvent> {
        self.events.as_ref()?.try_recv().ok()
    }

    fn pipeline(&self) -> Result<&gst::Pipeline> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| StreamError::State("GStreamer pipeline not prepared".into()))
    }
}

fn to_sample(sample: &gst::Sample, sequencer: &mut FrameSequencer) -> Option<Sample> {
    let buffer = sample.buffer()?;
    let caps = sample.caps()?;
    let structure = caps.structure(0)?;
    let width = structure.get::<i32>("width").ok()?;
    let height = structure.get::<i32>("height").ok()?;
    let format = structure.get::<&str>("format").unwrap_or("RGB").to_string();
    let map = buffer.map_readable().ok()?;
    let pts = buffer.pts().map(|t| Duration::from_nanos(t.nseconds()));

    Some(Sample {
        data: bytes::Bytes::copy_from_slice(map.as_slice()),
        size: Size::new(width.max(0) as u32, height.max(0) as u32),
        format,
        sequence: sequencer.next(pts),
        pts,
    })
}

/// Appsink `eos` callback: report end-of-stream once the inference branch
/// has drained.
fn end_of_stream_relay(events: Sender<EngineEvent>) -> impl FnMut(&gst_app::AppSink) + Send + 'static {
    move |_sink| {
        tracing::debug!("Inference sink reached end-of-stream");
        let _ = events.send(EngineEvent::EndOfStream);
    }
}

impl Engine for GstEngine {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn prepare(&mut self, graph: &Graph, endpoints: &Endpoints, mut handler: SampleHandler) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(StreamError::State("GStreamer pipeline already prepared".into()));
        }
        let plan = BranchPlan::resolve(graph, endpoints)?;

        let description = graph.to_launch_description();
        tracing::debug!("gst-launch: {}", description);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| StreamError::Engine(format!("Failed to parse pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| StreamError::Engine("Launch description is not a pipeline".into()))?;

        let sink_name = &graph.node(plan.sink).label;
        let appsink = pipeline
            .by_name(sink_name)
            .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| StreamError::Engine(format!("'{}' is not an appsink", sink_name)))?;

        let stats = Arc::clone(&self.stats);
        let mut sequencer = FrameSequencer::new(plan.frame_interval);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let Some(sample) = to_sample(&sample, &mut sequencer) else {
                        tracing::warn!("Dropping sample without video caps");
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    StatsCounters::bump(&stats.delivered);
                    match handler(sample) {
                        SampleFlow::Continue => Ok(gst::FlowSuccess::Ok),
                        SampleFlow::Halt => Err(gst::FlowError::Eos),
                    }
                })
                .eos(end_of_stream_relay(events_tx))
                .build(),
        );

        if let Some(id) = plan.overlay_source {
            let name = &graph.node(id).label;
            let appsrc = pipeline
                .by_name(name)
                .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
                .ok_or_else(|| StreamError::Engine(format!("'{}' is not an appsrc", name)))?;
            self.overlay = Some(Arc::new(GstOverlay {
                slot: OverlaySlot::new(),
                appsrc,
            }));
        }

        self.pipeline = Some(pipeline);
        self.events = Some(events_rx);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.pipeline()?
            .set_state(gst::State::Playing)
            .map_err(|e| StreamError::Engine(format!("Failed to start pipeline: {}", e)))?;
        tracing::info!("GStreamer pipeline playing");
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        if let Some(event) = self.pending_event() {
            return Some(event);
        }
        let bus = self.pipeline.as_ref()?.bus()?;
        let Some(message) = bus.timed_pop(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64))
        else {
            return self.pending_event();
        };
        let source = message
            .src()
            .map(|s| s.path_string().to_string())
            .unwrap_or_default();
        match message.view() {
            gst::MessageView::Eos(..) => {
                tracing::debug!("Pipeline EOS (already reported by the inference sink)");
                self.pending_event()
            }
            gst::MessageView::Error(err) => {
                let mut message = err.error().to_string();
                if let Some(debug) = err.debug() {
                    message = format!("{} ({})", message, debug);
                }
                Some(EngineEvent::Error { source, message })
            }
            gst::MessageView::Warning(warning) => Some(EngineEvent::Warning {
                source,
                message: warning.error().to_string(),
            }),
            _ => self.pending_event(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.pipeline()?
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT, gst::ClockTime::ZERO)
            .map_err(|e| StreamError::Engine(format!("Rewind failed: {}", e)))
    }

    fn overlay_target(&self) -> Option<Arc<dyn OverlayTarget>> {
        self.overlay
            .clone()
            .map(|overlay| overlay as Arc<dyn OverlayTarget>)
    }

    fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.overlay = None;
        self.events = None;
        if let Some(pipeline) = self.pipeline.take() {
            pipeline
                .set_state(gst::State::Null)
                .map_err(|e| StreamError::Engine(format!("Failed to stop pipeline: {}", e)))?;
            tracing::info!("GStreamer pipeline stopped");
        }
        Ok(())
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
