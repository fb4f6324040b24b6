// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Execution engines.
//!
//! An [`Engine`] instantiates an assembled [`Graph`], runs it on its own
//! threads, calls the sample handler for every buffer reaching the inference
//! sink, and reports end-of-stream and faults on its event bus.

#[cfg(feature = "gstreamer")]
mod gst;
mod plan;
mod synthetic;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, StreamError};
use crate::core::graph::Graph;
use crate::core::layout::Size;
use crate::core::overlay::OverlayDocument;
use crate::core::source::Source;

#[cfg(feature = "gstreamer")]
pub use gst::GstEngine;
pub use plan::{BranchPlan, Endpoints};
pub use synthetic::{SyntheticConfig, SyntheticEngine};

/// Engine backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// In-process test-pattern engine.
    Synthetic,
    #[serde(rename = "gstreamer")]
    GStreamer,
}

/// GStreamer when built in, the synthetic engine otherwise.
impl Default for EngineKind {
    fn default() -> Self {
        if cfg!(feature = "gstreamer") {
            Self::GStreamer
        } else {
            Self::Synthetic
        }
    }
}

impl EngineKind {
    /// Engine for `source`. Without an explicit choice, real capture needs
    /// the GStreamer engine: the synthetic engine only generates a test
    /// pattern and never opens the source.
    pub fn resolve(requested: Option<Self>, source: &Source) -> Result<Self> {
        match requested {
            Some(kind) => Ok(kind),
            None => match Self::default() {
                Self::Synthetic => Err(StreamError::Configuration(format!(
                    "Reading {} requires the GStreamer engine (build with the `gstreamer` \
                     feature), or select the synthetic test pattern explicitly",
                    source
                ))),
                kind => Ok(kind),
            },
        }
    }

    /// Instantiate the engine. `synthetic` configures the synthetic engine
    /// and is ignored by the others.
    pub fn create(self, synthetic: SyntheticConfig) -> Result<Box<dyn Engine>> {
        match self {
            Self::Synthetic => Ok(Box::new(SyntheticEngine::new(synthetic))),
            #[cfg(feature = "gstreamer")]
            Self::GStreamer => Ok(Box::new(GstEngine::new()?)),
            #[cfg(not(feature = "gstreamer"))]
            Self::GStreamer => Err(StreamError::Configuration(
                "GStreamer engine not available (built without the `gstreamer` feature)".into(),
            )),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthetic => f.write_str("synthetic"),
            Self::GStreamer => f.write_str("gstreamer"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "gstreamer" | "gst" => Ok(Self::GStreamer),
            other => Err(StreamError::Configuration(format!(
                "Unknown engine '{}' (expected synthetic or gstreamer)",
                other
            ))),
        }
    }
}

/// Raw buffer from the inference branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub data: Bytes,
    pub size: Size,
    /// Pixel format name (`RGB`, `RGBA`, ...).
    pub format: String,
    /// Capture order; gaps mean dropped frames.
    pub sequence: u64,
    /// Presentation timestamp relative to the start of the stream.
    pub pts: Option<Duration>,
}

/// Handler verdict for the inference branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFlow {
    Continue,
    /// Stop delivering samples; the rest of the graph keeps running until shutdown.
    Halt,
}

pub type SampleHandler = Box<dyn FnMut(Sample) -> SampleFlow + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    EndOfStream,
    /// Unrecoverable fault (negotiation failure, device loss, ...).
    Error { source: String, message: String },
    Warning { source: String, message: String },
}

/// Destination for overlay documents. Each publish replaces the whole overlay.
pub trait OverlayTarget: Send + Sync {
    fn publish(&self, document: Arc<OverlayDocument>) -> Result<()>;

    /// Document currently shown.
    fn current(&self) -> Option<Arc<OverlayDocument>>;
}

/// Last published document plus a publish counter.
#[derive(Debug, Default)]
pub struct OverlaySlot {
    current: Mutex<Option<Arc<OverlayDocument>>>,
    generation: AtomicU64,
}

impl OverlaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the document, returning the previous one.
    pub fn swap(&self, document: Arc<OverlayDocument>) -> Option<Arc<OverlayDocument>> {
        let previous = self.current.lock().replace(document);
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    pub fn current(&self) -> Option<Arc<OverlayDocument>> {
        self.current.lock().clone()
    }

    /// Number of documents published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl OverlayTarget for OverlaySlot {
    fn publish(&self, document: Arc<OverlayDocument>) -> Result<()> {
        self.swap(document);
        Ok(())
    }

    fn current(&self) -> Option<Arc<OverlayDocument>> {
        OverlaySlot::current(self)
    }
}

/// Frame accounting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub captured: u64,
    pub displayed: u64,
    /// Displayed frames that had an overlay composited.
    pub overlaid: u64,
    pub delivered: u64,
    /// Frames discarded by a drop-oldest queue.
    pub dropped: u64,
    pub max_queue_depth: u64,
}

pub trait Engine: Send {
    fn name(&self) -> &str;

    /// Instantiate the graph and install the sample handler. No data flows yet.
    fn prepare(&mut self, graph: &Graph, endpoints: &Endpoints, handler: SampleHandler) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    /// Next bus event, waiting up to `timeout`.
    fn poll_event(&mut self, timeout: Duration) -> Option<EngineEvent>;

    /// Restart the stream from the beginning after end-of-stream.
    fn rewind(&mut self) -> Result<()>;

    /// Overlay destination, once prepared, when the graph has an overlay source.
    fn overlay_target(&self) -> Option<Arc<dyn OverlayTarget>>;

    fn stats(&self) -> EngineStats {
        EngineStats::default()
    }

    /// Stop the flow and release all resources. Waits for an in-flight sample
    /// handler to return. Idempotent.
    fn shutdown(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub captured: AtomicU64,
    pub displayed: AtomicU64,
    pub overlaid: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub max_queue_depth: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            captured: self.captured.load(Ordering::Relaxed),
            displayed: self.displayed.load(Ordering::Relaxed),
            overlaid: self.overlaid.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Numbers samples by presentation timestamp so frames lost before the
/// inference sink show up as gaps in [`Sample::sequence`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(not(feature = "gstreamer"), allow(dead_code))]
pub(crate) struct FrameSequencer {
    interval: Option<Duration>,
    base: u64,
    last: Option<u64>,
}

#[cfg_attr(not(feature = "gstreamer"), allow(dead_code))]
impl FrameSequencer {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.filter(|i| !i.is_zero()),
            ..Self::default()
        }
    }

    /// Sequence number for the next sample. Strictly increasing, also across
    /// a rewind where timestamps start over.
    pub fn next(&mut self, pts: Option<Duration>) -> u64 {
        let slot = match (pts, self.interval) {
            (Some(pts), Some(interval)) => {
                let interval = interval.as_nanos();
                u64::try_from((pts.as_nanos() + interval / 2) / interval).unwrap_or(u64::MAX)
            }
            _ => {
                let sequence = self.last.map_or(0, |last| last + 1);
                self.last = Some(sequence);
                return sequence;
            }
        };

        let sequence = match self.last {
            Some(last) if self.base.saturating_add(slot) <= last => {
                self.base = last + 1 - slot.min(last + 1);
                last + 1
            }
            _ => self.base.saturating_add(slot),
        };
        self.last = Some(sequence);
        sequence
    }
}
