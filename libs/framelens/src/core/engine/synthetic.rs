// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process engine with a test-pattern source.
//!
//! Runs the inference branch the way a real engine does: one capture thread
//! paced at the graph's frame rate feeds the display sinks synchronously and
//! pushes into the branch queue; a second thread drains the queue into the
//! sample handler. Without a queue on the branch the handler runs on the
//! capture thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use super::{
    BranchPlan, Endpoints, Engine, EngineEvent, EngineStats, OverlaySlot, OverlayTarget, Sample,
    SampleFlow, SampleHandler, StatsCounters,
};
use crate::core::error::{Result, StreamError};
use crate::core::graph::{Graph, OverflowPolicy, QueueSpec};
use crate::core::layout::Size;

/// How often blocked producers re-check for shutdown.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Sleep one frame interval between captures.
    pub realtime: bool,
    /// Capture interval; defaults to the graph's frame rate.
    pub frame_interval: Option<Duration>,
    /// Frames until end-of-stream when the source sets no `num_buffers`.
    pub frame_limit: Option<u64>,
    /// Report a device fault after this many captured frames.
    pub fail_after_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            frame_interval: None,
            frame_limit: None,
            fail_after_frames: None,
        }
    }
}

impl SyntheticConfig {
    pub fn frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Capture as fast as the branch allows.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn fail_after_frames(mut self, frames: u64) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }
}

enum BranchItem {
    Frame(Sample),
    EndOfStream,
}

pub struct SyntheticEngine {
    config: SyntheticConfig,
    plan: Option<BranchPlan>,
    handler: Option<SampleHandler>,
    overlay: Option<Arc<OverlaySlot>>,
    stats: Arc<StatsCounters>,
    bus_tx: Sender<EngineEvent>,
    bus_rx: Receiver<EngineEvent>,
    shutdown_tx: Option<Sender<()>>,
    rewind_tx: Option<Sender<()>>,
    stopping: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticConfig) -> Self {
        let (bus_tx, bus_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            plan: None,
            handler: None,
            overlay: None,
            stats: Arc::new(StatsCounters::default()),
            bus_tx,
            bus_rx,
            shutdown_tx: None,
            rewind_tx: None,
            stopping: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    pub fn plan(&self) -> Option<&BranchPlan> {
        self.plan.as_ref()
    }
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl Engine for SyntheticEngine {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn prepare(&mut self, graph: &Graph, endpoints: &Endpoints, handler: SampleHandler) -> Result<()> {
        if self.plan.is_some() {
            return Err(StreamError::State("synthetic engine already prepared".into()));
        }
        let plan = BranchPlan::resolve(graph, endpoints)?;
        tracing::debug!(
            "Synthetic engine: {} nodes on inference path, queue {:?}, samples {:?} {}",
            plan.path.len(),
            plan.queue,
            plan.sample_size,
            plan.sample_format
        );
        self.overlay = plan.overlay_source.map(|_| Arc::new(OverlaySlot::new()));
        self.plan = Some(plan);
        self.handler = Some(handler);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| StreamError::State("synthetic engine not prepared".into()))?;
        let handler = self
            .handler
            .take()
            .ok_or_else(|| StreamError::State("synthetic engine already playing".into()))?;

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (rewind_tx, rewind_rx) = crossbeam_channel::unbounded::<()>();

        let branch = match plan.queue {
            Some(spec) => {
                let (tx, rx) = match spec.max_buffered {
                    Some(max) => crossbeam_channel::bounded(max.max(1) as usize),
                    None => crossbeam_channel::unbounded(),
                };
                let consumer = InferenceLoop {
                    handler,
                    halted: false,
                    queue_rx: rx.clone(),
                    shutdown_rx: shutdown_rx.clone(),
                    bus_tx: self.bus_tx.clone(),
                    stats: Arc::clone(&self.stats),
                };
                self.threads.push(
                    std::thread::Builder::new()
                        .name("framelens-inference".into())
                        .spawn(move || consumer.run())?,
                );
                Branch::Queued { spec, tx, rx }
            }
            None => Branch::Inline {
                handler,
                halted: false,
            },
        };

        let sample_size = plan.sample_size.unwrap_or(Size::new(1, 1));
        let capture = CaptureLoop {
            interval: self.config.frame_interval.or(plan.frame_interval),
            realtime: self.config.realtime,
            frame_limit: plan.frame_limit.or(self.config.frame_limit),
            fail_after: self.config.fail_after_frames,
            sample_size,
            sample_len: sample_size.width as usize * sample_size.height as usize * plan.bytes_per_pixel(),
            sample_format: plan.sample_format.clone(),
            has_display: !plan.display_sinks.is_empty(),
            overlay: self.overlay.clone(),
            branch,
            stats: Arc::clone(&self.stats),
            bus_tx: self.bus_tx.clone(),
            shutdown_rx,
            rewind_rx,
            stopping: Arc::clone(&self.stopping),
        };
        self.threads.push(
            std::thread::Builder::new()
                .name("framelens-capture".into())
                .spawn(move || capture.run())?,
        );

        self.shutdown_tx = Some(shutdown_tx);
        self.rewind_tx = Some(rewind_tx);
        tracing::info!("Synthetic engine playing");
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        self.bus_rx.recv_timeout(timeout).ok()
    }

    fn rewind(&mut self) -> Result<()> {
        let tx = self
            .rewind_tx
            .as_ref()
            .ok_or_else(|| StreamError::State("synthetic engine not playing".into()))?;
        tx.send(())
            .map_err(|_| StreamError::Engine("capture thread has exited".into()))
    }

    fn overlay_target(&self) -> Option<Arc<dyn OverlayTarget>> {
        self.overlay
            .clone()
            .map(|slot| slot as Arc<dyn OverlayTarget>)
    }

    fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stopping.store(true, Ordering::Release);
        self.shutdown_tx.take();
        self.rewind_tx.take();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Synthetic engine thread panicked");
            }
        }
        Ok(())
    }
}

impl Drop for SyntheticEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

enum Branch {
    Inline {
        handler: SampleHandler,
        halted: bool,
    },
    Queued {
        spec: QueueSpec,
        tx: Sender<BranchItem>,
        /// Producer-side receiver, used to evict the oldest frame.
        rx: Receiver<BranchItem>,
    },
}

struct CaptureLoop {
    interval: Option<Duration>,
    realtime: bool,
    frame_limit: Option<u64>,
    fail_after: Option<u64>,
    sample_size: Size,
    sample_len: usize,
    sample_format: String,
    has_display: bool,
    overlay: Option<Arc<OverlaySlot>>,
    branch: Branch,
    stats: Arc<StatsCounters>,
    bus_tx: Sender<EngineEvent>,
    shutdown_rx: Receiver<()>,
    rewind_rx: Receiver<()>,
    stopping: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(mut self) {
        tracing::debug!(
            "Capture started (interval {:?}, limit {:?})",
            self.interval,
            self.frame_limit
        );
        let mut sequence = 0u64;

        loop {
            let segment_start = Instant::now();
            let mut in_segment = 0u64;

            while !self.frame_limit.is_some_and(|limit| in_segment >= limit) {
                if !self.wait_frame() {
                    return;
                }

                let pts = match self.interval {
                    Some(interval) => interval.saturating_mul(in_segment as u32),
                    None => segment_start.elapsed(),
                };
                let sample = Sample {
                    data: Bytes::from(vec![(sequence % 251) as u8; self.sample_len]),
                    size: self.sample_size,
                    format: self.sample_format.clone(),
                    sequence,
                    pts: Some(pts),
                };

                let captured = StatsCounters::bump(&self.stats.captured);
                self.display();
                if !self.deliver(sample) {
                    return;
                }
                sequence += 1;
                in_segment += 1;

                if self.fail_after.is_some_and(|n| captured >= n) {
                    tracing::warn!("Synthetic capture fault after {} frames", captured);
                    let _ = self.bus_tx.send(EngineEvent::Error {
                        source: "synthetic-src".into(),
                        message: "capture device lost".into(),
                    });
                    return;
                }
            }

            tracing::debug!("Capture reached end-of-stream after {} frames", in_segment);
            if !self.end_of_stream() {
                return;
            }

            crossbeam_channel::select! {
                recv(self.rewind_rx) -> msg => {
                    if msg.is_err() {
                        return;
                    }
                    tracing::debug!("Capture rewound");
                }
                recv(self.shutdown_rx) -> _ => return,
            }
        }
    }

    /// Pace one frame. `false` once shutdown was requested.
    fn wait_frame(&self) -> bool {
        match self.interval.filter(|_| self.realtime) {
            Some(interval) => matches!(
                self.shutdown_rx.recv_timeout(interval),
                Err(RecvTimeoutError::Timeout)
            ),
            None => !self.stopping.load(Ordering::Acquire),
        }
    }

    fn display(&self) {
        if !self.has_display {
            return;
        }
        StatsCounters::bump(&self.stats.displayed);
        if self.overlay.as_ref().is_some_and(|slot| slot.current().is_some()) {
            StatsCounters::bump(&self.stats.overlaid);
        }
    }

    fn deliver(&mut self, sample: Sample) -> bool {
        let overflow = match &mut self.branch {
            Branch::Inline { handler, halted } => {
                if !*halted {
                    StatsCounters::bump(&self.stats.delivered);
                    if handler(sample) == SampleFlow::Halt {
                        *halted = true;
                    }
                }
                return true;
            }
            Branch::Queued { spec, .. } => spec.overflow,
        };
        match overflow {
            OverflowPolicy::DropOldest => self.push_leaky(BranchItem::Frame(sample)),
            OverflowPolicy::Block => self.push_blocking(BranchItem::Frame(sample)),
        }
    }

    fn end_of_stream(&self) -> bool {
        match &self.branch {
            Branch::Inline { .. } => self.bus_tx.send(EngineEvent::EndOfStream).is_ok(),
            // Behind the frames already queued.
            Branch::Queued { .. } => self.push_blocking(BranchItem::EndOfStream),
        }
    }

    fn push_leaky(&self, mut item: BranchItem) -> bool {
        let Branch::Queued { tx, rx, .. } = &self.branch else {
            return false;
        };
        loop {
            match tx.try_send(item) {
                Ok(()) => {
                    self.record_depth(tx.len());
                    return true;
                }
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if let Ok(BranchItem::Frame(old)) = rx.try_recv() {
                        StatsCounters::bump(&self.stats.dropped);
                        tracing::trace!("Inference queue full, dropped frame {}", old.sequence);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    fn push_blocking(&self, mut item: BranchItem) -> bool {
        let Branch::Queued { tx, .. } = &self.branch else {
            return false;
        };
        loop {
            match tx.send_timeout(item, STOP_CHECK_INTERVAL) {
                Ok(()) => {
                    self.record_depth(tx.len());
                    return true;
                }
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.stopping.load(Ordering::Acquire) {
                        return false;
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn record_depth(&self, depth: usize) {
        self.stats
            .max_queue_depth
            .fetch_max(depth as u64, Ordering::Relaxed);
    }
}

struct InferenceLoop {
    handler: SampleHandler,
    halted: bool,
    queue_rx: Receiver<BranchItem>,
    shutdown_rx: Receiver<()>,
    bus_tx: Sender<EngineEvent>,
    stats: Arc<StatsCounters>,
}

impl InferenceLoop {
    fn run(mut self) {
        tracing::debug!("Inference branch thread started");
        loop {
            crossbeam_channel::select! {
                recv(self.shutdown_rx) -> _ => break,
                recv(self.queue_rx) -> msg => match msg {
                    Ok(BranchItem::Frame(sample)) => self.handle(sample),
                    Ok(BranchItem::EndOfStream) => {
                        let _ = self.bus_tx.send(EngineEvent::EndOfStream);
                    }
                    Err(_) => break,
                },
            }
        }
        tracing::debug!("Inference branch thread stopped");
    }

    fn handle(&mut self, sample: Sample) {
        if self.halted {
            return;
        }
        StatsCounters::bump(&self.stats.delivered);
        if (self.handler)(sample) == SampleFlow::Halt {
            tracing::debug!("Inference branch halted by handler");
            self.halted = true;
        }
    }
}
