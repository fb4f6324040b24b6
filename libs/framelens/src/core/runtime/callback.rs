// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::engine::Sample;
use crate::core::layout::Layout;
use crate::core::overlay::OverlayDocument;

/// Lets a frame callback end the run. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct Control {
    stop: Arc<AtomicBool>,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            tracing::info!("Stop requested by frame callback");
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Per-frame user code on the inference branch.
///
/// Runs on the engine's inference thread, once per delivered sample, in
/// capture order. Returning `Some` replaces the overlay; `None` keeps the
/// previous one on screen. An error ends the run.
pub trait FrameCallback: Send + 'static {
    fn on_frame(
        &mut self,
        sample: &Sample,
        layout: &Layout,
        control: &Control,
    ) -> anyhow::Result<Option<OverlayDocument>>;
}

impl<F> FrameCallback for F
where
    F: FnMut(&Sample, &Layout, &Control) -> anyhow::Result<Option<OverlayDocument>> + Send + 'static,
{
    fn on_frame(
        &mut self,
        sample: &Sample,
        layout: &Layout,
        control: &Control,
    ) -> anyhow::Result<Option<OverlayDocument>> {
        self(sample, layout, control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_clones_share_flag() {
        let control = Control::new();
        let clone = control.clone();
        assert!(!control.stop_requested());
        clone.request_stop();
        assert!(control.stop_requested());
    }
}
