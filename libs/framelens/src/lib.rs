// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Live camera pipelines with a throttled inference branch.
//!
//! A pipeline is described as fragments of stages, capability filters,
//! queues and name references. The [`Assembler`] links them into one
//! validated [`Graph`]; a [`PipelineRuntime`] runs the graph on an
//! [`Engine`], hands every inference-branch frame to a [`FrameCallback`]
//! and composites the returned [`OverlayDocument`] onto the live video.
//!
//! ```no_run
//! use framelens::{run, Control, Layout, OverlayDocument, RunOptions, Sample, Size, Source};
//!
//! let source = Source::from_args("/dev/video0", "1280x720", "30")?;
//! let summary = run(
//!     Size::new(224, 224),
//!     |sample: &Sample, _: &Layout, _: &Control| -> anyhow::Result<Option<OverlayDocument>> {
//!         tracing::info!("frame {}", sample.sequence);
//!         Ok(None)
//!     },
//!     &RunOptions::new(source),
//! )?;
//! tracing::info!("{} frames", summary.frames_delivered);
//! # Ok::<(), framelens::StreamError>(())
//! ```

pub mod core;

pub use crate::core::pipelines::Display;
pub use crate::core::runtime::run;
pub use crate::core::*;
