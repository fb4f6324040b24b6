// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime state machine types
//!
//! ```text
//! ┌───────┐ start() ┌─────────┐ stop() / end-of-stream / interrupt ┌─────────┐
//! │ Built │────────►│ Running │───────────────────────────────────►│ Stopped │
//! └───────┘         └────┬────┘                                    └─────────┘
//!                        │ engine fault
//!                        ▼
//!                   ┌────────┐
//!                   │ Failed │
//!                   └────────┘
//! ```

use std::fmt;

/// Lifecycle of one [`PipelineRuntime`](super::PipelineRuntime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeState {
    /// Graph assembled, no engine resources held.
    #[default]
    Built,
    /// Engine pulling frames.
    Running,
    /// Stopped on request, end-of-stream or interrupt; resources released.
    Stopped,
    /// Engine reported an unrecoverable error; resources released.
    Failed,
}

impl RuntimeState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, Self::Built)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Built => "built",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    /// The frame callback asked to stop through its [`Control`](super::Control).
    StopRequested,
    Interrupted,
}
