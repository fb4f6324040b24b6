// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process signal handling
//!
//! SIGINT (Ctrl+C) and SIGTERM set a process-wide interrupt flag that every
//! running [`PipelineRuntime`](crate::core::runtime::PipelineRuntime) polls
//! from its run loop, stopping the pipeline gracefully.

use std::sync::atomic::{AtomicBool, Ordering};

static SIGNAL_HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl+C / SIGTERM handler. Only the first call installs.
pub fn install_signal_handlers() -> std::io::Result<()> {
    if SIGNAL_HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        tracing::debug!("Signal handlers already installed, skipping");
        return Ok(());
    }

    ctrlc::set_handler(|| {
        // A second signal while stopping exits immediately.
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .map_err(std::io::Error::other)?;

    tracing::info!("Signal handlers installed (SIGINT, SIGTERM)");
    Ok(())
}

/// Whether an interrupt arrived since start or the last [`clear_interrupt`].
pub fn interrupt_requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raise the interrupt flag as if a signal had arrived.
pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_signal_handler_install_once() {
        let first = install_signal_handlers();
        let second = install_signal_handlers();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    #[serial]
    fn test_interrupt_flag() {
        clear_interrupt();
        assert!(!interrupt_requested());
        request_interrupt();
        assert!(interrupt_requested());
        clear_interrupt();
        assert!(!interrupt_requested());
    }
}
