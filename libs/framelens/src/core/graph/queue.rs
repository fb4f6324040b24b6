// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a full queue does with the next buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits for space (backpressure).
    #[default]
    Block,
    /// Oldest buffered item is discarded to make room.
    DropOldest,
}

/// Thread boundary that decouples producer and consumer rates on a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Buffer bound; `None` leaves the engine default in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffered: Option<u32>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl QueueSpec {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_buffered: u32) -> Self {
        Self {
            max_buffered: Some(max_buffered),
            overflow: OverflowPolicy::Block,
        }
    }

    /// Bounded queue that drops the oldest buffer instead of blocking.
    pub fn leaky(max_buffered: u32) -> Self {
        Self {
            max_buffered: Some(max_buffered),
            overflow: OverflowPolicy::DropOldest,
        }
    }

    pub fn is_leaky(&self) -> bool {
        self.overflow == OverflowPolicy::DropOldest
    }
}

impl fmt::Display for QueueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue")?;
        if let Some(max) = self.max_buffered {
            write!(f, " max-size-buffers={}", max)?;
        }
        if self.is_leaky() {
            write!(f, " leaky=downstream")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_blocking_unbounded() {
        let queue = QueueSpec::default();
        assert_eq!(queue.max_buffered, None);
        assert!(!queue.is_leaky());
        assert_eq!(queue.to_string(), "queue");
    }

    #[test]
    fn test_leaky_queue_display() {
        assert_eq!(
            QueueSpec::leaky(1).to_string(),
            "queue max-size-buffers=1 leaky=downstream"
        );
        assert_eq!(QueueSpec::bounded(4).to_string(), "queue max-size-buffers=4");
    }

    #[test]
    fn test_serde_snake_case_policy() {
        let queue: QueueSpec =
            serde_json::from_str(r#"{"max_buffered": 1, "overflow": "drop_oldest"}"#).unwrap();
        assert_eq!(queue, QueueSpec::leaky(1));
    }
}
