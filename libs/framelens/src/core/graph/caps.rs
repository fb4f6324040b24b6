// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use serde::{Deserialize, Serialize};

use super::stage::{Options, Value};
use crate::core::layout::Size;

/// Format constraint between two stages: the upstream stage must produce this
/// exact format for the downstream stage to accept it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityFilter {
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub constraints: Options,
}

impl CapabilityFilter {
    pub const RAW_VIDEO: &'static str = "video/x-raw";

    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            constraints: Options::new(),
        }
    }

    /// `video/x-raw` with optional pixel format and size.
    pub fn raw_video(format: Option<&str>, size: Size) -> Self {
        let caps = Self::new(Self::RAW_VIDEO);
        let caps = match format {
            Some(format) => caps.constraint("format", format),
            None => caps,
        };
        caps.constraint("width", size.width)
            .constraint("height", size.height)
    }

    pub fn constraint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// Concrete size, when both dimensions are present and resolved.
    pub fn size(&self) -> Option<Size> {
        let width = self.constraints.get("width")?.as_i64()?;
        let height = self.constraints.get("height")?.as_i64()?;
        Some(Size::new(u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }

    pub fn format(&self) -> Option<&str> {
        self.constraints.get("format")?.as_str()
    }

    pub fn framerate(&self) -> Option<(i32, i32)> {
        self.constraints.get("framerate")?.as_fraction()
    }
}

impl fmt::Display for CapabilityFilter {
    /// Caps string form: `video/x-raw,format=RGB,width=224,height=224`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (key, value) in &self.constraints {
            match value {
                Value::Str(s) => write!(f, ",{}={}", key, s)?,
                other => write!(f, ",{}={}", key, other)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_video_caps_string() {
        let caps = CapabilityFilter::raw_video(Some("RGB"), Size::new(224, 224));
        assert_eq!(caps.to_string(), "video/x-raw,format=RGB,height=224,width=224");
        assert_eq!(caps.size(), Some(Size::new(224, 224)));
        assert_eq!(caps.format(), Some("RGB"));
    }

    #[test]
    fn test_unresolved_size_is_none() {
        let caps = CapabilityFilter::new(CapabilityFilter::RAW_VIDEO)
            .constraint("width", "${render.width}")
            .constraint("height", 720);
        assert_eq!(caps.size(), None);
    }

    #[test]
    fn test_framerate_constraint() {
        let caps = CapabilityFilter::new(CapabilityFilter::RAW_VIDEO).constraint("framerate", (30, 1));
        assert_eq!(caps.framerate(), Some((30, 1)));
        assert_eq!(caps.to_string(), "video/x-raw,framerate=30/1");
    }
}
