// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Run configuration
//!
//! Loaded from `framelens.yaml`; every field is optional and command line
//! flags take precedence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::engine::EngineKind;
use crate::core::error::{Result, StreamError};
use crate::core::pipelines::Display;
use crate::core::runtime::{DEFAULT_THRESHOLD, DEFAULT_TITLE, DEFAULT_TOP_K};
use crate::core::source::Source;

pub const DEFAULT_CONFIG_FILE: &str = "framelens.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Camera device or still image path.
    pub source: String,
    /// Capture resolution, `WxH`.
    pub resolution: String,
    /// Capture frame rate numerator.
    pub frames: String,
    pub display: Display,
    /// Unset means the build's default engine, see [`EngineKind::resolve`].
    pub engine: Option<EngineKind>,
    /// Restart at end-of-stream.
    #[serde(rename = "loop")]
    pub loop_stream: bool,
    /// End the stream after this many frames.
    pub frame_limit: Option<u64>,
    /// Pipeline file replacing the standard topology.
    pub pipeline: Option<PathBuf>,
    /// Overlay title; empty disables it.
    pub title: String,
    pub top_k: usize,
    pub threshold: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: "/dev/video0".to_string(),
            resolution: "1280x720".to_string(),
            frames: "30".to_string(),
            display: Display::Window,
            engine: None,
            loop_stream: false,
            frame_limit: None,
            pipeline: None,
            title: DEFAULT_TITLE.to_string(),
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            StreamError::Configuration(format!("Invalid config {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults when the file does not exist; a malformed file is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn source(&self) -> Result<Source> {
        Source::from_args(&self.source, &self.resolution, &self.frames)
    }

    pub fn title(&self) -> Option<&str> {
        Some(self.title.as_str()).filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_command_line_defaults() {
        let config = RunConfig::default();
        let Source::Camera(format) = config.source().unwrap() else {
            panic!("default source is a camera");
        };
        assert_eq!(format.to_string(), "/dev/video0:YUY2:1280x720:30/1");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.title(), Some("Edge TPU Image Classifier"));
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "source: /dev/video2\nresolution: 640x480\nloop: true\nengine: gstreamer\ndisplay: headless\ntitle: ''"
        )
        .unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.source, "/dev/video2");
        assert_eq!(config.resolution, "640x480");
        assert!(config.loop_stream);
        assert_eq!(config.engine, Some(EngineKind::GStreamer));
        assert_eq!(config.display, Display::Headless);
        assert_eq!(config.title(), None);
        assert_eq!(config.frames, "30");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::load_or_default(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "sauce: /dev/video0\n").unwrap();
        assert!(matches!(
            RunConfig::load_or_default(&path),
            Err(StreamError::Configuration(_))
        ));
    }

    #[test]
    fn test_still_image_source() {
        let config = RunConfig {
            source: "cat.jpg".into(),
            resolution: "640x480".into(),
            ..Default::default()
        };
        assert!(matches!(config.source().unwrap(), Source::Image { .. }));
    }
}
