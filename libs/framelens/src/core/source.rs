// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Input source descriptions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, StreamError};
use crate::core::graph::CapabilityFilter;
use crate::core::layout::Size;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Camera capture request in `device:PIXEL:WxH:N/D` form, for example
/// `/dev/video0:YUY2:1280x720:30/1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub device: String,
    pub pixel: String,
    pub size: Size,
    pub framerate: (u32, u32),
}

impl CaptureFormat {
    /// Build the capture string the command line uses and parse it.
    pub fn from_parts(device: &str, resolution: &str, frames: &str) -> Result<Self> {
        format!("{}:YUY2:{}:{}/1", device, resolution, frames).parse()
    }

    /// Raw-video capability filter matching this format.
    pub fn caps(&self) -> CapabilityFilter {
        let (num, den) = self.framerate;
        CapabilityFilter::raw_video(Some(&self.pixel), self.size)
            .constraint("framerate", (num as i32, den as i32))
    }

    /// Frame interval, `None` for a zero frame rate.
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        let (num, den) = self.framerate;
        if num == 0 {
            return None;
        }
        Some(std::time::Duration::from_nanos(
            den as u64 * 1_000_000_000 / num as u64,
        ))
    }
}

impl FromStr for CaptureFormat {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| {
            StreamError::Configuration(format!(
                "Invalid capture format '{}' ({}), expected device:PIXEL:WxH:N/D",
                s, why
            ))
        };

        // Split from the right so device paths may contain ':'.
        let mut parts = s.rsplitn(4, ':');
        let framerate = parts.next().ok_or_else(|| invalid("missing frame rate"))?;
        let size = parts.next().ok_or_else(|| invalid("missing size"))?;
        let pixel = parts.next().ok_or_else(|| invalid("missing pixel format"))?;
        let device = parts.next().ok_or_else(|| invalid("missing device"))?;

        if device.is_empty() {
            return Err(invalid("empty device"));
        }
        if pixel.is_empty() || !pixel.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("bad pixel format"));
        }

        let size: Size = size.parse().map_err(|_| invalid("bad size"))?;
        if size.is_empty() {
            return Err(invalid("empty size"));
        }

        let (num, den) = framerate
            .split_once('/')
            .ok_or_else(|| invalid("frame rate is not N/D"))?;
        let num: u32 = num.parse().map_err(|_| invalid("bad frame rate"))?;
        let den: u32 = den.parse().map_err(|_| invalid("bad frame rate"))?;
        if num == 0 || den == 0 {
            return Err(invalid("zero frame rate"));
        }

        Ok(Self {
            device: device.to_string(),
            pixel: pixel.to_string(),
            size,
            framerate: (num, den),
        })
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}/{}",
            self.device, self.pixel, self.size, self.framerate.0, self.framerate.1
        )
    }
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Camera(CaptureFormat),
    /// Single still image, decoded and repeated; `size` is the canvas the
    /// overlay is laid out on.
    Image { path: PathBuf, size: Size },
}

impl Source {
    /// Image files by extension, everything else as a camera device.
    pub fn from_args(source: &str, resolution: &str, frames: &str) -> Result<Self> {
        if is_image_path(Path::new(source)) {
            let size = resolution
                .parse::<Size>()
                .map_err(|e| StreamError::Configuration(e.to_string()))?;
            return Ok(Source::Image {
                path: PathBuf::from(source),
                size,
            });
        }
        CaptureFormat::from_parts(source, resolution, frames).map(Source::Camera)
    }

    /// Render canvas size.
    pub fn size(&self) -> Size {
        match self {
            Source::Camera(format) => format.size,
            Source::Image { size, .. } => *size,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Camera(format) => write!(f, "{}", format),
            Source::Image { path, size } => write!(f, "{} ({})", path.display(), size),
        }
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture_format() {
        let format: CaptureFormat = "/dev/video0:YUY2:1280x720:30/1".parse().unwrap();
        assert_eq!(format.device, "/dev/video0");
        assert_eq!(format.pixel, "YUY2");
        assert_eq!(format.size, Size::new(1280, 720));
        assert_eq!(format.framerate, (30, 1));
        assert_eq!(format.to_string(), "/dev/video0:YUY2:1280x720:30/1");
    }

    #[test]
    fn test_device_may_contain_colons() {
        let format: CaptureFormat = "usb:cam:0:MJPG:640x480:15/2".parse().unwrap();
        assert_eq!(format.device, "usb:cam:0");
        assert_eq!(format.framerate, (15, 2));
    }

    #[test]
    fn test_from_parts_uses_yuy2() {
        let format = CaptureFormat::from_parts("/dev/video2", "640x480", "15").unwrap();
        assert_eq!(format.to_string(), "/dev/video2:YUY2:640x480:15/1");
    }

    #[test]
    fn test_malformed_formats_rejected() {
        for bad in [
            "",
            "/dev/video0",
            "/dev/video0:YUY2:1280x720",
            ":YUY2:1280x720:30/1",
            "/dev/video0::1280x720:30/1",
            "/dev/video0:YUY2:1280:30/1",
            "/dev/video0:YUY2:0x720:30/1",
            "/dev/video0:YUY2:1280x720:30",
            "/dev/video0:YUY2:1280x720:0/1",
            "/dev/video0:YUY2:1280x720:30/0",
        ] {
            assert!(
                matches!(bad.parse::<CaptureFormat>(), Err(StreamError::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_caps_and_interval() {
        let format: CaptureFormat = "/dev/video0:YUY2:640x480:25/1".parse().unwrap();
        assert_eq!(
            format.caps().to_string(),
            "video/x-raw,format=YUY2,framerate=25/1,height=480,width=640"
        );
        assert_eq!(format.frame_interval(), Some(std::time::Duration::from_millis(40)));
    }

    #[test]
    fn test_source_from_args() {
        let image = Source::from_args("cat.JPG", "640x480", "30").unwrap();
        assert!(matches!(image, Source::Image { .. }));
        assert_eq!(image.size(), Size::new(640, 480));

        let camera = Source::from_args("/dev/video0", "1280x720", "30").unwrap();
        assert_eq!(camera.size(), Size::new(1280, 720));
        assert!(Source::from_args("/dev/video0", "big", "30").is_err());
    }
}
