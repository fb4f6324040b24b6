// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame geometry shared by the pipeline builders and the overlay renderer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::GraphBuildError;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Aspect ratio as width / height.
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = GraphBuildError;

    /// Parse `"WIDTHxHEIGHT"`, e.g. `"1280x720"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| GraphBuildError::InvalidGeometry(format!("'{}' is not WIDTHxHEIGHT", s)))?;
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|e| {
                GraphBuildError::InvalidGeometry(format!("'{}' in '{}': {}", part, s, e))
            })
        };
        Ok(Size::new(parse(w)?, parse(h)?))
    }
}

/// Axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl fmt::Display for Rect {
    /// Space separated, the form used by an SVG `viewBox`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.width, self.height)
    }
}

/// Largest size with the aspect ratio of `shape` that fits inside `bounds`.
///
/// The binding dimension equals the bound exactly; the other one is floored,
/// so the result never exceeds `bounds` in either direction. Integer math only,
/// so there is no rounding drift for common sizes.
///
/// ```
/// use framelens::core::layout::{max_inner_size, Size};
///
/// let size = max_inner_size(Size::new(1280, 720), Size::new(224, 224)).unwrap();
/// assert_eq!(size, Size::new(720, 720));
/// ```
pub fn max_inner_size(bounds: Size, shape: Size) -> std::result::Result<Size, GraphBuildError> {
    if bounds.is_empty() || shape.is_empty() {
        return Err(GraphBuildError::InvalidGeometry(format!(
            "cannot fit {} inside {}",
            shape, bounds
        )));
    }

    let (bw, bh) = (bounds.width as u64, bounds.height as u64);
    let (sw, sh) = (shape.width as u64, shape.height as u64);

    // Width binds when bw/sw <= bh/sh.
    let size = if bw * sh <= bh * sw {
        Size::new(bounds.width, (bw * sh / sw) as u32)
    } else {
        Size::new((bh * sw / sh) as u32, bounds.height)
    };

    if size.is_empty() {
        return Err(GraphBuildError::InvalidGeometry(format!(
            "{} collapses to {} inside {}",
            shape, size, bounds
        )));
    }
    Ok(size)
}

/// Geometry of one run. Computed once from the negotiated capture size and the
/// model's input size, immutable afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Size the display branch renders at (the capture size).
    pub render_size: Size,
    /// Size the inference branch delivers to the callback.
    pub inference_size: Size,
    /// Visible canvas the overlay is positioned in.
    pub window: Rect,
}

impl Layout {
    /// Layout whose window covers the whole render canvas.
    pub fn new(render_size: Size, inference_size: Size) -> std::result::Result<Self, GraphBuildError> {
        if render_size.is_empty() || inference_size.is_empty() {
            return Err(GraphBuildError::InvalidGeometry(format!(
                "render size {} / inference size {}",
                render_size, inference_size
            )));
        }
        Ok(Self {
            render_size,
            inference_size,
            window: Rect::new(0, 0, render_size.width, render_size.height),
        })
    }

    /// Size the capture is scaled to before the inference crop: the render
    /// aspect ratio fitted inside the inference input, so the crop pads rather
    /// than stretches.
    pub fn scaled_inference_size(&self) -> std::result::Result<Size, GraphBuildError> {
        max_inner_size(self.inference_size, self.render_size)
    }

    /// Named values pipeline descriptions may reference as `${name}`.
    pub fn bindings(&self) -> std::result::Result<Vec<(String, i64)>, GraphBuildError> {
        let scaled = self.scaled_inference_size()?;
        Ok(vec![
            ("render.width".into(), self.render_size.width as i64),
            ("render.height".into(), self.render_size.height as i64),
            ("inference.width".into(), self.inference_size.width as i64),
            ("inference.height".into(), self.inference_size.height as i64),
            ("scaled.width".into(), scaled.width as i64),
            ("scaled.height".into(), scaled.height as i64),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_max_inner(bounds: Size, shape: Size) {
        let size = max_inner_size(bounds, shape).unwrap();

        assert!(size.width <= bounds.width, "{} wider than {}", size, bounds);
        assert!(size.height <= bounds.height, "{} taller than {}", size, bounds);

        // The floored dimension is within one pixel of the exact aspect ratio.
        let exact_h = size.width as f64 / shape.aspect();
        let exact_w = size.height as f64 * shape.aspect();
        assert!(
            (size.height as f64 - exact_h).abs() < 1.0 || (size.width as f64 - exact_w).abs() < 1.0,
            "{} vs {}",
            size,
            shape
        );

        // One dimension is pinned to the bound, so nothing larger fits.
        assert!(size.width == bounds.width || size.height == bounds.height);
    }

    #[test]
    fn test_square_model_inside_landscape_camera() {
        assert_eq!(
            max_inner_size(Size::new(1280, 720), Size::new(224, 224)).unwrap(),
            Size::new(720, 720)
        );
    }

    #[test]
    fn test_landscape_camera_inside_square_model() {
        assert_eq!(
            max_inner_size(Size::new(224, 224), Size::new(1280, 720)).unwrap(),
            Size::new(224, 126)
        );
    }

    #[test]
    fn test_same_aspect_returns_bounds() {
        assert_eq!(
            max_inner_size(Size::new(640, 480), Size::new(320, 240)).unwrap(),
            Size::new(640, 480)
        );
    }

    #[test]
    fn test_containment_and_aspect_over_grid() {
        let sizes = [1u32, 3, 16, 9, 224, 300, 480, 640, 720, 1080, 1280, 1920, 4095];
        for &bw in &sizes {
            for &bh in &sizes {
                for &sw in &sizes {
                    for &sh in &sizes {
                        let bounds = Size::new(bw, bh);
                        let shape = Size::new(sw, sh);
                        match max_inner_size(bounds, shape) {
                            Ok(_) => assert_max_inner(bounds, shape),
                            // Only extreme ratios collapse below one pixel.
                            Err(GraphBuildError::InvalidGeometry(_)) => {
                                let fits_w = bw as u64 * sh as u64 / sw as u64;
                                let fits_h = bh as u64 * sw as u64 / sh as u64;
                                assert!(fits_w == 0 || fits_h == 0);
                            }
                            Err(e) => panic!("unexpected error {e}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        for (bounds, shape) in [
            (Size::new(0, 720), Size::new(224, 224)),
            (Size::new(1280, 0), Size::new(224, 224)),
            (Size::new(1280, 720), Size::new(0, 224)),
            (Size::new(1280, 720), Size::new(224, 0)),
        ] {
            assert!(matches!(
                max_inner_size(bounds, shape),
                Err(GraphBuildError::InvalidGeometry(_))
            ));
        }
    }

    #[test]
    fn test_size_parse() {
        assert_eq!("1280x720".parse::<Size>().unwrap(), Size::new(1280, 720));
        assert_eq!("640X480".parse::<Size>().unwrap(), Size::new(640, 480));
        assert!("1280".parse::<Size>().is_err());
        assert!("axb".parse::<Size>().is_err());
    }

    #[test]
    fn test_layout_window_covers_render_size() {
        let layout = Layout::new(Size::new(1280, 720), Size::new(224, 224)).unwrap();
        assert_eq!(layout.window, Rect::new(0, 0, 1280, 720));
        assert_eq!(layout.window.to_string(), "0 0 1280 720");
        assert_eq!(layout.scaled_inference_size().unwrap(), Size::new(224, 126));
    }

    #[test]
    fn test_layout_rejects_empty_sizes() {
        assert!(Layout::new(Size::new(0, 720), Size::new(224, 224)).is_err());
        assert!(Layout::new(Size::new(1280, 720), Size::new(224, 0)).is_err());
    }
}
