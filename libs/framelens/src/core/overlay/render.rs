// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use super::svg::SvgElement;
use crate::core::layout::{Layout, Rect};
use crate::core::runtime::Classification;

/// Font size as a fraction of the window height.
const FONT_SCALE: f64 = 0.03;
/// Vertical distance between stacked lines, in font sizes.
const LINE_PITCH: f64 = 1.7;
/// Average monospace glyph width, in font sizes.
const GLYPH_WIDTH_EM: f64 = 0.6;
/// Distance of the text block from the window edges, in pixels.
const MARGIN: f64 = 20.0;

const BACKING_STYLE: &str = ".back{fill:black;stroke:black;stroke-width:0.5em}";

/// Duration of one inference call. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct InferenceTiming {
    millis: f64,
}

impl InferenceTiming {
    /// `None` for zero, negative or non-finite times: no rate can be shown.
    pub fn from_millis(millis: f64) -> Option<Self> {
        (millis.is_finite() && millis > 0.0).then_some(Self { millis })
    }

    pub fn from_duration(duration: Duration) -> Option<Self> {
        Self::from_millis(duration.as_secs_f64() * 1000.0)
    }

    pub fn millis(&self) -> f64 {
        self.millis
    }

    pub fn fps(&self) -> f64 {
        1000.0 / self.millis
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Result,
    Title,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    End,
}

/// One positioned text line with its backing rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub kind: LineKind,
    pub text: String,
    pub x: f64,
    /// Baseline.
    pub y: f64,
    pub anchor: TextAnchor,
    /// Backing rectangle width in font sizes.
    pub backing_width_em: f64,
}

/// One complete overlay image. Never modified after rendering; replacing the
/// overlay means publishing a new document.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayDocument {
    window: Rect,
    font_size: f64,
    lines: Vec<OverlayLine>,
    svg: String,
}

impl OverlayDocument {
    pub fn window(&self) -> Rect {
        self.window
    }

    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn lines(&self) -> &[OverlayLine] {
        &self.lines
    }

    pub fn lines_of(&self, kind: LineKind) -> impl Iterator<Item = &OverlayLine> {
        self.lines.iter().filter(move |line| line.kind == kind)
    }

    /// Serialized SVG document.
    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.svg.as_bytes())
    }
}

impl fmt::Display for OverlayDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.svg)
    }
}

fn backing_width_em(text: &str) -> f64 {
    GLYPH_WIDTH_EM * text.chars().count() as f64
}

fn backing_rect(line: &OverlayLine) -> SvgElement {
    let flip = match line.anchor {
        TextAnchor::End => "scale(-1,-1)",
        TextAnchor::Start => "scale(1,-1)",
    };
    SvgElement::new("rect")
        .attr("x", 0)
        .attr("y", 0)
        .attr("width", format!("{}em", line.backing_width_em))
        .attr("height", "1em")
        .attr("transform", format!("translate({}, {}) {}", line.x, line.y, flip))
        .attr("class", "back")
}

fn text(line: &OverlayLine) -> SvgElement {
    let element = SvgElement::new("text");
    let element = match line.anchor {
        TextAnchor::End => element.attr("text-anchor", "end"),
        TextAnchor::Start => element,
    };
    element
        .attr("x", line.x)
        .attr("y", line.y)
        .attr("fill", "white")
        .text(line.text.clone())
}

/// Lay out and serialize the overlay for one inference result.
///
/// Results stack upward from the bottom-right corner, best first at the
/// bottom. The title sits at the top-left, the timing line at the
/// bottom-left. Every line gets a black backing rectangle sized from its
/// character count.
pub fn render_overlay(
    title: Option<&str>,
    results: &[Classification],
    timing: InferenceTiming,
    layout: &Layout,
) -> OverlayDocument {
    let window = layout.window;
    let (x0, y0) = (window.x as f64, window.y as f64);
    let (width, height) = (window.width as f64, window.height as f64);
    let font_size = FONT_SCALE * height;
    let pitch = LINE_PITCH * font_size;

    let (ox1, ox2) = (x0 + MARGIN, x0 + width - MARGIN);
    let (oy1, oy2) = (y0 + MARGIN + font_size, y0 + height - MARGIN);

    let mut lines = Vec::with_capacity(results.len() + 2);

    for (i, result) in results.iter().enumerate() {
        let text = format!("{} ({:.2})", result.label, result.score);
        lines.push(OverlayLine {
            kind: LineKind::Result,
            backing_width_em: backing_width_em(&text),
            text,
            x: ox2,
            y: oy2 - i as f64 * pitch,
            anchor: TextAnchor::End,
        });
    }

    if let Some(title) = title.filter(|t| !t.is_empty()) {
        lines.push(OverlayLine {
            kind: LineKind::Title,
            text: title.to_string(),
            x: ox1,
            y: oy1,
            anchor: TextAnchor::Start,
            backing_width_em: backing_width_em(title),
        });
    }

    let info = [format!(
        "Inference time: {:.2} ms ({:.2} fps)",
        timing.millis(),
        timing.fps()
    )];
    // Last info line at the bottom margin, earlier ones above it.
    for (i, text) in info.iter().rev().enumerate() {
        lines.push(OverlayLine {
            kind: LineKind::Info,
            backing_width_em: backing_width_em(text),
            text: text.clone(),
            x: ox1,
            y: oy2 - i as f64 * pitch,
            anchor: TextAnchor::Start,
        });
    }

    let mut svg = SvgElement::root()
        .attr("width", window.width)
        .attr("height", window.height)
        .attr("viewBox", window)
        .attr("font-size", font_size)
        .attr("font-family", "monospace")
        .attr("font-weight", 500)
        .child(SvgElement::new("defs").child(SvgElement::new("style").text(BACKING_STYLE)));
    for line in &lines {
        svg.push(backing_rect(line));
        svg.push(text(line));
    }

    OverlayDocument {
        window,
        font_size,
        lines,
        svg: svg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::Size;

    fn layout(width: u32, height: u32) -> Layout {
        Layout::new(Size::new(width, height), Size::new(224, 224)).unwrap()
    }

    fn results(pairs: &[(&str, f32)]) -> Vec<Classification> {
        pairs
            .iter()
            .map(|(label, score)| Classification::new(*label, *score))
            .collect()
    }

    #[test]
    fn test_results_stack_bottom_up() {
        let doc = render_overlay(
            Some("X"),
            &results(&[("cat", 0.91), ("dog", 0.33)]),
            InferenceTiming::from_millis(12.5).unwrap(),
            &layout(640, 480),
        );

        let font = 0.03 * 480.0;
        let oy2 = 480.0 - 20.0;
        assert_eq!(doc.font_size(), font);

        let lines: Vec<&OverlayLine> = doc.lines_of(LineKind::Result).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "cat (0.91)");
        assert_eq!(lines[1].text, "dog (0.33)");
        assert_eq!(lines[0].y, oy2);
        assert_eq!(lines[1].y, oy2 - 1.7 * font);
        assert!(lines[0].y > lines[1].y);
        assert_eq!(lines[0].x, 620.0);
        assert_eq!(lines[0].anchor, TextAnchor::End);

        let info: Vec<&OverlayLine> = doc.lines_of(LineKind::Info).collect();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].text, "Inference time: 12.50 ms (80.00 fps)");
        assert_eq!((info[0].x, info[0].y), (20.0, oy2));

        let title: Vec<&OverlayLine> = doc.lines_of(LineKind::Title).collect();
        assert_eq!(title.len(), 1);
        assert_eq!((title[0].x, title[0].y), (20.0, 20.0 + font));
    }

    #[test]
    fn test_backing_width_linear_in_length() {
        let doc = render_overlay(
            None,
            &results(&[("abc", 0.5), ("xyz", 0.4), ("abcdef", 0.3)]),
            InferenceTiming::from_millis(5.0).unwrap(),
            &layout(1280, 720),
        );
        let lines: Vec<&OverlayLine> = doc.lines_of(LineKind::Result).collect();
        assert_eq!(lines[0].backing_width_em, lines[1].backing_width_em);
        let per_char = lines[0].backing_width_em / lines[0].text.len() as f64;
        assert!((lines[2].backing_width_em - per_char * lines[2].text.len() as f64).abs() < 1e-9);
        assert!((per_char - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_svg_document_structure() {
        let doc = render_overlay(
            Some("Title"),
            &results(&[("cat", 0.91)]),
            InferenceTiming::from_millis(10.0).unwrap(),
            &layout(640, 480),
        );
        let svg = doc.svg();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"640\" height=\"480\" viewBox=\"0 0 640 480\""));
        assert!(svg.contains("font-family=\"monospace\""));
        assert_eq!(svg.matches("<style>").count(), 1);
        assert!(svg.contains(BACKING_STYLE));
        // One backing rect per line: result, title, info.
        assert_eq!(svg.matches("class=\"back\"").count(), 3);
        assert!(svg.contains("transform=\"translate(620, 460) scale(-1,-1)\""));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_empty_title_is_skipped() {
        let doc = render_overlay(
            Some(""),
            &results(&[("cat", 0.91)]),
            InferenceTiming::from_millis(10.0).unwrap(),
            &layout(640, 480),
        );
        assert_eq!(doc.lines_of(LineKind::Title).count(), 0);
    }

    #[test]
    fn test_labels_are_escaped() {
        let doc = render_overlay(
            None,
            &results(&[("<b>&co", 0.5)]),
            InferenceTiming::from_millis(10.0).unwrap(),
            &layout(640, 480),
        );
        assert!(doc.svg().contains("&lt;b&gt;&amp;co (0.50)"));
        assert!(!doc.svg().contains("<b>"));
    }

    #[test]
    fn test_timing_rejects_unusable_values() {
        assert!(InferenceTiming::from_millis(0.0).is_none());
        assert!(InferenceTiming::from_millis(-3.0).is_none());
        assert!(InferenceTiming::from_millis(f64::NAN).is_none());
        assert!(InferenceTiming::from_millis(f64::INFINITY).is_none());
        assert!(InferenceTiming::from_duration(Duration::ZERO).is_none());
        let timing = InferenceTiming::from_duration(Duration::from_millis(20)).unwrap();
        assert_eq!(timing.fps(), 50.0);
    }
}
