// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Standard topologies.
//!
//! The display topology splits the capture at a tee: one branch goes straight
//! to the mixer, the other goes through a single-slot leaky queue into the
//! inference chain, so a slow callback only costs inference frames. The
//! overlay source is the second mixer input and therefore drawn on top of the
//! video.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::GraphBuildError;
use crate::core::graph::{CapabilityFilter, Element, Fragment, QueueSpec, Stage, StageRole};
use crate::core::layout::Layout;
use crate::core::source::{CaptureFormat, Source};

/// Name of the sink that hands frames to the frame callback.
pub const INFERENCE_SINK: &str = "appsink";
/// Name of the display sink.
pub const DISPLAY_SINK: &str = "glsink";
/// Name of the compositor that merges video and overlay.
pub const MIXER: &str = "mixer";
/// Name of the source that overlay documents are pushed into.
pub const OVERLAY_SOURCE: &str = "overlay";
/// Name of the tee splitting the capture.
pub const CAPTURE_TEE: &str = "t";

/// Media type of pushed overlay documents.
pub const OVERLAY_MEDIA_TYPE: &str = "image/svg+xml";

/// Output mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Display {
    /// Video with overlay in a window.
    #[default]
    Window,
    /// Inference only, nothing rendered.
    Headless,
}

pub fn v4l2_src(format: &CaptureFormat) -> Vec<Element> {
    vec![
        Stage::source("v4l2").option("device", format.device.as_str()).into(),
        format.caps().into(),
    ]
}

pub fn display_sink(sync: bool, qos: bool) -> Stage {
    Stage::sink("glimage")
        .named(DISPLAY_SINK)
        .option("sync", sync)
        .option("qos", qos)
}

fn inference_sink() -> Stage {
    Stage::sink("app")
        .named(INFERENCE_SINK)
        .option("emit_signals", true)
        .option("max_buffers", 1)
        .option("drop", true)
        .option("sync", false)
}

/// Scale, convert to RGB, pad to the model's input size, hand to the
/// inference sink. The still-image form repeats the one decoded frame.
pub fn inference_pipeline(layout: &Layout, still_image: bool) -> Result<Vec<Element>, GraphBuildError> {
    let scaled = layout.scaled_inference_size()?;
    let cropped = CapabilityFilter::raw_video(None, layout.inference_size);

    if still_image {
        return Ok(vec![
            Stage::filter("videoconvert").into(),
            Stage::filter("videoscale").into(),
            CapabilityFilter::raw_video(Some("RGB"), scaled).into(),
            Stage::filter("videobox").option("autocrop", true).into(),
            cropped.into(),
            Stage::filter("imagefreeze").into(),
            inference_sink().into(),
        ]);
    }

    Ok(vec![
        Stage::filter("glfilterbin").option("filter", "glcolorscale").into(),
        CapabilityFilter::raw_video(Some("RGBA"), scaled).into(),
        Stage::filter("videoconvert").into(),
        CapabilityFilter::raw_video(Some("RGB"), scaled).into(),
        Stage::filter("videobox").option("autocrop", true).into(),
        cropped.into(),
        inference_sink().into(),
    ])
}

/// SVG documents pushed at run time, rasterized at the render size.
pub fn overlay_source(layout: &Layout) -> Vec<Element> {
    vec![
        Stage::source("app")
            .named(OVERLAY_SOURCE)
            .option("caps", OVERLAY_MEDIA_TYPE)
            .option("is_live", true)
            .option("do_timestamp", true)
            .option("format", "time")
            .into(),
        Stage::filter("rsvgdec").into(),
        Stage::filter("videoconvert").into(),
        CapabilityFilter::raw_video(Some("BGRA"), layout.render_size).into(),
        Stage::filter("glupload").into(),
        QueueSpec::bounded(1).into(),
    ]
}

pub fn camera_display_pipeline(format: &CaptureFormat, layout: &Layout) -> Result<Vec<Fragment>, GraphBuildError> {
    Ok(vec![
        Fragment::new()
            .then(
                Stage::filter("glvideomixer")
                    .named(MIXER)
                    .option("background", "black"),
            )
            .then(display_sink(false, false)),
        Fragment::new()
            .then(v4l2_src(format))
            .then(Stage::filter("glupload"))
            .then(Stage::tee(CAPTURE_TEE)),
        Fragment::from_ref(CAPTURE_TEE)
            .then(Stage::filter("glupload"))
            .then(QueueSpec::unbounded())
            .to_ref(MIXER),
        Fragment::new().then(overlay_source(layout)).to_ref(MIXER),
        Fragment::from_ref(CAPTURE_TEE)
            .then(QueueSpec::leaky(1))
            .then(inference_pipeline(layout, false)?),
    ])
}

pub fn camera_headless_pipeline(format: &CaptureFormat, layout: &Layout) -> Result<Vec<Fragment>, GraphBuildError> {
    Ok(vec![Fragment::new()
        .then(v4l2_src(format))
        .then(Stage::filter("glupload"))
        .then(inference_pipeline(layout, false)?)])
}

/// Decode one image file and feed it to the still-image inference chain.
pub fn image_headless_pipeline(path: &Path, layout: &Layout) -> Result<Vec<Fragment>, GraphBuildError> {
    Ok(vec![Fragment::new()
        .then(Stage::source("file").option("location", path.to_string_lossy().into_owned()))
        .then(Stage::filter("decodebin"))
        .then(inference_pipeline(layout, true)?)])
}

/// End the stream after `frames` captured frames by setting `num_buffers` on
/// every capture source. The overlay source is left alone.
pub fn limit_frames(fragments: &mut [Fragment], frames: u64) {
    let frames = i64::try_from(frames).unwrap_or(i64::MAX);
    for fragment in fragments {
        for stage in fragment.stages_mut() {
            if stage.role == StageRole::Source && stage.name.as_deref() != Some(OVERLAY_SOURCE) {
                stage.options.insert("num_buffers".to_string(), frames.into());
            }
        }
    }
}

/// Topology for a source and display mode. Images are always headless.
pub fn topology(source: &Source, layout: &Layout, display: Display) -> Result<Vec<Fragment>, GraphBuildError> {
    match (source, display) {
        (Source::Camera(format), Display::Window) => camera_display_pipeline(format, layout),
        (Source::Camera(format), Display::Headless) => camera_headless_pipeline(format, layout),
        (Source::Image { path, .. }, _) => image_headless_pipeline(path, layout),
    }
}
