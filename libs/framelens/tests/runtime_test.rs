// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime lifecycle against the synthetic engine.
//!
//! Every test here runs a pipeline that polls the process-wide interrupt
//! flag, so they are serialized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serial_test::serial;

use framelens::core::signals;
use framelens::{
    assemble, pipelines, render_overlay, Control, Display, EngineKind, InferenceTiming, Layout,
    OverlayDocument, PipelineRuntime, RunOptions, RuntimeOptions, RuntimeState, Sample, Size,
    Source, StopReason, StreamError, SyntheticConfig, SyntheticEngine,
};

type FrameResult = anyhow::Result<Option<OverlayDocument>>;

fn camera(fps: u32) -> Source {
    Source::from_args("/dev/video0", "640x480", &fps.to_string()).unwrap()
}

fn layout() -> Layout {
    Layout::new(Size::new(640, 480), Size::new(224, 224)).unwrap()
}

fn display_runtime(config: SyntheticConfig, options: RuntimeOptions) -> PipelineRuntime {
    let Source::Camera(format) = camera(200) else {
        unreachable!()
    };
    let graph = assemble(&pipelines::camera_display_pipeline(&format, &layout()).unwrap()).unwrap();
    PipelineRuntime::build(graph, layout(), Box::new(SyntheticEngine::new(config)), options)
        .unwrap()
}

fn headless_options(frames: u64) -> RunOptions {
    RunOptions {
        display: Display::Headless,
        frame_limit: Some(frames),
        engine: EngineKind::Synthetic,
        synthetic: SyntheticConfig::default().unpaced(),
        ..RunOptions::new(camera(30))
    }
}

#[test]
#[serial]
fn test_single_shot_stops_at_end_of_stream() {
    signals::clear_interrupt();
    let calls = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&calls);

    let summary = framelens::run(
        Size::new(224, 224),
        move |_: &Sample, _: &Layout, _: &Control| -> FrameResult {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        },
        &headless_options(5),
    )
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.stats.captured, 5);
    assert_eq!(summary.frames_delivered, summary.stats.delivered);
    assert_eq!(summary.overlays_published, 0);

    let after_stop = calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), after_stop);
}

#[test]
#[serial]
fn test_loop_mode_rewinds_and_keeps_delivering() {
    signals::clear_interrupt();
    let options = RunOptions {
        loop_stream: true,
        ..headless_options(3)
    };
    let calls = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&calls);

    let summary = framelens::run(
        Size::new(224, 224),
        move |_: &Sample, _: &Layout, control: &Control| -> FrameResult {
            if seen.fetch_add(1, Ordering::SeqCst) + 1 >= 8 {
                control.request_stop();
            }
            Ok(None)
        },
        &options,
    )
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::StopRequested);
    assert!(calls.load(Ordering::SeqCst) >= 8);
    assert!(summary.stats.captured > 3);
}

#[test]
#[serial]
fn test_callback_error_stops_and_releases_engine() {
    signals::clear_interrupt();
    let mut runtime = display_runtime(SyntheticConfig::default(), RuntimeOptions::default());
    let calls = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&calls);

    runtime
        .start(move |_: &Sample, _: &Layout, _: &Control| -> FrameResult {
            if seen.fetch_add(1, Ordering::SeqCst) == 2 {
                anyhow::bail!("model crashed");
            }
            Ok(None)
        })
        .unwrap();
    assert_eq!(runtime.state(), RuntimeState::Running);

    let err = runtime.run_until_stopped().unwrap_err();
    match err {
        StreamError::Callback(e) => assert_eq!(e.to_string(), "model crashed"),
        other => panic!("expected callback error, got {:?}", other),
    }
    assert_eq!(runtime.state(), RuntimeState::Stopped);

    let captured = runtime.stats().captured;
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(runtime.stats().captured, captured);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
#[serial]
fn test_engine_fault_fails_runtime() {
    signals::clear_interrupt();
    let mut runtime = display_runtime(
        SyntheticConfig::default().unpaced().fail_after_frames(4),
        RuntimeOptions::default(),
    );
    let result = runtime.run(|_: &Sample, _: &Layout, _: &Control| -> FrameResult { Ok(None) });

    assert!(matches!(result, Err(StreamError::Engine(_))));
    assert_eq!(runtime.state(), RuntimeState::Failed);
    assert!(runtime.stop().is_ok());
    assert_eq!(runtime.state(), RuntimeState::Failed);
}

#[test]
#[serial]
fn test_slow_callback_drops_frames_but_not_display() {
    signals::clear_interrupt();
    let mut runtime = display_runtime(
        SyntheticConfig::default().frame_limit(30),
        RuntimeOptions::default(),
    );
    let summary = runtime
        .run(|_: &Sample, _: &Layout, _: &Control| -> FrameResult {
            std::thread::sleep(Duration::from_millis(20));
            Ok(None)
        })
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.stats.captured, 30);
    assert_eq!(summary.stats.displayed, 30);
    assert!(summary.stats.dropped > 0);
    assert!(summary.stats.max_queue_depth <= 1);
    assert_eq!(summary.stats.delivered + summary.stats.dropped, 30);
}

#[test]
#[serial]
fn test_overlay_kept_when_callback_returns_none() {
    signals::clear_interrupt();
    let mut runtime = display_runtime(
        SyntheticConfig::default().frame_limit(20),
        RuntimeOptions::default(),
    );
    let rendered = Arc::new(Mutex::new(None));
    let first = Arc::clone(&rendered);

    let summary = runtime
        .run(move |_: &Sample, layout: &Layout, _: &Control| -> FrameResult {
            let mut first = first.lock();
            if first.is_some() {
                return Ok(None);
            }
            let timing = InferenceTiming::from_millis(12.5).unwrap();
            let document = render_overlay(Some("first"), &[], timing, layout);
            *first = Some(document.clone());
            Ok(Some(document))
        })
        .unwrap();

    assert_eq!(summary.overlays_published, 1);
    let current = runtime.current_overlay().unwrap();
    assert_eq!(Some(current.as_ref()), rendered.lock().as_ref());
    assert!(summary.stats.overlaid > 0);
}

#[test]
#[serial]
fn test_interrupt_stops_looping_run() {
    signals::request_interrupt();
    let options = RunOptions {
        loop_stream: true,
        ..headless_options(3)
    };
    let summary = framelens::run(
        Size::new(224, 224),
        |_: &Sample, _: &Layout, _: &Control| -> FrameResult { Ok(None) },
        &options,
    );
    signals::clear_interrupt();

    assert_eq!(summary.unwrap().stop_reason, StopReason::Interrupted);
}

#[test]
#[serial]
fn test_pipeline_file_run() {
    signals::clear_interrupt();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(
        &path,
        r#"
fragments:
  - - stage: { kind: videotest, role: source }
    - caps: { media_type: video/x-raw, constraints: { format: RGB, width: "${inference.width}", height: "${inference.height}" } }
    - stage: { kind: app, role: sink, name: appsink }
"#,
    )
    .unwrap();

    let options = RunOptions {
        pipeline: Some(path),
        ..headless_options(4)
    };
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&sizes);
    let summary = framelens::run(
        Size::new(224, 224),
        move |sample: &Sample, _: &Layout, _: &Control| -> FrameResult {
            seen.lock().push(sample.size);
            Ok(None)
        },
        &options,
    )
    .unwrap();

    assert_eq!(summary.frames_delivered, 4);
    assert!(sizes.lock().iter().all(|s| *s == Size::new(224, 224)));
}
