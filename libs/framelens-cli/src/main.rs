// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! framelens-classify
//!
//! Classifies live camera frames and draws the top results over the video.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use framelens::core::config::DEFAULT_CONFIG_FILE;
use framelens::core::signals;
use framelens::{ClassificationCallback, Classifier, Display, EngineKind, RunConfig, RunOptions};

mod classifier;
mod labels;

#[derive(Parser, Debug)]
#[command(name = "framelens-classify")]
#[command(author, version, about = "Live camera image classifier", long_about = None)]
struct Cli {
    /// Camera device (e.g. /dev/video0) or still image
    #[arg(long)]
    source: Option<String>,

    /// Camera capture resolution
    #[arg(long)]
    resolution: Option<String>,

    /// Camera capture frame rate
    #[arg(long)]
    frames: Option<String>,

    /// Model file path
    #[arg(long)]
    model: PathBuf,

    /// Label file path
    #[arg(long)]
    labels: PathBuf,

    /// Run configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Execution engine (synthetic or gstreamer)
    #[arg(long)]
    engine: Option<EngineKind>,

    /// Run inference without a display window
    #[arg(long)]
    headless: bool,

    /// Restart the stream at end-of-stream
    #[arg(long = "loop")]
    loop_stream: bool,

    /// Number of results shown
    #[arg(long)]
    top_k: Option<usize>,

    /// Minimum score of a shown result
    #[arg(long)]
    threshold: Option<f32>,

    /// Pipeline file replacing the standard topology
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Stop after this many captured frames
    #[arg(long)]
    frame_limit: Option<u64>,

    /// Print the gst-launch description of the pipeline and exit
    #[arg(long)]
    print_pipeline: bool,
}

impl Cli {
    /// Command line flags over the configuration file.
    fn merge(&self, mut config: RunConfig) -> RunConfig {
        if let Some(source) = self.source.clone() {
            config.source = source;
        }
        if let Some(resolution) = self.resolution.clone() {
            config.resolution = resolution;
        }
        if let Some(frames) = self.frames.clone() {
            config.frames = frames;
        }
        if let Some(engine) = self.engine {
            config.engine = Some(engine);
        }
        if self.headless {
            config.display = Display::Headless;
        }
        if self.loop_stream {
            config.loop_stream = true;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(pipeline) = self.pipeline.clone() {
            config.pipeline = Some(pipeline);
        }
        if let Some(frames) = self.frame_limit {
            config.frame_limit = Some(frames);
        }
        config
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = RunConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let config = cli.merge(config);

    let source = config.source().context("Invalid capture source")?;
    let labels = labels::load_labels(&cli.labels)?;
    let classifier = classifier::open_classifier(&cli.model)?;
    let inference_size = classifier.input_size();

    let mut options = RunOptions {
        display: config.display,
        loop_stream: config.loop_stream,
        frame_limit: config.frame_limit,
        pipeline: config.pipeline.clone(),
        ..RunOptions::new(source)
    };

    if cli.print_pipeline {
        let layout = options.layout(inference_size)?;
        let graph = options.graph(&layout).context("Failed to assemble pipeline")?;
        println!("{}", graph.to_launch_description());
        return Ok(());
    }

    options.engine = EngineKind::resolve(config.engine, &options.source)?;
    signals::install_signal_handlers().context("Failed to install signal handlers")?;

    let callback = ClassificationCallback::new(classifier, labels)
        .title(config.title().map(str::to_string))
        .top_k(config.top_k)
        .threshold(config.threshold);

    let summary = framelens::run(inference_size, callback, &options)?;
    tracing::info!(
        "Stopped ({:?}) after {:.1}s: {} frames classified, {} overlays, {} captured, {} dropped",
        summary.stop_reason,
        summary.elapsed.as_secs_f64(),
        summary.frames_delivered,
        summary.overlays_published,
        summary.stats.captured,
        summary.stats.dropped
    );
    Ok(())
}
