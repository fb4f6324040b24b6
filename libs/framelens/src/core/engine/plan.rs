// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Duration;

use crate::core::error::{Result, StreamError};
use crate::core::graph::{Graph, NodeId, QueueSpec, Value};
use crate::core::layout::Size;

/// Element names an engine wires to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Sink whose buffers go to the sample handler.
    pub inference_sink: String,
    /// Source that receives overlay documents, when the topology has one.
    pub overlay_source: Option<String>,
}

/// What an engine needs to know about the inference branch.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPlan {
    pub source: NodeId,
    pub sink: NodeId,
    /// Source to inference sink, both included.
    pub path: Vec<NodeId>,
    /// First queue on the path; `None` means the sink runs on the source's thread.
    pub queue: Option<QueueSpec>,
    /// Size and pixel format of delivered samples.
    pub sample_size: Option<Size>,
    pub sample_format: String,
    /// Capture interval from the first frame rate constraint on the path.
    pub frame_interval: Option<Duration>,
    /// `num_buffers` on the source: frames until end-of-stream.
    pub frame_limit: Option<u64>,
    /// Sinks other than the inference sink fed by the same source.
    pub display_sinks: Vec<NodeId>,
    pub overlay_source: Option<NodeId>,
}

impl BranchPlan {
    pub fn resolve(graph: &Graph, endpoints: &Endpoints) -> Result<Self> {
        let sink = graph.find(&endpoints.inference_sink).ok_or_else(|| {
            StreamError::Configuration(format!(
                "Inference sink '{}' not found in graph",
                endpoints.inference_sink
            ))
        })?;
        if !sink.is_sink() {
            return Err(StreamError::Configuration(format!(
                "'{}' is not a sink",
                endpoints.inference_sink
            )));
        }

        let (source, path) = graph.source_of(sink.id).ok_or_else(|| {
            StreamError::Configuration(format!("No source feeds '{}'", endpoints.inference_sink))
        })?;

        let queue = path.iter().find_map(|id| graph.node(*id).queue().copied());

        let mut sample_size = None;
        let mut sample_format = None;
        for id in path.iter().rev() {
            if let Some(caps) = graph.node(*id).caps() {
                sample_size = sample_size.or_else(|| caps.size());
                sample_format = sample_format.or_else(|| caps.format().map(str::to_string));
            }
        }

        let frame_interval = path
            .iter()
            .filter_map(|id| graph.node(*id).caps()?.framerate())
            .find(|(num, den)| *num > 0 && *den > 0)
            .map(|(num, den)| {
                Duration::from_nanos(den as u64 * 1_000_000_000 / num as u64)
            });

        let frame_limit = source
            .stage()
            .and_then(|stage| stage.options.get("num_buffers"))
            .and_then(Value::as_i64)
            .filter(|n| *n >= 0)
            .map(|n| n as u64);

        let display_sinks = graph
            .sinks()
            .filter(|node| node.id != sink.id && graph.path(source.id, node.id).is_some())
            .map(|node| node.id)
            .collect();

        let overlay_source = match &endpoints.overlay_source {
            Some(name) => graph.find(name).map(|node| node.id),
            None => None,
        };

        Ok(Self {
            source: source.id,
            sink: sink.id,
            path,
            queue,
            sample_size,
            sample_format: sample_format.unwrap_or_else(|| "RGB".to_string()),
            frame_interval,
            frame_limit,
            display_sinks,
            overlay_source,
        })
    }

    /// Bytes per pixel of the delivered format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self.sample_format.as_str() {
            "RGBA" | "BGRA" | "RGBx" | "BGRx" | "ARGB" | "ABGR" => 4,
            "GRAY8" => 1,
            "YUY2" | "UYVY" => 2,
            _ => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::assemble;
    use crate::core::layout::Layout;
    use crate::core::pipelines::{self, INFERENCE_SINK, OVERLAY_SOURCE};

    fn endpoints() -> Endpoints {
        Endpoints {
            inference_sink: INFERENCE_SINK.into(),
            overlay_source: Some(OVERLAY_SOURCE.into()),
        }
    }

    #[test]
    fn test_display_topology_plan() {
        let format = "/dev/video0:YUY2:1280x720:30/1".parse().unwrap();
        let layout = Layout::new(Size::new(1280, 720), Size::new(224, 224)).unwrap();
        let graph = assemble(&pipelines::camera_display_pipeline(&format, &layout).unwrap()).unwrap();

        let plan = BranchPlan::resolve(&graph, &endpoints()).unwrap();
        assert_eq!(plan.queue, Some(QueueSpec::leaky(1)));
        assert_eq!(plan.sample_size, Some(Size::new(224, 224)));
        assert_eq!(plan.sample_format, "RGB");
        assert_eq!(plan.bytes_per_pixel(), 3);
        assert_eq!(plan.frame_interval, Some(Duration::from_nanos(33_333_333)));
        assert_eq!(plan.frame_limit, None);
        assert_eq!(plan.display_sinks.len(), 1);
        assert!(plan.overlay_source.is_some());
    }

    #[test]
    fn test_missing_sink_is_configuration_error() {
        let format = "/dev/video0:YUY2:640x480:30/1".parse().unwrap();
        let layout = Layout::new(Size::new(640, 480), Size::new(224, 224)).unwrap();
        let graph = assemble(&pipelines::camera_headless_pipeline(&format, &layout).unwrap()).unwrap();

        let endpoints = Endpoints {
            inference_sink: "nope".into(),
            overlay_source: None,
        };
        assert!(matches!(
            BranchPlan::resolve(&graph, &endpoints),
            Err(StreamError::Configuration(_))
        ));
        let plan = BranchPlan::resolve(&graph, &self::endpoints()).unwrap();
        assert_eq!(plan.queue, None);
        assert!(plan.display_sinks.is_empty());
        assert_eq!(plan.overlay_source, None);
    }
}
