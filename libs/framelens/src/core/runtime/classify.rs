// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::callback::{Control, FrameCallback};
use crate::core::engine::Sample;
use crate::core::layout::{Layout, Size};
use crate::core::overlay::{InferenceTiming, OverlayDocument, render_overlay};

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_THRESHOLD: f32 = 0.1;
pub const DEFAULT_TITLE: &str = "Edge TPU Image Classifier";

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Class index to label name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
    names: BTreeMap<usize, String>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, name: impl Into<String>) {
        self.names.insert(index, name.into());
    }

    /// Label for `index`; unknown indices fall back to the number itself.
    pub fn name(&self, index: usize) -> String {
        self.names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(usize, S)> for Labels {
    fn from_iter<I: IntoIterator<Item = (usize, S)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|(i, s)| (i, s.into())).collect(),
        }
    }
}

/// Inference collaborator.
pub trait Classifier: Send {
    /// Input tensor size; the inference branch should be scaled to it.
    fn input_size(&self) -> Size;

    /// Raw `(class index, score)` pairs for one frame, in any order.
    fn classify(&mut self, sample: &Sample) -> anyhow::Result<Vec<(usize, f32)>>;

    /// Wall time of the most recent `classify` call.
    fn last_inference_time(&self) -> Option<Duration>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn input_size(&self) -> Size {
        (**self).input_size()
    }

    fn classify(&mut self, sample: &Sample) -> anyhow::Result<Vec<(usize, f32)>> {
        (**self).classify(sample)
    }

    fn last_inference_time(&self) -> Option<Duration> {
        (**self).last_inference_time()
    }
}

/// Descending by score, at most `top_k`, nothing below `threshold`.
pub fn rank(
    scores: &[(usize, f32)],
    labels: &Labels,
    top_k: usize,
    threshold: f32,
) -> Vec<Classification> {
    let mut kept: Vec<(usize, f32)> = scores
        .iter()
        .copied()
        .filter(|(_, score)| score.is_finite() && *score >= threshold)
        .collect();
    kept.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    kept.truncate(top_k);
    kept.into_iter()
        .map(|(index, score)| Classification::new(labels.name(index), score))
        .collect()
}

/// Frame callback that classifies each sample and renders the result overlay.
///
/// No overlay is rendered for frames without any result above the threshold
/// or without a usable inference time; the previous overlay stays up.
pub struct ClassificationCallback<C> {
    classifier: C,
    labels: Labels,
    title: Option<String>,
    top_k: usize,
    threshold: f32,
}

impl<C: Classifier> ClassificationCallback<C> {
    pub fn new(classifier: C, labels: Labels) -> Self {
        Self {
            classifier,
            labels,
            title: Some(DEFAULT_TITLE.to_string()),
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}

impl<C: Classifier + 'static> FrameCallback for ClassificationCallback<C> {
    fn on_frame(
        &mut self,
        sample: &Sample,
        layout: &Layout,
        _control: &Control,
    ) -> anyhow::Result<Option<OverlayDocument>> {
        let scores = self.classifier.classify(sample)?;
        let results = rank(&scores, &self.labels, self.top_k, self.threshold);
        let timing = self
            .classifier
            .last_inference_time()
            .and_then(InferenceTiming::from_duration);

        let Some(timing) = timing else {
            tracing::trace!("Frame {}: no inference time, overlay kept", sample.sequence);
            return Ok(None);
        };
        if results.is_empty() {
            tracing::trace!("Frame {}: no results above threshold", sample.sequence);
            return Ok(None);
        }

        tracing::trace!(
            "Frame {}: top result {} ({:.2}) in {:.2} ms",
            sample.sequence,
            results[0].label,
            results[0].score,
            timing.millis()
        );
        Ok(Some(render_overlay(
            self.title.as_deref(),
            &results,
            timing,
            layout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::overlay::LineKind;
    use bytes::Bytes;

    struct FixedClassifier {
        scores: Vec<(usize, f32)>,
        time: Option<Duration>,
        calls: usize,
    }

    impl Classifier for FixedClassifier {
        fn input_size(&self) -> Size {
            Size::new(224, 224)
        }

        fn classify(&mut self, _sample: &Sample) -> anyhow::Result<Vec<(usize, f32)>> {
            self.calls += 1;
            Ok(self.scores.clone())
        }

        fn last_inference_time(&self) -> Option<Duration> {
            self.time
        }
    }

    fn sample() -> Sample {
        Sample {
            data: Bytes::from_static(&[0; 12]),
            size: Size::new(2, 2),
            format: "RGB".into(),
            sequence: 7,
            pts: None,
        }
    }

    fn layout() -> Layout {
        Layout::new(Size::new(640, 480), Size::new(224, 224)).unwrap()
    }

    fn labels() -> Labels {
        [(0, "background"), (1, "cat"), (2, "dog"), (3, "fox")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_rank_orders_filters_and_truncates() {
        let scores = [(0, 0.05), (1, 0.80), (2, 0.15), (3, 0.40)];
        let ranked = rank(&scores, &labels(), 2, 0.1);
        assert_eq!(
            ranked,
            vec![Classification::new("cat", 0.80), Classification::new("fox", 0.40)]
        );

        let ranked = rank(&scores, &labels(), 10, 0.1);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_unknown_index_uses_number() {
        let ranked = rank(&[(42, 0.9)], &labels(), 3, 0.1);
        assert_eq!(ranked[0].label, "42");
    }

    #[test]
    fn test_callback_renders_overlay() {
        let classifier = FixedClassifier {
            scores: vec![(1, 0.8), (2, 0.15)],
            time: Some(Duration::from_micros(12_500)),
            calls: 0,
        };
        let mut callback = ClassificationCallback::new(classifier, labels());
        let document = callback
            .on_frame(&sample(), &layout(), &Control::new())
            .unwrap()
            .unwrap();

        let results: Vec<_> = document
            .lines_of(LineKind::Result)
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(results, ["cat (0.80)", "dog (0.15)"]);
        assert_eq!(document.lines_of(LineKind::Title).count(), 1);
        let info = document.lines_of(LineKind::Info).next().unwrap();
        assert_eq!(info.text, "Inference time: 12.50 ms (80.00 fps)");
    }

    #[test]
    fn test_callback_skips_without_results_or_timing() {
        let mut callback = ClassificationCallback::new(
            FixedClassifier {
                scores: vec![(1, 0.05)],
                time: Some(Duration::from_millis(10)),
                calls: 0,
            },
            labels(),
        );
        assert!(callback.on_frame(&sample(), &layout(), &Control::new()).unwrap().is_none());

        let mut callback = ClassificationCallback::new(
            FixedClassifier {
                scores: vec![(1, 0.9)],
                time: None,
                calls: 0,
            },
            labels(),
        );
        assert!(callback.on_frame(&sample(), &layout(), &Control::new()).unwrap().is_none());

        let mut callback = ClassificationCallback::new(
            FixedClassifier {
                scores: vec![(1, 0.9)],
                time: Some(Duration::ZERO),
                calls: 0,
            },
            labels(),
        );
        assert!(callback.on_frame(&sample(), &layout(), &Control::new()).unwrap().is_none());
        assert_eq!(callback.classifier().calls, 1);
    }

    #[test]
    fn test_callback_without_title() {
        let mut callback = ClassificationCallback::new(
            FixedClassifier {
                scores: vec![(2, 0.5)],
                time: Some(Duration::from_millis(4)),
                calls: 0,
            },
            labels(),
        )
        .title(None)
        .top_k(1);
        let document = callback
            .on_frame(&sample(), &layout(), &Control::new())
            .unwrap()
            .unwrap();
        assert_eq!(document.lines_of(LineKind::Title).count(), 0);
        assert_eq!(document.lines_of(LineKind::Result).count(), 1);
    }
}
