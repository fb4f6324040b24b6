// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Model loading and input/output tensor conversion for `--model`.

use std::path::Path;

use anyhow::{bail, Result};
use framelens::{Classifier, Sample, Size};

/// Memory order of a 4-d image input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, height, width, 3]`
    Nhwc,
    /// `[1, 3, height, width]`
    Nchw,
}

impl TensorLayout {
    /// Layout and image size of a model input shape. Channels-first when
    /// dimension 1 is 3, channels-last otherwise.
    pub fn from_shape(shape: &[i64]) -> Result<(Self, Size)> {
        let [_, a, b, c] = shape else {
            bail!("Expected a 4-d image input, model takes {:?}", shape);
        };
        let dim = |d: i64| u32::try_from(d).ok().filter(|d| *d > 0);
        let (layout, height, width) = if *a == 3 {
            (Self::Nchw, dim(*b), dim(*c))
        } else {
            (Self::Nhwc, dim(*a), dim(*b))
        };
        match (height, width) {
            (Some(height), Some(width)) => Ok((layout, Size::new(width, height))),
            _ => bail!("Model input {:?} has no fixed image size", shape),
        }
    }

    pub fn shape(&self, size: Size) -> [usize; 4] {
        let (width, height) = (size.width as usize, size.height as usize);
        match self {
            Self::Nhwc => [1, height, width, 3],
            Self::Nchw => [1, 3, height, width],
        }
    }
}

/// Packed RGB sample to `[0, 1]` floats in `layout` order.
pub fn to_tensor(sample: &Sample, layout: TensorLayout) -> Result<Vec<f32>> {
    let pixels = sample.size.width as usize * sample.size.height as usize;
    if sample.format != "RGB" || sample.data.len() != pixels * 3 {
        bail!(
            "Expected {} RGB frame ({} bytes), got {} {} bytes",
            sample.size,
            pixels * 3,
            sample.format,
            sample.data.len()
        );
    }

    let scale = |v: u8| v as f32 / 255.0;
    Ok(match layout {
        TensorLayout::Nhwc => sample.data.iter().copied().map(scale).collect(),
        TensorLayout::Nchw => {
            let mut planes = vec![0.0; pixels * 3];
            for (i, rgb) in sample.data.chunks_exact(3).enumerate() {
                for (channel, value) in rgb.iter().enumerate() {
                    planes[channel * pixels + i] = scale(*value);
                }
            }
            planes
        }
    })
}

/// Probabilities from model output: kept as-is when already in `[0, 1]`,
/// softmax otherwise.
pub fn probabilities(raw: &[f32]) -> Vec<f32> {
    if raw.iter().all(|v| (0.0..=1.0).contains(v)) {
        return raw.to_vec();
    }
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, bail, Context, Result};
    use framelens::{Classifier, Sample, Size};
    use ort::session::Session;
    use ort::value::Tensor;

    use super::{probabilities, to_tensor, TensorLayout};

    pub struct OnnxClassifier {
        session: Session,
        layout: TensorLayout,
        input_size: Size,
        last_inference_time: Option<Duration>,
    }

    impl OnnxClassifier {
        pub fn open(path: &Path) -> Result<Self> {
            let session = Session::builder()
                .and_then(|builder| builder.commit_from_file(path))
                .map_err(|e| anyhow!("{}", e))
                .with_context(|| format!("Failed to load model {}", path.display()))?;

            let shape: Vec<i64> = session
                .inputs
                .first()
                .and_then(|input| input.input_type.tensor_shape())
                .map(|shape| shape.iter().copied().collect())
                .context("Model has no tensor input")?;
            let (layout, input_size) = TensorLayout::from_shape(&shape)?;

            tracing::info!(
                "Loaded model {} (input {}, {:?})",
                path.display(),
                input_size,
                layout
            );
            Ok(Self {
                session,
                layout,
                input_size,
                last_inference_time: None,
            })
        }
    }

    impl Classifier for OnnxClassifier {
        fn input_size(&self) -> Size {
            self.input_size
        }

        fn classify(&mut self, sample: &Sample) -> Result<Vec<(usize, f32)>> {
            if sample.size != self.input_size {
                bail!("Frame is {}, model expects {}", sample.size, self.input_size);
            }
            let data = to_tensor(sample, self.layout)?;
            let tensor = Tensor::from_array((self.layout.shape(self.input_size), data))
                .map_err(|e| anyhow!("{}", e))?;

            let start = Instant::now();
            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .map_err(|e| anyhow!("Inference failed: {}", e))?;
            let (_, raw) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("{}", e))?;
            let scores = probabilities(raw);
            self.last_inference_time = Some(start.elapsed());

            Ok(scores.into_iter().enumerate().collect())
        }

        fn last_inference_time(&self) -> Option<Duration> {
            self.last_inference_time
        }
    }
}

#[cfg(feature = "onnx")]
pub fn open_classifier(path: &Path) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(onnx::OnnxClassifier::open(path)?))
}

#[cfg(not(feature = "onnx"))]
pub fn open_classifier(path: &Path) -> Result<Box<dyn Classifier>> {
    bail!(
        "Cannot load {}: framelens-classify was built without the `onnx` feature",
        path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelens::Sample;

    fn sample(width: u32, height: u32, data: Vec<u8>) -> Sample {
        Sample {
            data: data.into(),
            size: Size::new(width, height),
            format: "RGB".into(),
            sequence: 0,
            pts: None,
        }
    }

    #[test]
    fn test_layout_from_shape() {
        assert_eq!(
            TensorLayout::from_shape(&[1, 224, 224, 3]).unwrap(),
            (TensorLayout::Nhwc, Size::new(224, 224))
        );
        assert_eq!(
            TensorLayout::from_shape(&[1, 3, 240, 320]).unwrap(),
            (TensorLayout::Nchw, Size::new(320, 240))
        );
        assert!(TensorLayout::from_shape(&[1, -1, -1, 3]).is_err());
        assert!(TensorLayout::from_shape(&[1, 1000]).is_err());
    }

    #[test]
    fn test_to_tensor_orders_channels() {
        let frame = sample(2, 1, vec![255, 0, 0, 0, 255, 0]);
        assert_eq!(
            to_tensor(&frame, TensorLayout::Nhwc).unwrap(),
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(
            to_tensor(&frame, TensorLayout::Nchw).unwrap(),
            [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_to_tensor_rejects_wrong_length() {
        assert!(to_tensor(&sample(2, 2, vec![0; 5]), TensorLayout::Nhwc).is_err());
    }

    #[test]
    fn test_probabilities() {
        assert_eq!(probabilities(&[0.2, 0.8]), [0.2, 0.8]);
        let soft = probabilities(&[2.0, 0.0, -1.0]);
        assert!((soft.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(soft[0] > soft[1] && soft[1] > soft[2]);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_open_requires_onnx_feature() {
        assert!(open_classifier(Path::new("model.onnx")).is_err());
    }
}
