use std::sync::Arc;

use ndarray::{ArrayView, Axis, Dimension};

use crate::collation::domain::frame_batch::{BatchBackend, FrameBatch};
use crate::inference::domain::image_model::ImageModel;
use crate::inference::domain::label::Label;
use crate::shared::error::{BoxError, FrameStreamError};
use crate::streaming::domain::frame_transform::FrameTransform;

pub const DARK_LABEL: &str = "dark";
pub const BRIGHT_LABEL: &str = "bright";

/// Reference model: labels each frame `dark` or `bright` by its mean
/// intensity.
///
/// Intensity is normalized to `0.0..=1.0` for every batch layout. The
/// confidence is the distance between the frame's intensity and the
/// threshold, so frames near the threshold score close to 0.
pub struct LuminanceModel {
    threshold: f64,
    confidence_thresh: Option<f64>,
    backend: BatchBackend,
    ragged: bool,
    transform: Option<Arc<dyn FrameTransform>>,
}

impl LuminanceModel {
    pub fn new() -> Self {
        Self {
            threshold: 0.5,
            confidence_thresh: None,
            backend: BatchBackend::Array,
            ragged: false,
            transform: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, FrameStreamError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FrameStreamError::Config(format!(
                "luminance threshold must be in 0..=1, got {threshold}"
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn with_backend(mut self, backend: BatchBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_ragged_batches(mut self, ragged: bool) -> Self {
        self.ragged = ragged;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn FrameTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn label(&self, intensity: f64) -> Vec<Label> {
        let name = if intensity >= self.threshold {
            BRIGHT_LABEL
        } else {
            DARK_LABEL
        };
        let label = Label::new(name).with_confidence((intensity - self.threshold).abs());
        if label.passes(self.confidence_thresh) {
            vec![label]
        } else {
            Vec::new()
        }
    }
}

impl Default for LuminanceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageModel for LuminanceModel {
    fn name(&self) -> &str {
        "luminance"
    }

    fn transform(&self) -> Option<Arc<dyn FrameTransform>> {
        self.transform.clone()
    }

    fn ragged_batches(&self) -> bool {
        self.ragged
    }

    fn backend(&self) -> BatchBackend {
        self.backend
    }

    fn supports_confidence_thresh(&self) -> bool {
        true
    }

    fn confidence_thresh(&self) -> Option<f64> {
        self.confidence_thresh
    }

    fn set_confidence_thresh(&mut self, thresh: Option<f64>) {
        self.confidence_thresh = thresh;
    }

    fn predict_all(&self, frames: &FrameBatch) -> Result<Vec<Vec<Label>>, BoxError> {
        let intensities: Vec<f64> = match frames {
            FrameBatch::Array(batch) => batch
                .axis_iter(Axis(0))
                .map(|frame| mean(frame, |v| v as f64 / 255.0))
                .collect(),
            FrameBatch::Tensor(batch) => batch
                .axis_iter(Axis(0))
                .map(|frame| mean(frame, f64::from))
                .collect(),
            FrameBatch::RaggedArrays(frames) => frames
                .iter()
                .map(|frame| mean(frame.view(), |v| v as f64 / 255.0))
                .collect(),
            FrameBatch::RaggedTensors(frames) => frames
                .iter()
                .map(|frame| mean(frame.view(), f64::from))
                .collect(),
        };
        Ok(intensities.into_iter().map(|i| self.label(i)).collect())
    }
}

fn mean<A: Copy, D: Dimension>(values: ArrayView<'_, A, D>, to_unit: impl Fn(A) -> f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| to_unit(v)).sum::<f64>() / values.len() as f64
}
