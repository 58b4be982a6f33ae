use std::sync::Arc;

use crate::collation::domain::frame_batch::{BatchBackend, CollateFn, FrameBatch};
use crate::collation::infrastructure::default_collate::default_collate_fn;
use crate::inference::domain::label::Label;
use crate::shared::error::BoxError;
use crate::shared::media_type::MediaType;
use crate::streaming::domain::frame_transform::FrameTransform;

/// Image model applied frame by frame to videos.
///
/// The model decides how its inputs are prepared (transform, raggedness,
/// backend, collation); the pipeline only routes the results.
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;

    fn media_type(&self) -> MediaType {
        MediaType::Image
    }

    /// Per-frame preprocessing run in the loader workers.
    fn transform(&self) -> Option<Arc<dyn FrameTransform>> {
        None
    }

    /// Whether batches keep one array per frame instead of stacking.
    fn ragged_batches(&self) -> bool {
        false
    }

    fn backend(&self) -> BatchBackend {
        BatchBackend::Array
    }

    fn collate_fn(&self) -> CollateFn {
        default_collate_fn(self.ragged_batches(), self.backend())
    }

    fn supports_confidence_thresh(&self) -> bool {
        false
    }

    fn confidence_thresh(&self) -> Option<f64> {
        None
    }

    /// Only called when [`ImageModel::supports_confidence_thresh`] is true.
    fn set_confidence_thresh(&mut self, _thresh: Option<f64>) {}

    /// One label list per frame, in batch order.
    fn predict_all(&self, frames: &FrameBatch) -> Result<Vec<Vec<Label>>, BoxError>;
}
