use std::collections::BTreeMap;

use crate::inference::domain::label::Label;
use crate::shared::error::BoxError;
use crate::shared::media_type::MediaType;

/// Labels for one sample keyed by 1-based frame number.
pub type FrameLabels = BTreeMap<usize, Vec<Label>>;

/// The host's sample store, as seen by the inference pipeline.
///
/// `values` must return one entry per sample in a stable order, so that the
/// `filepath` and `id` columns line up index by index.
pub trait SampleCollection {
    fn media_type(&self) -> MediaType;

    fn values(&self, field: &str) -> Result<Vec<String>, BoxError>;

    /// Merges `labels` into the frames of `sample_id` under `label_field`,
    /// dropping labels below `confidence_thresh`.
    fn add_frame_labels(
        &mut self,
        sample_id: &str,
        labels: FrameLabels,
        label_field: &str,
        confidence_thresh: Option<f64>,
    ) -> Result<(), BoxError>;

    /// Marks `sample_id` as ready to persist. Collections that write in
    /// bulk may defer the write until [`SampleCollection::flush`].
    fn save_sample(&mut self, sample_id: &str) -> Result<(), BoxError>;

    /// Persists every sample saved since the last flush. Called once at
    /// the end of a run, including a failed one.
    fn flush(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}
