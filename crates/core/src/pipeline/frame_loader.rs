use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::collation::domain::frame_batch::CollatedChunk;
use crate::collation::infrastructure::error_handling_collate::ErrorHandlingCollate;
use crate::shared::constants::{DEFAULT_BATCH_SIZE, DEFAULT_PREFETCH_BATCHES, MAX_RECOMMENDED_WORKERS};
use crate::shared::error::FrameStreamError;
use crate::streaming::video_frames_dataset::VideoFramesDataset;

/// Up to `batch_size` collated chunks, all from one worker.
pub type BatchResult = Result<Vec<CollatedChunk>, FrameStreamError>;

/// Configuration for a loading run.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// `0` loads on the caller's thread.
    pub num_workers: usize,
    /// Batches each worker may queue ahead of the consumer.
    pub prefetch_batches: usize,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: recommend_num_workers(None),
            prefetch_batches: DEFAULT_PREFETCH_BATCHES,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), FrameStreamError> {
        if self.batch_size == 0 {
            return Err(FrameStreamError::Config(
                "batch_size must be >= 1".to_string(),
            ));
        }
        if self.prefetch_batches == 0 {
            return Err(FrameStreamError::Config(
                "prefetch_batches must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker count to use when the caller does not pick one: half the
/// available cores, at least 1 and at most [`MAX_RECOMMENDED_WORKERS`].
pub fn recommend_num_workers(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(|| {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cores / 2).clamp(1, MAX_RECOMMENDED_WORKERS)
    })
}

/// Abstracts how dataset chunks are loaded, collated, and handed to the
/// consumer.
///
/// This is a port. Infrastructure provides the concrete loader (threaded,
/// or inline when no workers are configured).
pub trait FrameLoader {
    fn load(
        &self,
        dataset: &VideoFramesDataset,
        collate: Arc<ErrorHandlingCollate>,
    ) -> Result<Box<dyn Iterator<Item = BatchResult> + Send>, FrameStreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommend_honours_request() {
        assert_eq!(recommend_num_workers(Some(0)), 0);
        assert_eq!(recommend_num_workers(Some(12)), 12);
    }

    #[test]
    fn test_recommend_default_is_bounded() {
        let n = recommend_num_workers(None);
        assert!((1..=MAX_RECOMMENDED_WORKERS).contains(&n));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = LoaderConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FrameStreamError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_prefetch() {
        let config = LoaderConfig {
            prefetch_batches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(LoaderConfig::default().validate().is_ok());
    }
}
