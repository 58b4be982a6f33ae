use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collation::domain::chunk_collator::ChunkCollator;
use crate::collation::domain::frame_batch::CollatedChunk;
use crate::shared::error::FrameStreamError;
use crate::streaming::domain::frame_chunk::FrameChunk;

/// Decorator that collates a batch item by item, isolating failures.
///
/// Items arrive either as chunks or as the error that replaced one (a failed
/// decode). With `skip_failures` a failed item is logged and dropped and the
/// rest of the batch survives. Without it the first failure is returned and
/// the batch is lost.
pub struct ErrorHandlingCollate {
    inner: Box<dyn ChunkCollator>,
    skip_failures: bool,
    skipped: AtomicUsize,
}

impl ErrorHandlingCollate {
    pub fn new(inner: Box<dyn ChunkCollator>, skip_failures: bool) -> Self {
        Self {
            inner,
            skip_failures,
            skipped: AtomicUsize::new(0),
        }
    }

    pub fn skip_failures(&self) -> bool {
        self.skip_failures
    }

    /// Items dropped so far, across every batch and worker.
    pub fn skipped_count(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn collate_batch(
        &self,
        items: Vec<Result<FrameChunk, FrameStreamError>>,
    ) -> Result<Vec<CollatedChunk>, FrameStreamError> {
        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            match item.and_then(|chunk| self.collate_one(chunk)) {
                Ok(collated) => batch.push(collated),
                Err(e) if self.skip_failures => {
                    log::warn!("Skipping failed batch item: {e}");
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    fn collate_one(&self, chunk: FrameChunk) -> Result<CollatedChunk, FrameStreamError> {
        let path = chunk.video_path().to_path_buf();
        let first_frame = chunk.first_frame_id().unwrap_or_default();
        self.inner
            .collate(chunk)
            .map_err(|source| FrameStreamError::Collate {
                path,
                first_frame,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::domain::chunk_collator::VideoChunkCollator;
    use crate::collation::domain::frame_batch::BatchBackend;
    use crate::collation::infrastructure::default_collate::default_collate_fn;
    use crate::shared::frame::Frame;
    use std::path::PathBuf;

    fn chunk(name: &str, first_id: usize, sizes: &[(u32, u32)]) -> FrameChunk {
        let frames = sizes
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| Frame::new(vec![0; (w * h * 3) as usize], w, h, 3, i))
            .collect();
        FrameChunk::new(name, frames, first_id, Some(format!("id-{name}")))
    }

    fn collate(skip_failures: bool) -> ErrorHandlingCollate {
        let inner = VideoChunkCollator::new(default_collate_fn(false, BatchBackend::Array));
        ErrorHandlingCollate::new(Box::new(inner), skip_failures)
    }

    fn items_with_one_bad_chunk() -> Vec<Result<FrameChunk, FrameStreamError>> {
        vec![
            Ok(chunk("a", 1, &[(2, 2), (2, 2)])),
            Ok(chunk("b", 1, &[(2, 2), (2, 2)])),
            Ok(chunk("c", 3, &[(2, 2), (4, 4)])),
            Ok(chunk("d", 1, &[(2, 2)])),
            Ok(chunk("e", 5, &[(2, 2), (2, 2)])),
        ]
    }

    #[test]
    fn test_skip_mode_drops_failed_item() {
        let collate = collate(true);

        let batch = collate.collate_batch(items_with_one_bad_chunk()).unwrap();

        let ids: Vec<Option<&str>> = batch.iter().map(CollatedChunk::sample_id).collect();
        assert_eq!(batch.len(), 4);
        assert_eq!(ids, vec![Some("id-a"), Some("id-b"), Some("id-d"), Some("id-e")]);
        assert_eq!(collate.skipped_count(), 1);
    }

    #[test]
    fn test_strict_mode_returns_first_failure() {
        let collate = collate(false);

        let err = collate.collate_batch(items_with_one_bad_chunk()).unwrap_err();

        match err {
            FrameStreamError::Collate {
                path, first_frame, ..
            } => {
                assert_eq!(path, PathBuf::from("c"));
                assert_eq!(first_frame, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(collate.skipped_count(), 0);
    }

    #[test]
    fn test_upstream_errors_follow_the_same_policy() {
        let decode_failure = || {
            Err(FrameStreamError::Decode {
                path: PathBuf::from("x"),
                frame: 2,
                source: "corrupt".into(),
            })
        };

        let skipping = collate(true);
        let batch = skipping
            .collate_batch(vec![decode_failure(), Ok(chunk("a", 1, &[(2, 2)]))])
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(skipping.skipped_count(), 1);

        let strict = collate(false);
        let result = strict.collate_batch(vec![decode_failure(), Ok(chunk("a", 1, &[(2, 2)]))]);
        assert!(matches!(result, Err(FrameStreamError::Decode { frame: 2, .. })));
    }

    #[test]
    fn test_all_items_failing_yields_empty_batch_in_skip_mode() {
        let collate = collate(true);

        let batch = collate
            .collate_batch(vec![Ok(chunk("a", 1, &[(2, 2), (3, 3)]))])
            .unwrap();

        assert!(batch.is_empty());
    }
}
