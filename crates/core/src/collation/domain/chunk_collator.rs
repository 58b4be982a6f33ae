use crate::collation::domain::frame_batch::{CollateFn, CollatedChunk};
use crate::shared::error::BoxError;
use crate::streaming::domain::frame_chunk::FrameChunk;

/// Turns a [`FrameChunk`] into model input. Shared by all loader workers.
pub trait ChunkCollator: Send + Sync {
    fn collate(&self, chunk: FrameChunk) -> Result<CollatedChunk, BoxError>;
}

/// Applies a frame collation function to a chunk's frames; ids, sample id,
/// and path pass through untouched.
pub struct VideoChunkCollator {
    collate_fn: CollateFn,
}

impl VideoChunkCollator {
    pub fn new(collate_fn: CollateFn) -> Self {
        Self { collate_fn }
    }
}

impl ChunkCollator for VideoChunkCollator {
    fn collate(&self, chunk: FrameChunk) -> Result<CollatedChunk, BoxError> {
        let (frames, info) = chunk.into_parts();
        let frames = (self.collate_fn)(frames)?;
        Ok(CollatedChunk { frames, info })
    }
}
