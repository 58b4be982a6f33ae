use std::path::Path;

use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// A stateful reader that turns one encoded video into a sequence of raw
/// frames.
///
/// The decoder is its own cursor: each `next_frame` call continues where the
/// previous one stopped, which lets a cached decoder resume across several
/// chunk-sized pulls.
pub trait VideoDecoder: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Decodes the next frame, or `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, BoxError>;

    /// Releases the underlying file and codec handles. Must be idempotent.
    fn close(&mut self) -> Result<(), BoxError>;
}

/// Opens decoders. Shared by every worker, so it must be `Send + Sync`;
/// the decoders it returns are owned by exactly one worker.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, BoxError>;
}
