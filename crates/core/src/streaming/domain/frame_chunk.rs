use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;

/// A contiguous run of decoded (and transformed) frames from one video.
///
/// Frame ids are 1-based, contiguous, and strictly increasing; the
/// constructor derives them from the first id so they always line up with
/// `frames`.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameChunk {
    frames: Vec<Frame>,
    frame_ids: Vec<usize>,
    sample_id: Option<String>,
    video_path: PathBuf,
}

impl FrameChunk {
    pub fn new(
        video_path: impl Into<PathBuf>,
        frames: Vec<Frame>,
        first_frame_id: usize,
        sample_id: Option<String>,
    ) -> Self {
        debug_assert!(first_frame_id >= 1, "frame ids are 1-based");
        let frame_ids = (first_frame_id..first_frame_id + frames.len()).collect();
        Self {
            frames,
            frame_ids,
            sample_id,
            video_path: video_path.into(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_ids(&self) -> &[usize] {
        &self.frame_ids
    }

    pub fn sample_id(&self) -> Option<&str> {
        self.sample_id.as_deref()
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_frame_id(&self) -> Option<usize> {
        self.frame_ids.first().copied()
    }

    /// Splits the chunk into its frames and the parts collation passes
    /// through unchanged.
    pub fn into_parts(self) -> (Vec<Frame>, ChunkInfo) {
        (
            self.frames,
            ChunkInfo {
                frame_ids: self.frame_ids,
                sample_id: self.sample_id,
                video_path: self.video_path,
            },
        )
    }
}

/// Routing information that travels with a chunk through collation and
/// prediction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkInfo {
    pub frame_ids: Vec<usize>,
    pub sample_id: Option<String>,
    pub video_path: PathBuf,
}
