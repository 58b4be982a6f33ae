use std::iter::FusedIterator;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decoding::domain::decoder_cache::DecoderCache;
use crate::shared::error::FrameStreamError;
use crate::shared::frame::Frame;
use crate::streaming::domain::frame_chunk::FrameChunk;
use crate::streaming::domain::frame_transform::FrameTransform;

enum Pulled {
    Full(FrameChunk),
    /// The decoder ran dry; carries the shorter final chunk, if any frames
    /// were pending.
    Exhausted(Option<FrameChunk>),
}

/// Turns one video into a lazy, finite, non-restartable sequence of
/// [`FrameChunk`]s.
///
/// The chunker holds no decoder itself; each pull goes through the worker's
/// [`DecoderCache`], so the decoder cursor carries over between pulls. A
/// chunk is yielded as soon as it reaches `chunk_size`. When the decoder is
/// exhausted the entry is released first, then the remaining frames (if any)
/// are yielded as a shorter final chunk. Errors are returned once, after the
/// decoder has been released, and end the sequence.
pub struct FrameChunker {
    video_path: PathBuf,
    chunk_size: usize,
    transform: Option<Arc<dyn FrameTransform>>,
    sample_id: Option<String>,
    pending: Vec<Frame>,
    finished: bool,
}

impl FrameChunker {
    pub fn new(video_path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            video_path: video_path.into(),
            chunk_size,
            transform: None,
            sample_id: None,
            pending: Vec::with_capacity(chunk_size),
            finished: false,
        }
    }

    pub fn with_transform(mut self, transform: Option<Arc<dyn FrameTransform>>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_sample_id(mut self, sample_id: Option<String>) -> Self {
        self.sample_id = sample_id;
        self
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn next_chunk(
        &mut self,
        cache: &mut DecoderCache,
    ) -> Option<Result<FrameChunk, FrameStreamError>> {
        if self.finished {
            return None;
        }
        match self.pull(cache) {
            Ok(Pulled::Full(chunk)) => Some(Ok(chunk)),
            Ok(Pulled::Exhausted(last)) => {
                self.finish(cache);
                last.map(Ok)
            }
            Err(e) => {
                self.finish(cache);
                Some(Err(e))
            }
        }
    }

    /// Adapts the chunker into an [`Iterator`] over a borrowed cache.
    pub fn chunks(self, cache: &mut DecoderCache) -> FrameChunks<'_> {
        FrameChunks {
            chunker: self,
            cache,
        }
    }

    fn pull(&mut self, cache: &mut DecoderCache) -> Result<Pulled, FrameStreamError> {
        let entry = cache.get_or_open(&self.video_path)?;
        entry.mark_streaming();

        loop {
            let frame_id = entry.frames_read() + 1;
            let decoded = match entry.next_frame() {
                Ok(decoded) => decoded,
                Err(source) => {
                    // Container frame counts can be missing (0).
                    match entry.metadata().total_frames {
                        0 => log::warn!(
                            "Decoding {} failed at frame {frame_id}; the rest of the video is skipped",
                            self.video_path.display()
                        ),
                        total => log::warn!(
                            "Decoding {} failed at frame {frame_id}; frames {frame_id}..={total} are skipped",
                            self.video_path.display()
                        ),
                    }
                    return Err(FrameStreamError::Decode {
                        path: self.video_path.clone(),
                        frame: frame_id,
                        source,
                    });
                }
            };

            let Some(frame) = decoded else {
                let last = entry.frames_read();
                let remainder = (!self.pending.is_empty()).then(|| self.take_chunk(last));
                return Ok(Pulled::Exhausted(remainder));
            };

            let frame = match &self.transform {
                Some(transform) => {
                    transform
                        .apply(frame)
                        .map_err(|source| FrameStreamError::Transform {
                            path: self.video_path.clone(),
                            frame: frame_id,
                            source,
                        })?
                }
                None => frame,
            };

            self.pending.push(frame);
            if self.pending.len() == self.chunk_size {
                return Ok(Pulled::Full(self.take_chunk(frame_id)));
            }
        }
    }

    /// Drains the pending frames into a chunk whose last id is `last_id`.
    fn take_chunk(&mut self, last_id: usize) -> FrameChunk {
        let frames = mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        let first_id = last_id + 1 - frames.len();
        FrameChunk::new(
            self.video_path.clone(),
            frames,
            first_id,
            self.sample_id.clone(),
        )
    }

    fn finish(&mut self, cache: &mut DecoderCache) {
        self.finished = true;
        self.pending.clear();
        cache.release(&self.video_path);
    }
}

/// Iterator form of a [`FrameChunker`] bound to one cache.
pub struct FrameChunks<'a> {
    chunker: FrameChunker,
    cache: &'a mut DecoderCache,
}

impl Iterator for FrameChunks<'_> {
    type Item = Result<FrameChunk, FrameStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunker.next_chunk(self.cache)
    }
}

impl FusedIterator for FrameChunks<'_> {}
