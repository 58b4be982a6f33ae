use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::decoding::domain::video_decoder::{DecoderFactory, VideoDecoder};
use crate::shared::error::{BoxError, FrameStreamError};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// An open decoder plus its frame cursor, owned by one [`DecoderCache`].
pub struct DecoderEntry {
    decoder: Box<dyn VideoDecoder>,
    frames_read: usize,
    streaming: bool,
}

impl DecoderEntry {
    fn new(decoder: Box<dyn VideoDecoder>) -> Self {
        Self {
            decoder,
            frames_read: 0,
            streaming: false,
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        self.decoder.metadata()
    }

    /// Number of frames decoded so far; the 1-based id of the last frame
    /// returned by [`DecoderEntry::next_frame`].
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Marks the entry as having a chunker in flight. Streaming entries are
    /// never chosen for eviction; the mark ends when the entry is released.
    pub fn mark_streaming(&mut self) {
        self.streaming = true;
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, BoxError> {
        let frame = self.decoder.next_frame()?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

/// Worker-local LRU cache of open decoders keyed by video path.
///
/// Each worker builds its own cache at startup, so no locking is needed.
/// Every decoder is closed exactly once: on [`DecoderCache::release`], on
/// eviction, or when the cache is dropped.
pub struct DecoderCache {
    factory: Arc<dyn DecoderFactory>,
    capacity: usize,
    /// Front is least recently used.
    entries: VecDeque<(PathBuf, DecoderEntry)>,
}

impl DecoderCache {
    pub fn new(factory: Arc<dyn DecoderFactory>, capacity: usize) -> Result<Self, FrameStreamError> {
        if capacity == 0 {
            return Err(FrameStreamError::Config(
                "max_cached_decoders must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            factory,
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.position(path).is_some()
    }

    /// Cached paths from least to most recently used.
    pub fn cached_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(path, _)| path.as_path())
    }

    /// Returns the entry for `path`, opening a decoder on a miss.
    ///
    /// A hit moves the entry to most-recently-used and leaves its cursor
    /// untouched. A miss inserts the new entry as most-recently-used and, if
    /// the cache is then over capacity, evicts the least recently used entry
    /// that is not streaming.
    pub fn get_or_open(&mut self, path: &Path) -> Result<&mut DecoderEntry, FrameStreamError> {
        if let Some(pos) = self.position(path) {
            if let Some(hit) = self.entries.remove(pos) {
                self.entries.push_back(hit);
            }
        } else {
            let decoder = self
                .factory
                .open(path)
                .map_err(|source| FrameStreamError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            log::debug!(
                "Opened decoder for {} ({})",
                path.display(),
                decoder.metadata().describe()
            );
            self.entries
                .push_back((path.to_path_buf(), DecoderEntry::new(decoder)));

            let newest = self.entries.len() - 1;
            if self.entries.len() > self.capacity && !self.evict_idle(newest) {
                if let Some((opened, entry)) = self.entries.pop_back() {
                    close_entry(&opened, entry);
                }
                return Err(FrameStreamError::CacheFull {
                    path: path.to_path_buf(),
                    capacity: self.capacity,
                });
            }
        }

        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last].1)
    }

    /// Removes and closes the entry for `path`. Returns `false` (and does
    /// nothing) if the path is not cached.
    pub fn release(&mut self, path: &Path) -> bool {
        match self.position(path).and_then(|pos| self.entries.remove(pos)) {
            Some((released, entry)) => {
                close_entry(&released, entry);
                true
            }
            None => false,
        }
    }

    /// Evicts the single least recently used entry that is not streaming.
    pub fn evict_lru(&mut self) -> bool {
        self.evict_idle(self.entries.len())
    }

    /// Closes every cached decoder.
    pub fn clear(&mut self) {
        while let Some((path, entry)) = self.entries.pop_front() {
            close_entry(&path, entry);
        }
    }

    /// Evicts the oldest non-streaming entry among the first `limit` entries.
    fn evict_idle(&mut self, limit: usize) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .take(limit)
            .position(|(_, entry)| !entry.streaming)
        else {
            return false;
        };
        match self.entries.remove(pos) {
            Some((evicted, entry)) => {
                log::debug!("Evicting decoder for {}", evicted.display());
                close_entry(&evicted, entry);
                true
            }
            None => false,
        }
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|(cached, _)| cached == path)
    }
}

impl Drop for DecoderCache {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Close failures happen on an already-terminating stream: log, don't raise.
fn close_entry(path: &Path, mut entry: DecoderEntry) {
    match entry.decoder.close() {
        Ok(()) => log::debug!("Decoder cache deleted for {}", path.display()),
        Err(e) => log::warn!("Failed to close decoder for {}: {e}", path.display()),
    }
}
