//! Stub collaborators shared by unit tests across modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::decoding::domain::video_decoder::{DecoderFactory, VideoDecoder};
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderEvent {
    Opened(PathBuf),
    Closed(PathBuf),
}

#[derive(Clone, Debug)]
struct StubVideo {
    frames: usize,
    fail_at: Option<usize>,
    width: u32,
    height: u32,
}

/// Serves synthetic videos by path and records every open/close.
///
/// Frame `i` (0-based) is filled with the byte `i % 256`, so tests can check
/// which frames a chunk holds by looking at pixel values.
#[derive(Clone, Default)]
pub struct StubDecoderFactory {
    videos: Arc<Mutex<HashMap<PathBuf, StubVideo>>>,
    events: Arc<Mutex<Vec<DecoderEvent>>>,
    failing_close: Arc<Mutex<Vec<PathBuf>>>,
}

impl StubDecoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(self, path: &str, frames: usize) -> Self {
        self.insert(path, frames, None, 2, 2);
        self
    }

    pub fn with_sized_video(self, path: &str, frames: usize, width: u32, height: u32) -> Self {
        self.insert(path, frames, None, width, height);
        self
    }

    /// Decoding frame number `fail_at` (1-based) returns an error.
    pub fn with_failing_video(self, path: &str, frames: usize, fail_at: usize) -> Self {
        self.insert(path, frames, Some(fail_at), 2, 2);
        self
    }

    pub fn with_failing_close(self, path: &str) -> Self {
        self.failing_close.lock().unwrap().push(PathBuf::from(path));
        self
    }

    fn insert(&self, path: &str, frames: usize, fail_at: Option<usize>, width: u32, height: u32) {
        self.videos.lock().unwrap().insert(
            PathBuf::from(path),
            StubVideo {
                frames,
                fail_at,
                width,
                height,
            },
        );
    }

    pub fn events(&self) -> Vec<DecoderEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DecoderEvent::Opened(p) => Some(p),
                DecoderEvent::Closed(_) => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DecoderEvent::Closed(p) => Some(p),
                DecoderEvent::Opened(_) => None,
            })
            .collect()
    }

    /// Decoders opened but not yet closed.
    pub fn open_count(&self) -> usize {
        self.opened().len() - self.closed().len()
    }
}

impl DecoderFactory for StubDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, BoxError> {
        let video = self
            .videos
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no such video: {}", path.display()))?;
        self.events
            .lock()
            .unwrap()
            .push(DecoderEvent::Opened(path.to_path_buf()));
        let fail_close = self.failing_close.lock().unwrap().iter().any(|p| p == path);
        Ok(Box::new(StubDecoder {
            path: path.to_path_buf(),
            metadata: VideoMetadata {
                width: video.width,
                height: video.height,
                fps: 30.0,
                total_frames: video.frames,
                codec: "stub".to_string(),
                source_path: Some(path.to_path_buf()),
            },
            video,
            position: 0,
            closed: false,
            fail_close,
            events: self.events.clone(),
        }))
    }
}

pub struct StubDecoder {
    path: PathBuf,
    metadata: VideoMetadata,
    video: StubVideo,
    position: usize,
    closed: bool,
    fail_close: bool,
    events: Arc<Mutex<Vec<DecoderEvent>>>,
}

impl VideoDecoder for StubDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, BoxError> {
        if self.closed {
            return Err("decoder closed".into());
        }
        if self.position >= self.video.frames {
            return Ok(None);
        }
        if self.video.fail_at == Some(self.position + 1) {
            return Err(format!("corrupt frame {}", self.position + 1).into());
        }
        let len = (self.video.width * self.video.height * 3) as usize;
        let frame = Frame::new(
            vec![(self.position % 256) as u8; len],
            self.video.width,
            self.video.height,
            3,
            self.position,
        );
        self.position += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) -> Result<(), BoxError> {
        if !self.closed {
            self.closed = true;
            self.events
                .lock()
                .unwrap()
                .push(DecoderEvent::Closed(self.path.clone()));
        }
        if self.fail_close {
            return Err("close failed".into());
        }
        Ok(())
    }
}

pub fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}
