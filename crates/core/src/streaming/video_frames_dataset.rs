use std::iter::{FusedIterator, StepBy};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use crate::decoding::domain::decoder_cache::DecoderCache;
use crate::decoding::domain::video_decoder::DecoderFactory;
use crate::inference::domain::sample_collection::SampleCollection;
use crate::shared::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CACHED_DECODERS, FILEPATH_FIELD, ID_FIELD,
};
use crate::shared::error::FrameStreamError;
use crate::streaming::domain::frame_chunk::FrameChunk;
use crate::streaming::domain::frame_chunker::FrameChunker;
use crate::streaming::domain::frame_transform::FrameTransform;
use crate::streaming::domain::worker_partition::{assigned_indices, WorkerInfo};

/// Construction options for [`VideoFramesDataset`].
///
/// Either `video_paths` or `samples` must be given. Explicit lists take
/// precedence over values read from `samples`.
#[derive(Default)]
pub struct DatasetOptions<'a> {
    pub video_paths: Option<Vec<PathBuf>>,
    pub samples: Option<&'a dyn SampleCollection>,
    pub sample_ids: Option<Vec<String>>,
    /// Read sample ids from `samples` when `sample_ids` is not given.
    pub include_ids: bool,
    pub transform: Option<Arc<dyn FrameTransform>>,
    pub chunk_size: Option<usize>,
    pub skip_failures: bool,
    pub max_cached_decoders: Option<usize>,
}

/// Video list plus chunking settings, shared by every loader worker.
///
/// Cloning is cheap: the path and id lists are reference counted, so each
/// worker thread can own a handle.
#[derive(Clone)]
pub struct VideoFramesDataset {
    video_paths: Arc<[PathBuf]>,
    sample_ids: Option<Arc<[String]>>,
    transform: Option<Arc<dyn FrameTransform>>,
    chunk_size: usize,
    skip_failures: bool,
    max_cached_decoders: usize,
}

impl VideoFramesDataset {
    pub fn new(options: DatasetOptions<'_>) -> Result<Self, FrameStreamError> {
        let chunk_size = options.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(FrameStreamError::Config(
                "chunk_size must be >= 1".to_string(),
            ));
        }
        let max_cached_decoders = options
            .max_cached_decoders
            .unwrap_or(DEFAULT_MAX_CACHED_DECODERS);
        if max_cached_decoders == 0 {
            return Err(FrameStreamError::Config(
                "max_cached_decoders must be >= 1".to_string(),
            ));
        }

        let video_paths: Vec<PathBuf> = match (options.video_paths, options.samples) {
            (Some(paths), _) => paths,
            (None, Some(samples)) => read_field(samples, FILEPATH_FIELD)?
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            (None, None) => {
                return Err(FrameStreamError::Config(
                    "either video paths or samples must be provided".to_string(),
                ))
            }
        };

        let sample_ids = match (options.sample_ids, options.include_ids, options.samples) {
            (Some(ids), _, _) => Some(ids),
            (None, true, Some(samples)) => Some(read_field(samples, ID_FIELD)?),
            (None, true, None) => {
                return Err(FrameStreamError::Config(
                    "include_ids requires samples to read ids from".to_string(),
                ))
            }
            (None, false, _) => None,
        };

        if let Some(ids) = &sample_ids {
            if ids.len() != video_paths.len() {
                return Err(FrameStreamError::Config(format!(
                    "{} sample ids given for {} videos",
                    ids.len(),
                    video_paths.len()
                )));
            }
        }

        Ok(Self {
            video_paths: video_paths.into(),
            sample_ids: sample_ids.map(Into::into),
            transform: options.transform,
            chunk_size,
            skip_failures: options.skip_failures,
            max_cached_decoders,
        })
    }

    pub fn len(&self) -> usize {
        self.video_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.video_paths.is_empty()
    }

    pub fn video_paths(&self) -> &[PathBuf] {
        &self.video_paths
    }

    pub fn sample_ids(&self) -> Option<&[String]> {
        self.sample_ids.as_deref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn skip_failures(&self) -> bool {
        self.skip_failures
    }

    pub fn max_cached_decoders(&self) -> usize {
        self.max_cached_decoders
    }

    /// Per-worker setup hook: a fresh, empty decoder cache for one worker.
    pub fn init_worker(
        &self,
        factory: Arc<dyn DecoderFactory>,
        worker_id: usize,
    ) -> Result<DecoderCache, FrameStreamError> {
        let cache = DecoderCache::new(factory, self.max_cached_decoders)?;
        log::debug!("Worker {worker_id} initialized with empty decoder cache");
        Ok(cache)
    }

    /// Streams the chunks of every video assigned to `worker`, in index
    /// order. `None` means single-consumer loading: every video is assigned.
    ///
    /// The stream owns `cache`; dropping the stream closes any decoder still
    /// open, including one for a partially read video.
    pub fn iter_worker(&self, worker: Option<WorkerInfo>, cache: DecoderCache) -> WorkerFrameStream {
        let indices = assigned_indices(self.len(), worker);
        if let Some(w) = worker {
            log::info!(
                "Worker {}/{} assigned {} videos",
                w.id(),
                w.num_workers(),
                indices.len()
            );
        }
        WorkerFrameStream {
            dataset: self.clone(),
            indices,
            cache,
            current: None,
        }
    }

    fn chunker_for(&self, index: usize) -> FrameChunker {
        let sample_id = self.sample_ids.as_ref().map(|ids| ids[index].clone());
        FrameChunker::new(self.video_paths[index].clone(), self.chunk_size)
            .with_transform(self.transform.clone())
            .with_sample_id(sample_id)
    }
}

fn read_field(
    samples: &dyn SampleCollection,
    field: &str,
) -> Result<Vec<String>, FrameStreamError> {
    samples
        .values(field)
        .map_err(|source| FrameStreamError::Samples {
            field: field.to_string(),
            source,
        })
}

/// One worker's lazy, non-restartable chunk stream.
///
/// An `Err` item ends only the video it came from; the stream moves on to
/// the next assigned video. Whether that error aborts the run is the
/// consumer's call.
pub struct WorkerFrameStream {
    dataset: VideoFramesDataset,
    indices: StepBy<Range<usize>>,
    cache: DecoderCache,
    current: Option<FrameChunker>,
}

impl WorkerFrameStream {
    pub fn cache(&self) -> &DecoderCache {
        &self.cache
    }
}

impl Iterator for WorkerFrameStream {
    type Item = Result<FrameChunk, FrameStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunker) = self.current.as_mut() {
                if let Some(item) = chunker.next_chunk(&mut self.cache) {
                    return Some(item);
                }
                self.current = None;
            }
            let index = self.indices.next()?;
            self.current = Some(self.dataset.chunker_for(index));
        }
    }
}

impl FusedIterator for WorkerFrameStream {}
