use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::collation::infrastructure::error_handling_collate::ErrorHandlingCollate;
use crate::decoding::domain::video_decoder::DecoderFactory;
use crate::pipeline::frame_loader::{BatchResult, FrameLoader, LoaderConfig};
use crate::shared::error::FrameStreamError;
use crate::streaming::domain::worker_partition::WorkerInfo;
use crate::streaming::video_frames_dataset::{VideoFramesDataset, WorkerFrameStream};

/// Loads chunks with dedicated worker threads, one decoder cache each.
///
/// Layout: `frame-worker-{id} [decode → chunk → collate] → bounded channel →
/// consumer`. Workers share nothing but the channel and the stop flags.
/// With `num_workers == 0` the same work runs lazily on the consumer's
/// thread, without worker info.
pub struct ThreadedFrameLoader {
    factory: Arc<dyn DecoderFactory>,
    config: LoaderConfig,
}

impl ThreadedFrameLoader {
    pub fn new(factory: Arc<dyn DecoderFactory>, config: LoaderConfig) -> Result<Self, FrameStreamError> {
        config.validate()?;
        Ok(Self { factory, config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn load_inline(
        &self,
        dataset: &VideoFramesDataset,
        collate: Arc<ErrorHandlingCollate>,
    ) -> Result<FrameBatches, FrameStreamError> {
        let cache = dataset.init_worker(self.factory.clone(), 0)?;
        let batches = CollatingBatches::new(
            dataset.iter_worker(None, cache),
            collate,
            self.config.batch_size,
        );
        Ok(FrameBatches::Inline {
            batches,
            cancelled: self.config.cancelled.clone(),
        })
    }

    fn load_threaded(
        &self,
        dataset: &VideoFramesDataset,
        collate: Arc<ErrorHandlingCollate>,
    ) -> Result<FrameBatches, FrameStreamError> {
        let num_workers = self.config.num_workers;
        let (batch_tx, batch_rx) =
            crossbeam_channel::bounded::<BatchResult>(num_workers * self.config.prefetch_batches);
        let mut pool = WorkerPool {
            batch_rx: Some(batch_rx),
            handles: Vec::with_capacity(num_workers),
            stop: Arc::new(AtomicBool::new(false)),
        };

        for worker_id in 0..num_workers {
            let worker = WorkerInfo::new(worker_id, num_workers)?;
            let job = WorkerJob {
                dataset: dataset.clone(),
                factory: self.factory.clone(),
                worker,
                collate: collate.clone(),
                batch_size: self.config.batch_size,
                batch_tx: batch_tx.clone(),
                stop: pool.stop.clone(),
                cancelled: self.config.cancelled.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("frame-worker-{worker_id}"))
                .spawn(move || job.run())
                .map_err(|source| FrameStreamError::WorkerSpawn { worker_id, source })?;
            pool.handles.push((worker_id, handle));
        }

        Ok(FrameBatches::Threaded(pool))
    }
}

impl FrameLoader for ThreadedFrameLoader {
    fn load(
        &self,
        dataset: &VideoFramesDataset,
        collate: Arc<ErrorHandlingCollate>,
    ) -> Result<Box<dyn Iterator<Item = BatchResult> + Send>, FrameStreamError> {
        let batches = if self.config.num_workers == 0 {
            self.load_inline(dataset, collate)?
        } else {
            self.load_threaded(dataset, collate)?
        };
        Ok(Box::new(batches))
    }
}

/// Groups a worker's chunk stream into collated batches.
///
/// Empty batches (every item skipped) are not emitted. After a strict-mode
/// failure the stream is abandoned, which drops its cache and closes the
/// in-flight decoder.
struct CollatingBatches {
    stream: Option<WorkerFrameStream>,
    collate: Arc<ErrorHandlingCollate>,
    batch_size: usize,
}

impl CollatingBatches {
    fn new(stream: WorkerFrameStream, collate: Arc<ErrorHandlingCollate>, batch_size: usize) -> Self {
        Self {
            stream: Some(stream),
            collate,
            batch_size,
        }
    }
}

impl Iterator for CollatingBatches {
    type Item = BatchResult;

    fn next(&mut self) -> Option<BatchResult> {
        loop {
            let stream = self.stream.as_mut()?;
            // Strict mode stops filling at the first failure so nothing past
            // it is decoded.
            let strict = !self.collate.skip_failures();
            let mut items = Vec::with_capacity(self.batch_size);
            while items.len() < self.batch_size {
                let Some(item) = stream.next() else {
                    break;
                };
                let failed = item.is_err();
                items.push(item);
                if failed && strict {
                    break;
                }
            }
            if items.is_empty() {
                self.stream = None;
                return None;
            }
            match self.collate.collate_batch(items) {
                Ok(batch) if batch.is_empty() => continue,
                Ok(batch) => return Some(Ok(batch)),
                Err(e) => {
                    self.stream = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

struct WorkerJob {
    dataset: VideoFramesDataset,
    factory: Arc<dyn DecoderFactory>,
    worker: WorkerInfo,
    collate: Arc<ErrorHandlingCollate>,
    batch_size: usize,
    batch_tx: Sender<BatchResult>,
    stop: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerJob {
    fn run(self) {
        let cache = match self.dataset.init_worker(self.factory.clone(), self.worker.id()) {
            Ok(cache) => cache,
            Err(e) => {
                let _ = self.batch_tx.send(Err(e));
                return;
            }
        };
        let stream = self.dataset.iter_worker(Some(self.worker), cache);

        for batch in CollatingBatches::new(stream, self.collate.clone(), self.batch_size) {
            if self.stop.load(Ordering::Relaxed) || self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            if self.batch_tx.send(batch).is_err() {
                // Consumer dropped the receiver
                break;
            }
        }
        log::debug!("Worker {} finished", self.worker.id());
    }
}

struct WorkerPool {
    batch_rx: Option<Receiver<BatchResult>>,
    handles: Vec<(usize, JoinHandle<()>)>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Stops the workers and joins them. Returns the first panic, if any.
    fn shutdown(&mut self) -> Option<FrameStreamError> {
        self.stop.store(true, Ordering::Relaxed);
        // Unblocks any worker waiting on a full channel.
        self.batch_rx = None;

        let mut first_panic = None;
        for (worker_id, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("Worker {worker_id} panicked");
                first_panic.get_or_insert(FrameStreamError::WorkerPanicked { worker_id });
            }
        }
        first_panic
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Batches in arrival order. Dropping it stops and joins every worker.
enum FrameBatches {
    Inline {
        batches: CollatingBatches,
        cancelled: Arc<AtomicBool>,
    },
    Threaded(WorkerPool),
}

impl Iterator for FrameBatches {
    type Item = BatchResult;

    fn next(&mut self) -> Option<BatchResult> {
        match self {
            FrameBatches::Inline { batches, cancelled } => {
                if cancelled.load(Ordering::Relaxed) {
                    return None;
                }
                batches.next()
            }
            FrameBatches::Threaded(pool) => {
                let rx = pool.batch_rx.as_ref()?;
                match rx.recv() {
                    Ok(batch) => Some(batch),
                    // Every worker has exited
                    Err(_) => pool.shutdown().map(Err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::domain::chunk_collator::VideoChunkCollator;
    use crate::collation::domain::frame_batch::{BatchBackend, CollatedChunk};
    use crate::collation::infrastructure::default_collate::default_collate_fn;
    use crate::shared::error::BoxError;
    use crate::shared::frame::Frame;
    use crate::shared::test_fixtures::{paths, StubDecoderFactory};
    use crate::streaming::domain::frame_transform::FrameTransform;
    use crate::streaming::video_frames_dataset::DatasetOptions;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("v{i}.mp4")).collect()
    }

    fn factory(names: &[String], frames: usize) -> StubDecoderFactory {
        names
            .iter()
            .fold(StubDecoderFactory::new(), |f, name| f.with_video(name, frames))
    }

    fn dataset_with(
        names: &[String],
        chunk_size: usize,
        transform: Option<Arc<dyn FrameTransform>>,
    ) -> VideoFramesDataset {
        VideoFramesDataset::new(DatasetOptions {
            video_paths: Some(names.iter().map(PathBuf::from).collect()),
            chunk_size: Some(chunk_size),
            transform,
            ..Default::default()
        })
        .unwrap()
    }

    fn collate(skip_failures: bool) -> Arc<ErrorHandlingCollate> {
        let inner = VideoChunkCollator::new(default_collate_fn(false, BatchBackend::Array));
        Arc::new(ErrorHandlingCollate::new(Box::new(inner), skip_failures))
    }

    fn loader(factory: &StubDecoderFactory, num_workers: usize, batch_size: usize) -> ThreadedFrameLoader {
        ThreadedFrameLoader::new(
            Arc::new(factory.clone()),
            LoaderConfig {
                batch_size,
                num_workers,
                prefetch_batches: 1,
                ..Default::default()
            },
        )
        .unwrap()
    }

    /// Frame ids received per video, in arrival order.
    fn ids_by_video(batches: &[Vec<CollatedChunk>]) -> BTreeMap<PathBuf, Vec<usize>> {
        let mut ids: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
        for chunk in batches.iter().flatten() {
            ids.entry(chunk.info.video_path.clone())
                .or_default()
                .extend(chunk.frame_ids());
        }
        ids
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = ThreadedFrameLoader::new(
            Arc::new(StubDecoderFactory::new()),
            LoaderConfig {
                batch_size: 0,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inline_loader_keeps_dataset_order() {
        let names = names(3);
        let factory = factory(&names, 4);
        let dataset = dataset_with(&names, 2, None);

        let batches: Vec<_> = loader(&factory, 0, 4)
            .load(&dataset, collate(true))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 2]);
        let order: Vec<PathBuf> = batches
            .iter()
            .flatten()
            .map(|c| c.info.video_path.clone())
            .collect();
        assert_eq!(
            order,
            paths(&["v0.mp4", "v0.mp4", "v1.mp4", "v1.mp4", "v2.mp4", "v2.mp4"])
        );
        assert_eq!(factory.open_count(), 0);
    }

    #[rstest]
    fn test_workers_deliver_every_chunk_exactly_once(
        #[values(1, 2, 3, 5)] num_workers: usize,
        #[values(1, 3)] batch_size: usize,
    ) {
        let names = names(7);
        let factory = factory(&names, 5);
        let dataset = dataset_with(&names, 2, None);

        let batches: Vec<_> = loader(&factory, num_workers, batch_size)
            .load(&dataset, collate(false))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
        let ids = ids_by_video(&batches);
        assert_eq!(ids.len(), 7);
        assert!(ids.values().all(|v| v == &[1, 2, 3, 4, 5]));
        assert_eq!(factory.open_count(), 0);
    }

    #[test]
    fn test_batches_hold_chunks_from_one_worker() {
        let names = names(4);
        let factory = factory(&names, 2);
        let dataset = dataset_with(&names, 1, None);

        let batches: Vec<_> = loader(&factory, 2, 4)
            .load(&dataset, collate(false))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for batch in &batches {
            let worker_of = |c: &CollatedChunk| {
                names
                    .iter()
                    .position(|n| PathBuf::from(n) == c.info.video_path)
                    .map(|i| i % 2)
            };
            let first = worker_of(&batch[0]);
            assert!(batch.iter().all(|c| worker_of(c) == first));
        }
    }

    #[test]
    fn test_skipped_items_never_produce_empty_batches() {
        let factory = StubDecoderFactory::new()
            .with_failing_video("bad.mp4", 4, 1)
            .with_video("good.mp4", 2);
        let dataset = VideoFramesDataset::new(DatasetOptions {
            video_paths: Some(paths(&["bad.mp4", "good.mp4"])),
            ..Default::default()
        })
        .unwrap();
        let collate = collate(true);

        let batches: Vec<_> = loader(&factory, 0, 1)
            .load(&dataset, collate.clone())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
        assert_eq!(collate.skipped_count(), 1);
    }

    #[rstest]
    fn test_strict_failure_surfaces_and_cleans_up(#[values(0, 2)] num_workers: usize) {
        let factory = StubDecoderFactory::new()
            .with_failing_video("bad.mp4", 10, 3)
            .with_video("good.mp4", 10);
        let dataset = VideoFramesDataset::new(DatasetOptions {
            video_paths: Some(paths(&["bad.mp4", "good.mp4"])),
            chunk_size: Some(2),
            ..Default::default()
        })
        .unwrap();

        let mut batches = loader(&factory, num_workers, 1)
            .load(&dataset, collate(false))
            .unwrap();
        let failure = batches.by_ref().find_map(Result::err);
        drop(batches);

        assert!(matches!(
            failure,
            Some(FrameStreamError::Decode { frame: 3, .. })
        ));
        assert_eq!(factory.open_count(), 0);
    }

    #[test]
    fn test_strict_failure_decodes_nothing_past_it() {
        let factory = StubDecoderFactory::new()
            .with_failing_video("bad.mp4", 4, 1)
            .with_video("good.mp4", 4)
            .with_video("other.mp4", 4);
        let dataset = VideoFramesDataset::new(DatasetOptions {
            video_paths: Some(paths(&["bad.mp4", "good.mp4", "other.mp4"])),
            chunk_size: Some(1),
            ..Default::default()
        })
        .unwrap();

        let mut batches = loader(&factory, 0, 8)
            .load(&dataset, collate(false))
            .unwrap();
        let first = batches.next().unwrap();

        assert!(matches!(first, Err(FrameStreamError::Decode { frame: 1, .. })));
        assert_eq!(factory.opened(), paths(&["bad.mp4"]));
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_skip_mode_fills_batch_past_failure() {
        let factory = StubDecoderFactory::new()
            .with_failing_video("bad.mp4", 4, 1)
            .with_video("good.mp4", 4);
        let dataset = VideoFramesDataset::new(DatasetOptions {
            video_paths: Some(paths(&["bad.mp4", "good.mp4"])),
            chunk_size: Some(1),
            ..Default::default()
        })
        .unwrap();

        let mut batches = loader(&factory, 0, 8)
            .load(&dataset, collate(true))
            .unwrap();
        let first = batches.next().unwrap().unwrap();

        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_dropping_iterator_early_stops_workers() {
        let names = names(6);
        let factory = factory(&names, 50);
        let dataset = dataset_with(&names, 1, None);

        let mut batches = loader(&factory, 3, 1)
            .load(&dataset, collate(true))
            .unwrap();
        batches.next().unwrap().unwrap();
        drop(batches);

        assert_eq!(factory.open_count(), 0);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let names = names(2);
        let factory = factory(&names, 3);
        let panicking: Arc<dyn FrameTransform> =
            Arc::new(|_frame: Frame| -> Result<Frame, BoxError> { panic!("transform blew up") });
        let dataset = dataset_with(&names, 1, Some(panicking));

        let results: Vec<_> = loader(&factory, 1, 1)
            .load(&dataset, collate(true))
            .unwrap()
            .collect();

        assert!(matches!(
            results.last(),
            Some(Err(FrameStreamError::WorkerPanicked { worker_id: 0 }))
        ));
    }

    #[test]
    fn test_cancelled_flag_stops_inline_loading() {
        let names = names(2);
        let factory = factory(&names, 3);
        let dataset = dataset_with(&names, 1, None);
        let cancelled = Arc::new(AtomicBool::new(false));
        let loader = ThreadedFrameLoader::new(
            Arc::new(factory.clone()),
            LoaderConfig {
                num_workers: 0,
                cancelled: cancelled.clone(),
                ..Default::default()
            },
        )
        .unwrap();

        let mut batches = loader.load(&dataset, collate(true)).unwrap();
        assert!(batches.next().is_some());
        cancelled.store(true, Ordering::Relaxed);

        assert!(batches.next().is_none());
    }
}
