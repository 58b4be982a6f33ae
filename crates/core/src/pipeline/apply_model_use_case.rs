use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crate::collation::domain::chunk_collator::VideoChunkCollator;
use crate::collation::domain::frame_batch::CollatedChunk;
use crate::collation::infrastructure::error_handling_collate::ErrorHandlingCollate;
use crate::decoding::domain::video_decoder::DecoderFactory;
use crate::decoding::infrastructure::ffmpeg_decoder::FfmpegDecoderFactory;
use crate::inference::domain::image_model::ImageModel;
use crate::inference::domain::sample_collection::{FrameLabels, SampleCollection};
use crate::shared::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_LABEL_FIELD, DEFAULT_PREFETCH_BATCHES, FRAME_FIELD_PREFIX,
};
use crate::shared::error::{BoxError, FrameStreamError};
use crate::shared::media_type::MediaType;
use crate::streaming::video_frames_dataset::{DatasetOptions, VideoFramesDataset};

use super::frame_loader::{recommend_num_workers, FrameLoader, LoaderConfig};
use super::infrastructure::threaded_frame_loader::ThreadedFrameLoader;
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

/// Options for one inference run.
#[derive(Clone, Debug)]
pub struct ApplyModelOptions {
    /// Frame-level field to store predictions in; a leading `frames.` is
    /// optional.
    pub label_field: String,
    /// Applied through the model when it supports a threshold, otherwise
    /// when labels are stored.
    pub confidence_thresh: Option<f64>,
    /// Chunks per batch. `None` means 1.
    pub batch_size: Option<usize>,
    /// Frames per chunk. `None` means 1.
    pub chunk_size: Option<usize>,
    /// `None` picks a worker count from the available cores.
    pub num_workers: Option<usize>,
    /// Drop failed chunks (decode, collation, prediction) instead of
    /// aborting the run.
    pub skip_failures: bool,
    pub max_cached_decoders: Option<usize>,
    pub cancelled: Option<Arc<AtomicBool>>,
}

impl Default for ApplyModelOptions {
    fn default() -> Self {
        Self {
            label_field: DEFAULT_LABEL_FIELD.to_string(),
            confidence_thresh: None,
            batch_size: None,
            chunk_size: None,
            num_workers: None,
            skip_failures: true,
            max_cached_decoders: None,
            cancelled: None,
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceSummary {
    pub batches: usize,
    pub chunks: usize,
    pub frames: usize,
    /// Distinct samples that received labels.
    pub samples: usize,
    /// Chunks dropped under `skip_failures`, at any stage.
    pub skipped: usize,
}

/// Applies an image model to every frame of a video sample collection.
///
/// Wires the dataset, collation, and loader together, runs `predict_all`
/// once per chunk, and writes the labels back to each sample by frame
/// number.
pub struct ApplyModelUseCase {
    factory: Arc<dyn DecoderFactory>,
    logger: Box<dyn PipelineLogger>,
}

impl ApplyModelUseCase {
    pub fn new(factory: Arc<dyn DecoderFactory>, logger: Box<dyn PipelineLogger>) -> Self {
        Self { factory, logger }
    }

    pub fn execute(
        &mut self,
        samples: &mut dyn SampleCollection,
        model: &mut dyn ImageModel,
        options: &ApplyModelOptions,
    ) -> Result<InferenceSummary, FrameStreamError> {
        let media_type = samples.media_type();
        if media_type != MediaType::Video {
            return Err(FrameStreamError::UnsupportedMedia(media_type));
        }
        if model.media_type() != MediaType::Image {
            return Err(FrameStreamError::UnsupportedModel(format!(
                "'{}' takes {} inputs; only image models are supported",
                model.name(),
                model.media_type()
            )));
        }
        let label_field = frame_label_field(&options.label_field)?;

        let loader = ThreadedFrameLoader::new(
            self.factory.clone(),
            LoaderConfig {
                batch_size: options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                num_workers: recommend_num_workers(options.num_workers),
                prefetch_batches: DEFAULT_PREFETCH_BATCHES,
                cancelled: options.cancelled.clone().unwrap_or_default(),
            },
        )?;
        let dataset = VideoFramesDataset::new(DatasetOptions {
            samples: Some(&*samples),
            include_ids: true,
            transform: model.transform(),
            chunk_size: options.chunk_size,
            skip_failures: options.skip_failures,
            max_cached_decoders: options.max_cached_decoders,
            ..Default::default()
        })?;

        // A model that filters its own output gets the threshold for the
        // duration of the run; the collection then stores labels unfiltered.
        let mut confidence_thresh = options.confidence_thresh;
        let previous_thresh = if confidence_thresh.is_some() && model.supports_confidence_thresh()
        {
            let previous = model.confidence_thresh();
            model.set_confidence_thresh(confidence_thresh.take());
            Some(previous)
        } else {
            None
        };

        self.logger.info(&format!(
            "Applying '{}' to {} videos ({} workers, batch size {}, chunk size {})",
            model.name(),
            dataset.len(),
            loader.config().num_workers,
            loader.config().batch_size,
            dataset.chunk_size()
        ));

        let result = self.run(
            &loader,
            &dataset,
            samples,
            &*model,
            label_field,
            confidence_thresh,
        );
        // Labels stored before a failure are still persisted.
        let flushed = samples.flush().map_err(FrameStreamError::Flush);

        if let Some(previous) = previous_thresh {
            model.set_confidence_thresh(previous);
        }

        let summary = result?;
        flushed?;
        self.logger.info(&format!(
            "Labeled {} frames across {} samples ({} chunks skipped)",
            summary.frames, summary.samples, summary.skipped
        ));
        self.logger.summary();
        Ok(summary)
    }

    fn run(
        &mut self,
        loader: &dyn FrameLoader,
        dataset: &VideoFramesDataset,
        samples: &mut dyn SampleCollection,
        model: &dyn ImageModel,
        label_field: &str,
        confidence_thresh: Option<f64>,
    ) -> Result<InferenceSummary, FrameStreamError> {
        let collate = Arc::new(ErrorHandlingCollate::new(
            Box::new(VideoChunkCollator::new(model.collate_fn())),
            dataset.skip_failures(),
        ));
        let mut summary = InferenceSummary::default();
        let mut labeled: HashSet<String> = HashSet::new();

        for batch in loader.load(dataset, collate.clone())? {
            let batch = batch?;
            summary.batches += 1;
            self.logger.metric("batch_chunks", batch.len() as f64);

            for chunk in batch {
                let frames = chunk.frame_ids().len();
                match self.label_chunk(samples, model, &chunk, label_field, confidence_thresh) {
                    Ok(true) => {
                        summary.chunks += 1;
                        summary.frames += frames;
                        if let Some(id) = chunk.sample_id() {
                            labeled.insert(id.to_string());
                        }
                    }
                    Ok(false) => {}
                    Err(e @ FrameStreamError::Predict { .. }) if dataset.skip_failures() => {
                        log::warn!("Skipping chunk: {e}");
                        summary.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            self.logger.progress(summary.frames, 0);
        }

        summary.samples = labeled.len();
        summary.skipped += collate.skipped_count();
        Ok(summary)
    }

    /// Predicts one chunk and stores its labels. Returns `false` when the
    /// chunk has no sample to write to.
    fn label_chunk(
        &mut self,
        samples: &mut dyn SampleCollection,
        model: &dyn ImageModel,
        chunk: &CollatedChunk,
        label_field: &str,
        confidence_thresh: Option<f64>,
    ) -> Result<bool, FrameStreamError> {
        let path = &chunk.info.video_path;
        let Some(sample_id) = chunk.sample_id() else {
            log::warn!("Chunk from {} has no sample id; dropping it", path.display());
            return Ok(false);
        };

        let start = Instant::now();
        let labels = model
            .predict_all(&chunk.frames)
            .map_err(|source| FrameStreamError::Predict {
                path: path.clone(),
                source,
            })?;
        if labels.len() != chunk.frame_ids().len() {
            return Err(FrameStreamError::Predict {
                path: path.clone(),
                source: format!(
                    "model returned {} label lists for {} frames",
                    labels.len(),
                    chunk.frame_ids().len()
                )
                .into(),
            });
        }
        self.logger
            .timing("predict", start.elapsed().as_secs_f64() * 1000.0);

        let start = Instant::now();
        let by_frame: FrameLabels = chunk.frame_ids().iter().copied().zip(labels).collect();
        let save_err = |source: BoxError| FrameStreamError::Save {
            sample_id: sample_id.to_string(),
            source,
        };
        samples
            .add_frame_labels(sample_id, by_frame, label_field, confidence_thresh)
            .map_err(save_err)?;
        samples.save_sample(sample_id).map_err(save_err)?;
        self.logger
            .timing("save", start.elapsed().as_secs_f64() * 1000.0);

        Ok(true)
    }
}

/// Applies `model` to the frames of every video in `samples`, decoding with
/// FFmpeg and reporting nothing beyond the `log` facade.
pub fn apply_image_model_to_video_frames(
    samples: &mut dyn SampleCollection,
    model: &mut dyn ImageModel,
    options: &ApplyModelOptions,
) -> Result<InferenceSummary, FrameStreamError> {
    ApplyModelUseCase::new(
        Arc::new(FfmpegDecoderFactory::new()),
        Box::new(NullPipelineLogger),
    )
    .execute(samples, model, options)
}

/// Strips the optional `frames.` prefix; labels always live on frames.
fn frame_label_field(label_field: &str) -> Result<&str, FrameStreamError> {
    let field = label_field
        .strip_prefix(FRAME_FIELD_PREFIX)
        .unwrap_or(label_field);
    if field.is_empty() {
        return Err(FrameStreamError::Config(format!(
            "invalid label field '{label_field}'"
        )));
    }
    Ok(field)
}
