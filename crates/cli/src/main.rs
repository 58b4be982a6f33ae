mod settings;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use framestream_core::collation::domain::frame_batch::BatchBackend;
use framestream_core::decoding::infrastructure::ffmpeg_decoder::FfmpegDecoderFactory;
use framestream_core::inference::infrastructure::json_sample_store::JsonSampleStore;
use framestream_core::inference::infrastructure::luminance_model::LuminanceModel;
use framestream_core::pipeline::apply_model_use_case::{ApplyModelOptions, ApplyModelUseCase};
use framestream_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use framestream_core::shared::constants::VIDEO_EXTENSIONS;
use framestream_core::streaming::infrastructure::resize_transform::ResizeTransform;

use settings::Settings;

/// Run an image model over every frame of a set of videos.
#[derive(Parser)]
#[command(name = "framestream")]
struct Cli {
    /// Video files, directories of videos, or a single .json sample manifest.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Manifest to write labels to when the inputs are videos.
    #[arg(long, default_value = "labels.json")]
    manifest: PathBuf,

    /// Frame field to store predictions in.
    #[arg(long)]
    label_field: Option<String>,

    /// Chunks per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Frames per chunk.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Loader worker threads (0 = load on the main thread).
    #[arg(long)]
    workers: Option<usize>,

    /// Open decoders kept per worker.
    #[arg(long)]
    max_cached_decoders: Option<usize>,

    /// Drop labels below this confidence (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Luminance above which a frame is labeled bright (0.0-1.0).
    #[arg(long)]
    threshold: Option<f64>,

    /// Batch layout: array or tensor.
    #[arg(long)]
    backend: Option<String>,

    /// Keep per-frame arrays instead of stacking each chunk.
    #[arg(long)]
    ragged: bool,

    /// Resize frames before inference, as WIDTHxHEIGHT.
    #[arg(long)]
    resize: Option<String>,

    /// Abort on the first failed chunk instead of skipping it.
    #[arg(long)]
    strict: bool,

    /// Settings file (default: the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref());
    validate(&cli)?;

    let backend = match cli.backend.as_deref() {
        Some(name) => parse_backend(name)?,
        None => settings.backend,
    };
    let mut model = LuminanceModel::new()
        .with_threshold(cli.threshold.unwrap_or(settings.threshold))?
        .with_backend(backend)
        .with_ragged_batches(cli.ragged || settings.ragged);
    if let Some(size) = cli.resize.as_deref() {
        let (width, height) = parse_size(size)?;
        model = model.with_transform(Arc::new(ResizeTransform::new(width, height)?));
    }

    let mut samples = open_samples(&cli)?;
    log::info!(
        "Loaded {} samples; labels go to {}",
        samples.len(),
        samples.path().display()
    );

    let options = ApplyModelOptions {
        label_field: cli.label_field.unwrap_or(settings.label_field),
        confidence_thresh: cli.confidence.or(settings.confidence),
        batch_size: Some(cli.batch_size.unwrap_or(settings.batch_size)),
        chunk_size: Some(cli.chunk_size.unwrap_or(settings.chunk_size)),
        num_workers: cli.workers.or(settings.workers),
        skip_failures: !cli.strict && settings.skip_failures,
        max_cached_decoders: Some(cli.max_cached_decoders.unwrap_or(settings.max_cached_decoders)),
        cancelled: None,
    };

    let mut use_case = ApplyModelUseCase::new(
        Arc::new(FfmpegDecoderFactory::new()),
        Box::new(StdoutPipelineLogger::new(settings.progress_every)),
    );
    let summary = use_case.execute(&mut samples, &mut model, &options)?;
    log::info!(
        "Wrote {} frame labels for {} samples to {}",
        summary.frames,
        summary.samples,
        samples.path().display()
    );
    Ok(())
}

fn open_samples(cli: &Cli) -> Result<JsonSampleStore, Box<dyn std::error::Error>> {
    if let [input] = cli.inputs.as_slice() {
        if has_extension(input, &["json"]) {
            return Ok(JsonSampleStore::load(input)?);
        }
    }

    let mut videos = Vec::new();
    for input in &cli.inputs {
        if input.is_dir() {
            videos.extend(videos_in(input)?);
        } else {
            videos.push(fs::canonicalize(input)?);
        }
    }
    if videos.is_empty() {
        return Err("No video files found in the given inputs".into());
    }
    Ok(JsonSampleStore::from_videos(&cli.manifest, &videos))
}

/// Video files directly inside `dir`, sorted by path.
fn videos_in(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, VIDEO_EXTENSIONS) {
            videos.push(fs::canonicalize(path)?);
        }
    }
    videos.sort();
    Ok(videos)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    let has_manifest = cli.inputs.iter().any(|p| has_extension(p, &["json"]));
    if has_manifest && cli.inputs.len() > 1 {
        return Err("A sample manifest must be the only input".into());
    }
    if cli.batch_size == Some(0) {
        return Err("Batch size must be at least 1".into());
    }
    if cli.chunk_size == Some(0) {
        return Err("Chunk size must be at least 1".into());
    }
    if cli.max_cached_decoders == Some(0) {
        return Err("Max cached decoders must be at least 1".into());
    }
    if let Some(c) = cli.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {c}").into());
        }
    }
    if let Some(t) = cli.threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(format!("Threshold must be between 0.0 and 1.0, got {t}").into());
        }
    }
    if let Some(backend) = cli.backend.as_deref() {
        parse_backend(backend)?;
    }
    if let Some(size) = cli.resize.as_deref() {
        parse_size(size)?;
    }
    Ok(())
}

fn parse_backend(name: &str) -> Result<BatchBackend, Box<dyn std::error::Error>> {
    match name {
        "array" => Ok(BatchBackend::Array),
        "tensor" => Ok(BatchBackend::Tensor),
        other => Err(format!("Backend must be 'array' or 'tensor', got '{other}'").into()),
    }
}

fn parse_size(size: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let invalid = || format!("Resize must look like 640x480, got '{size}'");
    let (width, height) = size.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid().into());
    }
    Ok((width, height))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
