use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::domain::label::Label;
use crate::inference::domain::sample_collection::{FrameLabels, SampleCollection};
use crate::shared::constants::{FILEPATH_FIELD, ID_FIELD};
use crate::shared::error::BoxError;
use crate::shared::media_type::MediaType;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown sample field '{0}'")]
    UnknownField(String),
    #[error("unknown sample '{0}'")]
    UnknownSample(String),
}

/// Labels stored on one frame, keyed by label field.
pub type FrameFields = BTreeMap<String, Vec<Label>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub id: String,
    pub filepath: PathBuf,
    /// Keyed by 1-based frame number.
    #[serde(default)]
    pub frames: BTreeMap<usize, FrameFields>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub media_type: MediaType,
    #[serde(default)]
    pub samples: Vec<SampleRecord>,
}

/// [`SampleCollection`] backed by a JSON manifest on disk.
///
/// Relative `filepath`s resolve against the manifest's directory.
/// `save_sample` only marks the store dirty; `flush` rewrites the whole
/// manifest once, through a temp file and a rename, so readers never observe
/// a half-written file. Dropping a dirty store discards the pending labels.
pub struct JsonSampleStore {
    path: PathBuf,
    manifest: Manifest,
    dirty: bool,
}

impl JsonSampleStore {
    /// New video manifest with one sample per path, ids `000001`, `000002`,
    /// .... Nothing is written until a sample is saved.
    pub fn from_videos(path: impl Into<PathBuf>, videos: &[PathBuf]) -> Self {
        let samples = videos
            .iter()
            .enumerate()
            .map(|(i, video)| SampleRecord {
                id: format!("{:06}", i + 1),
                filepath: video.clone(),
                frames: BTreeMap::new(),
            })
            .collect();
        Self {
            path: path.into(),
            manifest: Manifest {
                media_type: MediaType::Video,
                samples,
            },
            dirty: false,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest = serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded sample manifest {}", path.display());
        Ok(Self {
            path,
            manifest,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.manifest.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.samples.is_empty()
    }

    /// Whether saved samples are waiting for a flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn sample(&self, sample_id: &str) -> Option<&SampleRecord> {
        self.manifest.samples.iter().find(|s| s.id == sample_id)
    }

    /// Writes the manifest atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let json = serde_json::to_vec_pretty(&self.manifest).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_error(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(io_error(&self.path))?;
        Ok(())
    }

    fn resolve(&self, filepath: &Path) -> PathBuf {
        match self.path.parent() {
            Some(dir) if filepath.is_relative() => dir.join(filepath),
            _ => filepath.to_path_buf(),
        }
    }

    fn sample_mut(&mut self, sample_id: &str) -> Result<&mut SampleRecord, StoreError> {
        self.manifest
            .samples
            .iter_mut()
            .find(|s| s.id == sample_id)
            .ok_or_else(|| StoreError::UnknownSample(sample_id.to_string()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

impl SampleCollection for JsonSampleStore {
    fn media_type(&self) -> MediaType {
        self.manifest.media_type
    }

    fn values(&self, field: &str) -> Result<Vec<String>, BoxError> {
        let samples = &self.manifest.samples;
        match field {
            ID_FIELD => Ok(samples.iter().map(|s| s.id.clone()).collect()),
            FILEPATH_FIELD => Ok(samples
                .iter()
                .map(|s| self.resolve(&s.filepath).to_string_lossy().into_owned())
                .collect()),
            other => Err(StoreError::UnknownField(other.to_string()).into()),
        }
    }

    fn add_frame_labels(
        &mut self,
        sample_id: &str,
        labels: FrameLabels,
        label_field: &str,
        confidence_thresh: Option<f64>,
    ) -> Result<(), BoxError> {
        let sample = self.sample_mut(sample_id)?;
        for (frame_number, frame_labels) in labels {
            let kept = frame_labels
                .into_iter()
                .filter(|l| l.passes(confidence_thresh))
                .collect();
            sample
                .frames
                .entry(frame_number)
                .or_default()
                .insert(label_field.to_string(), kept);
        }
        Ok(())
    }

    fn save_sample(&mut self, sample_id: &str) -> Result<(), BoxError> {
        if self.sample(sample_id).is_none() {
            return Err(StoreError::UnknownSample(sample_id.to_string()).into());
        }
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        if !self.dirty {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        log::debug!("Flushed sample manifest to {}", self.path.display());
        Ok(())
    }
}
