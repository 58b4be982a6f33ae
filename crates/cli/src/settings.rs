use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use framestream_core::collation::domain::frame_batch::BatchBackend;
use framestream_core::shared::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_LABEL_FIELD, DEFAULT_MAX_CACHED_DECODERS,
};

/// Defaults for every run, read from a JSON file. Command-line arguments
/// override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub label_field: String,
    pub batch_size: usize,
    pub chunk_size: usize,
    /// `None` picks a worker count from the available cores.
    pub workers: Option<usize>,
    pub max_cached_decoders: usize,
    pub confidence: Option<f64>,
    pub skip_failures: bool,
    pub threshold: f64,
    pub backend: BatchBackend,
    pub ragged: bool,
    pub progress_every: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            label_field: DEFAULT_LABEL_FIELD.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
            max_cached_decoders: DEFAULT_MAX_CACHED_DECODERS,
            confidence: None,
            skip_failures: true,
            threshold: 0.5,
            backend: BatchBackend::Array,
            ragged: false,
            progress_every: 100,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("framestream").join("settings.json"))
    }

    /// Reads `path`, or the default location when `None`. A missing or
    /// unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        let Ok(json) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring invalid settings file {}: {e}", path.display());
                Self::default()
            }
        }
    }
}
