use std::path::PathBuf;

use thiserror::Error;

use crate::shared::media_type::MediaType;

/// Error type returned by pluggable collaborators (decoders, transforms,
/// models, sample stores). Must be `Send + Sync` so it can cross worker
/// threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum FrameStreamError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unsupported media type {0}")]
    UnsupportedMedia(MediaType),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("failed to read field '{field}' from samples: {source}")]
    Samples {
        field: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to open decoder for {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to decode frame {frame} of {path}: {source}")]
    Decode {
        path: PathBuf,
        frame: usize,
        #[source]
        source: BoxError,
    },
    #[error("transform failed on frame {frame} of {path}: {source}")]
    Transform {
        path: PathBuf,
        frame: usize,
        #[source]
        source: BoxError,
    },
    #[error("failed to collate chunk starting at frame {first_frame} of {path}: {source}")]
    Collate {
        path: PathBuf,
        first_frame: usize,
        #[source]
        source: BoxError,
    },
    #[error("cannot open {path}: all {capacity} cached decoders are still streaming")]
    CacheFull { path: PathBuf, capacity: usize },
    #[error("prediction failed for {path}: {source}")]
    Predict {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error("failed to save sample {sample_id}: {source}")]
    Save {
        sample_id: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to flush samples: {0}")]
    Flush(#[source] BoxError),
    #[error("failed to spawn worker {worker_id}: {source}")]
    WorkerSpawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_decode_error_names_path_and_frame() {
        let err = FrameStreamError::Decode {
            path: PathBuf::from("/videos/a.mp4"),
            frame: 7,
            source: "corrupt packet".into(),
        };
        let message = err.to_string();
        assert!(message.contains("/videos/a.mp4"));
        assert!(message.contains("frame 7"));
        assert!(message.contains("corrupt packet"));
    }

    #[test]
    fn test_source_is_preserved() {
        let err = FrameStreamError::Open {
            path: PathBuf::from("missing.mp4"),
            source: "no such file".into(),
        };
        assert_eq!(err.source().unwrap().to_string(), "no such file");
    }

    #[test]
    fn test_unsupported_media_display() {
        let err = FrameStreamError::UnsupportedMedia(MediaType::Image);
        assert_eq!(err.to_string(), "unsupported media type image");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameStreamError>();
    }
}
