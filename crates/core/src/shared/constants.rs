pub const DEFAULT_CHUNK_SIZE: usize = 1;
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Open decoders kept per worker before LRU eviction kicks in.
pub const DEFAULT_MAX_CACHED_DECODERS: usize = 8;

/// Batches buffered per worker between the loader threads and the consumer.
pub const DEFAULT_PREFETCH_BATCHES: usize = 2;

/// Upper bound for the automatic worker count.
pub const MAX_RECOMMENDED_WORKERS: usize = 4;

pub const DEFAULT_LABEL_FIELD: &str = "predictions";
pub const FRAME_FIELD_PREFIX: &str = "frames.";

pub const FILEPATH_FIELD: &str = "filepath";
pub const ID_FIELD: &str = "id";

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v", "mpg", "mpeg"];
