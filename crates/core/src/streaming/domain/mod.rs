pub mod frame_chunk;
pub mod frame_chunker;
pub mod frame_transform;
pub mod worker_partition;
