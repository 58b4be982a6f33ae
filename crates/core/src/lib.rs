//! Streams decoded video frames, in fixed-size chunks, from worker-local
//! decoder caches into batched image-model inference.

pub mod collation;
pub mod decoding;
pub mod inference;
pub mod pipeline;
pub mod shared;
pub mod streaming;
