use std::sync::Arc;

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::streaming::domain::frame_chunk::ChunkInfo;

/// Element layout a model wants its batches in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchBackend {
    /// `u8` pixels in HWC order.
    #[default]
    Array,
    /// `f32` values in `0.0..=1.0`, CHW order.
    Tensor,
}

/// The collated frames of one chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameBatch {
    /// `(n, height, width, channels)`.
    Array(Array4<u8>),
    /// `(n, channels, height, width)`.
    Tensor(Array4<f32>),
    RaggedArrays(Vec<Array3<u8>>),
    RaggedTensors(Vec<Array3<f32>>),
}

impl FrameBatch {
    pub fn len(&self) -> usize {
        match self {
            FrameBatch::Array(a) => a.shape()[0],
            FrameBatch::Tensor(t) => t.shape()[0],
            FrameBatch::RaggedArrays(v) => v.len(),
            FrameBatch::RaggedTensors(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ragged(&self) -> bool {
        matches!(self, FrameBatch::RaggedArrays(_) | FrameBatch::RaggedTensors(_))
    }

    pub fn backend(&self) -> BatchBackend {
        match self {
            FrameBatch::Array(_) | FrameBatch::RaggedArrays(_) => BatchBackend::Array,
            FrameBatch::Tensor(_) | FrameBatch::RaggedTensors(_) => BatchBackend::Tensor,
        }
    }
}

/// Turns one chunk's frames into the batch a model consumes.
pub type CollateFn = Arc<dyn Fn(Vec<Frame>) -> Result<FrameBatch, BoxError> + Send + Sync>;

/// A collated chunk with its routing information.
#[derive(Clone, Debug, PartialEq)]
pub struct CollatedChunk {
    pub frames: FrameBatch,
    pub info: ChunkInfo,
}

impl CollatedChunk {
    pub fn frame_ids(&self) -> &[usize] {
        &self.info.frame_ids
    }

    pub fn sample_id(&self) -> Option<&str> {
        self.info.sample_id.as_deref()
    }
}
