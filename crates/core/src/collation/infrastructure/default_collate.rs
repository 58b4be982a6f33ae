use std::sync::Arc;

use ndarray::{Array3, Array4};

use crate::collation::domain::frame_batch::{BatchBackend, CollateFn, FrameBatch};
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

/// Default frame collation.
///
/// Non-ragged batches stack equally shaped frames into one 4-D array and
/// fail if any frame's shape differs from the first. Ragged batches keep one
/// 3-D array per frame. The `Tensor` backend converts to `f32` CHW scaled to
/// `0.0..=1.0`.
pub fn default_collate(
    frames: Vec<Frame>,
    ragged: bool,
    backend: BatchBackend,
) -> Result<FrameBatch, BoxError> {
    let first = frames.first().ok_or("cannot collate an empty frame list")?;
    let shape = first.shape();

    if ragged {
        let arrays = frames
            .into_iter()
            .map(frame_to_array)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(match backend {
            BatchBackend::Array => FrameBatch::RaggedArrays(arrays),
            BatchBackend::Tensor => {
                FrameBatch::RaggedTensors(arrays.into_iter().map(hwc_to_chw).collect())
            }
        });
    }

    if let Some(mismatch) = frames.iter().find(|f| f.shape() != shape) {
        return Err(format!(
            "cannot stack frame {} with shape {:?} onto shape {:?}",
            mismatch.index(),
            mismatch.shape(),
            shape
        )
        .into());
    }

    let (height, width, channels) = shape;
    let n = frames.len();
    let mut data = Vec::with_capacity(n * height * width * channels);
    for frame in frames {
        data.extend(frame.into_data());
    }
    let stacked = Array4::from_shape_vec((n, height, width, channels), data)?;

    Ok(match backend {
        BatchBackend::Array => FrameBatch::Array(stacked),
        BatchBackend::Tensor => FrameBatch::Tensor(
            stacked
                .permuted_axes([0, 3, 1, 2])
                .mapv(|v| v as f32 / 255.0),
        ),
    })
}

/// [`default_collate`] with fixed raggedness and backend, as a [`CollateFn`].
pub fn default_collate_fn(ragged: bool, backend: BatchBackend) -> CollateFn {
    Arc::new(move |frames| default_collate(frames, ragged, backend))
}

fn frame_to_array(frame: Frame) -> Result<Array3<u8>, BoxError> {
    let shape = frame.shape();
    Ok(Array3::from_shape_vec(shape, frame.into_data())?)
}

fn hwc_to_chw(array: Array3<u8>) -> Array3<f32> {
    array.permuted_axes([2, 0, 1]).mapv(|v| v as f32 / 255.0)
}
