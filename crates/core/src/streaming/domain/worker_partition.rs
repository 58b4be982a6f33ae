use std::iter::StepBy;
use std::ops::Range;

use crate::shared::error::FrameStreamError;

/// Identity of the current worker within a parallel loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerInfo {
    id: usize,
    num_workers: usize,
}

impl WorkerInfo {
    pub fn new(id: usize, num_workers: usize) -> Result<Self, FrameStreamError> {
        if num_workers == 0 {
            return Err(FrameStreamError::Config(
                "num_workers must be >= 1".to_string(),
            ));
        }
        if id >= num_workers {
            return Err(FrameStreamError::Config(format!(
                "worker id {id} out of range for {num_workers} workers"
            )));
        }
        Ok(Self { id, num_workers })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

/// Indices of the videos a worker is responsible for: `id, id + n, id + 2n,
/// ...`. With no worker info (single-process loading) every index is
/// assigned, in order.
pub fn assigned_indices(len: usize, worker: Option<WorkerInfo>) -> StepBy<Range<usize>> {
    match worker {
        Some(w) => (w.id..len).step_by(w.num_workers),
        None => (0..len).step_by(1),
    }
}
