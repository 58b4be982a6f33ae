use crate::shared::error::BoxError;
use crate::shared::frame::Frame;

/// Per-frame preprocessing applied before frames are grouped into chunks.
///
/// Shared by every worker, hence `Send + Sync` and `&self`. Any
/// `Fn(Frame) -> Result<Frame, BoxError>` closure is a transform.
pub trait FrameTransform: Send + Sync {
    fn apply(&self, frame: Frame) -> Result<Frame, BoxError>;
}

impl<F> FrameTransform for F
where
    F: Fn(Frame) -> Result<Frame, BoxError> + Send + Sync,
{
    fn apply(&self, frame: Frame) -> Result<Frame, BoxError> {
        self(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closure_is_a_transform() {
        let invert: Arc<dyn FrameTransform> = Arc::new(|frame: Frame| -> Result<Frame, BoxError> {
            let (w, h, c, i) = (frame.width(), frame.height(), frame.channels(), frame.index());
            let data = frame.into_data().into_iter().map(|v| 255 - v).collect();
            Ok(Frame::new(data, w, h, c, i))
        });

        let out = invert.apply(Frame::new(vec![0, 10, 255], 1, 1, 3, 4)).unwrap();

        assert_eq!(out.data(), &[255, 245, 0]);
        assert_eq!(out.index(), 4);
    }
}
