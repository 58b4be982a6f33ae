use image::imageops::FilterType;

use crate::shared::error::{BoxError, FrameStreamError};
use crate::shared::frame::Frame;
use crate::streaming::domain::frame_transform::FrameTransform;

/// Resizes RGB frames to a fixed size using the `image` crate.
///
/// Gives every frame in a video the same shape, which non-ragged batches
/// require.
#[derive(Clone, Copy, Debug)]
pub struct ResizeTransform {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl ResizeTransform {
    pub fn new(width: u32, height: u32) -> Result<Self, FrameStreamError> {
        if width == 0 || height == 0 {
            return Err(FrameStreamError::Config(format!(
                "resize target must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            filter: FilterType::Triangle,
        })
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameTransform for ResizeTransform {
    fn apply(&self, frame: Frame) -> Result<Frame, BoxError> {
        if frame.channels() != 3 {
            return Err(format!(
                "ResizeTransform expects RGB frames, got {} channels",
                frame.channels()
            )
            .into());
        }
        if (frame.width(), frame.height()) == (self.width, self.height) {
            return Ok(frame);
        }

        let index = frame.index();
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.into_data())
            .ok_or("Failed to create image from frame data")?;
        let resized = image::imageops::resize(&img, self.width, self.height, self.filter);

        Ok(Frame::new(resized.into_raw(), self.width, self.height, 3, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_frame(width: u32, height: u32, value: u8, index: usize) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 3, index)
    }

    #[test]
    fn test_zero_size_is_config_error() {
        assert!(matches!(
            ResizeTransform::new(0, 10),
            Err(FrameStreamError::Config(_))
        ));
    }

    #[test]
    fn test_resizes_and_keeps_index() {
        let transform = ResizeTransform::new(8, 4).unwrap();

        let out = transform.apply(make_frame(32, 16, 90, 7)).unwrap();

        assert_eq!((out.width(), out.height()), (8, 4));
        assert_eq!(out.data().len(), 8 * 4 * 3);
        assert_eq!(out.index(), 7);
    }

    #[test]
    fn test_uniform_frame_stays_uniform() {
        let transform = ResizeTransform::new(5, 5).unwrap();

        let out = transform.apply(make_frame(20, 10, 120, 0)).unwrap();

        assert!(out.data().iter().all(|&v| v == 120));
    }

    #[test]
    fn test_matching_size_passes_through() {
        let transform = ResizeTransform::new(4, 4).unwrap();
        let frame = make_frame(4, 4, 33, 2);

        let out = transform.apply(frame.clone()).unwrap();

        assert_eq!(out, frame);
    }

    #[test]
    fn test_non_rgb_frame_is_rejected() {
        let transform = ResizeTransform::new(4, 4).unwrap();
        let gray = Frame::new(vec![0; 16], 4, 4, 1, 0);

        assert!(transform.apply(gray).is_err());
    }
}
