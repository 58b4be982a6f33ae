use std::path::PathBuf;

/// Stream properties reported by a decoder when it opens a video.
///
/// `total_frames` comes from the container and may be 0 when the container
/// does not record it; chunking never relies on it.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// One-line description used in decoder open/close log messages.
    pub fn describe(&self) -> String {
        let frames = if self.total_frames > 0 {
            format!("{} frames", self.total_frames)
        } else {
            "unknown length".to_string()
        };
        format!(
            "{}x{} {} @ {:.2} fps, {frames}",
            self.width, self.height, self.codec, self.fps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            width: 1920,
            height: 1080,
            fps: 29.97,
            total_frames,
            codec: "h264".to_string(),
            source_path: Some(PathBuf::from("/tmp/test.mp4")),
        }
    }

    #[test]
    fn test_describe_with_known_length() {
        assert_eq!(
            metadata(900).describe(),
            "1920x1080 h264 @ 29.97 fps, 900 frames"
        );
    }

    #[test]
    fn test_describe_with_unknown_length() {
        assert!(metadata(0).describe().ends_with("unknown length"));
    }
}
