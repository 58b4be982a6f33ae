use std::path::Path;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use crate::decoding::domain::video_decoder::{DecoderFactory, VideoDecoder};
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Opens [`FfmpegDecoder`]s. Stateless, so one instance serves all workers.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegDecoderFactory;

impl FfmpegDecoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderFactory for FfmpegDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>, BoxError> {
        Ok(Box::new(FfmpegDecoder::open(path)?))
    }
}

/// Decodes the best video stream of a file to RGB24 frames via ffmpeg-next.
///
/// Owns the demuxer, codec, and scaler so the decode position survives
/// between `next_frame` calls.
pub struct FfmpegDecoder {
    state: Option<DecodeState>,
    metadata: VideoMetadata,
}

struct DecodeState {
    ictx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

// Safety: an FfmpegDecoder is owned by a single worker's cache and is only
// ever touched from that worker's thread. The raw pointers inside ffmpeg
// types are never shared.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, BoxError> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg_next::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            state: Some(DecodeState {
                ictx,
                decoder,
                scaler,
                video_stream_index,
                frame_index: 0,
                flushing: false,
                done: false,
            }),
            metadata,
        })
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, BoxError> {
        let Some(state) = self.state.as_mut() else {
            return Err("FfmpegDecoder: already closed".into());
        };
        let (width, height) = (self.metadata.width, self.metadata.height);
        state.next_frame(width, height)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.state = None;
        Ok(())
    }
}

impl DecodeState {
    fn next_frame(&mut self, width: u32, height: u32) -> Result<Option<Frame>, BoxError> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive(width, height)? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let next = self.ictx.packets().next();
            let Some((stream, packet)) = next else {
                self.decoder.send_eof()?;
                self.flushing = true;
                let frame = self.try_receive(width, height)?;
                if frame.is_none() {
                    self.done = true;
                }
                return Ok(frame);
            };

            let stream_index = stream.index();
            if stream_index != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {e}");
                continue;
            }

            if let Some(frame) = self.try_receive(width, height)? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self, width: u32, height: u32) -> Result<Option<Frame>, BoxError> {
        let mut decoded = VideoFrame::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut rgb_frame = VideoFrame::empty();
        self.scaler.run(&decoded, &mut rgb_frame)?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Copies pixel data into a tightly packed RGB buffer, dropping the
/// per-row padding ffmpeg adds when stride > width * 3.
fn extract_rgb_pixels(rgb_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}
