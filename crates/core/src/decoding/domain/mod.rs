pub mod decoder_cache;
pub mod video_decoder;
