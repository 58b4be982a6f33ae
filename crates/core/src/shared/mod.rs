pub mod constants;
pub mod error;
pub mod frame;
pub mod media_type;
pub mod video_metadata;

#[cfg(test)]
pub(crate) mod test_fixtures;
