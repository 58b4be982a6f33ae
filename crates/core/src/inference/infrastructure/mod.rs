pub mod json_sample_store;
pub mod luminance_model;
