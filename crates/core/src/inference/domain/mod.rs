pub mod image_model;
pub mod label;
pub mod sample_collection;
