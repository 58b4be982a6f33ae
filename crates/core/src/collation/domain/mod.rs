pub mod chunk_collator;
pub mod frame_batch;
