pub mod default_collate;
pub mod error_handling_collate;
