pub mod apply_model_use_case;
pub mod frame_loader;
pub mod infrastructure;
pub mod pipeline_logger;
