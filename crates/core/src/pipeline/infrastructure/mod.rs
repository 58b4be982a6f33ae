pub mod threaded_frame_loader;
