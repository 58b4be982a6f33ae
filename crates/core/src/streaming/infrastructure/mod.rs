pub mod resize_transform;
