//! Firmware image handling.

pub mod frame;

pub use frame::{FrameBuffer, FrameInfo, ImageLayout, declared_frame_size};
