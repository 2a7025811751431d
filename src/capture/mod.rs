pub mod encode;
pub mod frame;
pub mod pattern;

pub use frame::Frame;
pub use frame::{FrameMetadata, PixelFormat};
pub use pattern::PatternCapture;
