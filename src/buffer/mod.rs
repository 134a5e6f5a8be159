//! In-memory frame results: layers of passes, each holding one pixel rectangle per view.

/// The accumulation buffer and its layers and passes.
pub mod accum;
/// Float pixel rectangles.
pub mod image;
/// Metadata stamped onto finished frames.
pub mod stamp;
