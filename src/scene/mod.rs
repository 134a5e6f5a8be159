//! Scene description consumed by the render pipeline.
//!
//! Scenes are plain data: the pipeline copies what it needs into each job so that edits made
//! on another thread cannot race with an in-flight render.

/// Per-scene render settings.
pub mod config;
/// Scenes, view layers, cameras and scene-level animation channels.
pub mod model;
/// Compositing node trees.
pub mod nodes;
/// Scene database shared by the pipeline.
pub mod store;
/// Sequencer strips.
pub mod strips;
