//! Render jobs and the registry that owns them.

/// Callback slots invoked by the pipeline.
pub mod callbacks;
/// Job initialization and buffer reuse.
pub mod init;
/// The render job itself.
pub mod job;
/// Process-wide job registry.
pub mod registry;
/// Progress and timing counters.
pub mod stats;
