//! File output: path templates, still images, movies and stereo packing.

/// Still image writing through the `image` crate.
pub mod image;
/// Movie writer trait and the system `ffmpeg` writer.
pub mod movie;
/// Output path templates.
pub mod path;
/// Stereo 3D frame packing.
pub mod stereo;

use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::JobResult;

/// Create the parent directory of `path` when missing.
pub fn ensure_parent_dir(path: &Path) -> JobResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
