use crate::{
    buffer::image::ImageRect,
    foundation::error::{JobError, JobResult},
    scene::config::{RenderConfig, StereoPacking},
};

/// Size of a packed stereo frame built from two `width * height` eyes.
pub fn stereo_dimensions(packing: StereoPacking, width: u32, height: u32) -> (u32, u32) {
    match packing {
        StereoPacking::SideBySide => (width * 2, height),
        StereoPacking::TopBottom => (width, height * 2),
    }
}

/// Size of each movie frame for a `width * height` render.
pub fn video_dimensions(config: &RenderConfig, width: u32, height: u32) -> (u32, u32) {
    if config.multiview.enabled
        && config.output.views_format == crate::scene::config::OutputViewsFormat::Stereo3d
    {
        stereo_dimensions(config.output.stereo_packing, width, height)
    } else {
        (width, height)
    }
}

/// Pack a left/right pair into one RGBA image.
pub fn pack_stereo(
    left: &ImageRect,
    right: &ImageRect,
    packing: StereoPacking,
) -> JobResult<ImageRect> {
    if (left.width, left.height) != (right.width, right.height) {
        return Err(JobError::output(format!(
            "stereo eyes differ in size: {}x{} and {}x{}",
            left.width, left.height, right.width, right.height
        )));
    }
    let (w, h) = stereo_dimensions(packing, left.width, left.height);
    let mut out = ImageRect::new(w, h, 4);
    let (rx, ry) = match packing {
        StereoPacking::SideBySide => (left.width as i32, 0),
        StereoPacking::TopBottom => (0, left.height as i32),
    };
    out.blit(&left.to_rgba(), 0, 0)?;
    out.blit(&right.to_rgba(), rx, ry)?;
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/output/stereo.rs"]
mod tests;
