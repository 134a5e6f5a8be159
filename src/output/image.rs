use std::path::Path;

use anyhow::Context as _;

use crate::{
    buffer::image::ImageRect,
    foundation::error::{JobError, JobResult},
    output::ensure_parent_dir,
    scene::config::OutputFormat,
};

fn image_format(format: OutputFormat) -> JobResult<image::ImageFormat> {
    match format {
        OutputFormat::Png => Ok(image::ImageFormat::Png),
        OutputFormat::Jpeg => Ok(image::ImageFormat::Jpeg),
        OutputFormat::Bmp => Ok(image::ImageFormat::Bmp),
        OutputFormat::Tiff => Ok(image::ImageFormat::Tiff),
        OutputFormat::Ffmpeg => Err(JobError::output(
            "movie formats cannot be written as still images",
        )),
    }
}

/// Write straight-alpha RGBA8 pixels. Formats without alpha drop the channel.
pub fn write_rgba8(
    path: &Path,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    format: OutputFormat,
) -> JobResult<()> {
    let fmt = image_format(format)?;
    let img = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        JobError::output(format!("pixel data does not match {width}x{height} RGBA8"))
    })?;
    ensure_parent_dir(path)?;
    let img = image::DynamicImage::ImageRgba8(img);
    let img = match format {
        OutputFormat::Jpeg | OutputFormat::Bmp => image::DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    img.save_with_format(path, fmt)
        .with_context(|| format!("write image '{}'", path.display()))?;
    Ok(())
}

/// Encode a float image to 8-bit sRGB and write it.
pub fn write_image(path: &Path, image: &ImageRect, format: OutputFormat) -> JobResult<()> {
    write_rgba8(path, image.width, image.height, image.to_rgba8(), format)
}

#[cfg(test)]
#[path = "../../tests/unit/output/image.rs"]
mod tests;
