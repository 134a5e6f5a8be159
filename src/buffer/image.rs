use crate::{
    foundation::{core::PixelRect, error::{JobError, JobResult}},
};

/// Tightly packed float pixel rectangle, row-major, `channels` floats per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRect {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Floats per pixel (1, 3 or 4).
    pub channels: u8,
    /// Pixel data, `width * height * channels` floats.
    pub data: Vec<f32>,
}

impl ImageRect {
    /// Zero-filled rectangle.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width as usize * height as usize * channels as usize],
        }
    }

    /// Rectangle filled with one RGBA value.
    pub fn filled(width: u32, height: u32, rgba: [f32; 4]) -> Self {
        let mut img = Self::new(width, height, 4);
        img.fill(&rgba);
        img
    }

    /// Wrap existing data, checking its length.
    pub fn from_data(width: u32, height: u32, channels: u8, data: Vec<f32>) -> JobResult<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(JobError::backend(format!(
                "pixel data size mismatch: got {}, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Row stride in floats.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Channels of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let c = self.channels as usize;
        let i = (y as usize * self.width as usize + x as usize) * c;
        &self.data[i..i + c]
    }

    /// Set every pixel to `value` (extra channels of `value` are ignored).
    pub fn fill(&mut self, value: &[f32]) {
        let c = self.channels as usize;
        for px in self.data.chunks_exact_mut(c) {
            for (dst, src) in px.iter_mut().zip(value.iter()) {
                *dst = *src;
            }
        }
    }

    /// Zero every channel.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Return `true` when every channel of every pixel is zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0)
    }

    /// Copy `src` so that its origin lands at `(dx, dy)`, clipped to this rectangle.
    ///
    /// Channel counts must match.
    pub fn blit(&mut self, src: &ImageRect, dx: i32, dy: i32) -> JobResult<()> {
        if src.channels != self.channels {
            return Err(JobError::backend(format!(
                "channel mismatch: {} into {}",
                src.channels, self.channels
            )));
        }
        let dst_rect = PixelRect::from_size(self.width, self.height);
        let placed = PixelRect::from_size(src.width, src.height).offset(dx, dy);
        let Some(clip) = dst_rect.intersect(placed) else {
            return Ok(());
        };
        let c = self.channels as usize;
        let row_len = clip.width() as usize * c;
        for y in clip.ymin..clip.ymax {
            let sx = (clip.xmin - dx) as usize;
            let sy = (y - dy) as usize;
            let s0 = (sy * src.width as usize + sx) * c;
            let d0 = (y as usize * self.width as usize + clip.xmin as usize) * c;
            self.data[d0..d0 + row_len].copy_from_slice(&src.data[s0..s0 + row_len]);
        }
        Ok(())
    }

    /// Copy out the `rect` sub-region.
    pub fn crop(&self, rect: PixelRect) -> Option<ImageRect> {
        let clip = PixelRect::from_size(self.width, self.height).intersect(rect)?;
        let mut out = ImageRect::new(clip.width(), clip.height(), self.channels);
        let c = self.channels as usize;
        let row_len = clip.width() as usize * c;
        for (row, y) in (clip.ymin..clip.ymax).enumerate() {
            let s0 = (y as usize * self.width as usize + clip.xmin as usize) * c;
            let d0 = row * row_len;
            out.data[d0..d0 + row_len].copy_from_slice(&self.data[s0..s0 + row_len]);
        }
        Some(out)
    }

    /// Expand to four channels (gray and RGB become opaque RGBA).
    pub fn to_rgba(&self) -> ImageRect {
        if self.channels == 4 {
            return self.clone();
        }
        let mut out = ImageRect::new(self.width, self.height, 4);
        let c = self.channels as usize;
        for (dst, src) in out.data.chunks_exact_mut(4).zip(self.data.chunks_exact(c)) {
            match c {
                1 => dst.copy_from_slice(&[src[0], src[0], src[0], 1.0]),
                3 => dst.copy_from_slice(&[src[0], src[1], src[2], 1.0]),
                _ => {
                    let n = c.min(4);
                    dst[..n].copy_from_slice(&src[..n]);
                    dst[3] = if c >= 4 { src[3] } else { 1.0 };
                }
            }
        }
        out
    }

    /// Quantize to straight-alpha RGBA8, encoding color channels to sRGB.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let rgba = self.to_rgba();
        let mut out = Vec::with_capacity(rgba.data.len());
        for px in rgba.data.chunks_exact(4) {
            for v in &px[..3] {
                out.push(quantize(linear_to_srgb(*v)));
            }
            out.push(quantize(px[3]));
        }
        out
    }

    /// Convert color channels from sRGB to linear in place.
    pub fn srgb_to_linear_in_place(&mut self) {
        let c = self.channels as usize;
        let color = c.min(3);
        for px in self.data.chunks_exact_mut(c) {
            for v in &mut px[..color] {
                *v = srgb_to_linear(*v);
            }
        }
    }

    /// Convert color channels from linear to sRGB in place.
    pub fn linear_to_srgb_in_place(&mut self) {
        let c = self.channels as usize;
        let color = c.min(3);
        for px in self.data.chunks_exact_mut(c) {
            for v in &mut px[..color] {
                *v = linear_to_srgb(*v);
            }
        }
    }

    /// Straight-alpha "over": draw `top` onto this image. Both must be same-sized RGBA.
    pub fn alpha_over(&mut self, top: &ImageRect) -> JobResult<()> {
        if self.channels != 4 || top.channels != 4 {
            return Err(JobError::backend("alpha over needs RGBA images"));
        }
        if (self.width, self.height) != (top.width, top.height) {
            return Err(JobError::backend(format!(
                "alpha over size mismatch: {}x{} onto {}x{}",
                top.width, top.height, self.width, self.height
            )));
        }
        for (dst, src) in self.data.chunks_exact_mut(4).zip(top.data.chunks_exact(4)) {
            let a = src[3];
            let below = dst[3] * (1.0 - a);
            let out_a = a + below;
            if out_a <= f32::EPSILON {
                dst.fill(0.0);
                continue;
            }
            for i in 0..3 {
                dst[i] = (src[i] * a + dst[i] * below) / out_a;
            }
            dst[3] = out_a;
        }
        Ok(())
    }
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// sRGB transfer function, decode direction.
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB transfer function, encode direction.
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/image.rs"]
mod tests;
