use crate::foundation::error::{JobError, JobResult};

pub use kurbo::Rect;

/// Integer pixel rectangle `[xmin, xmax) x [ymin, ymax)` in full-frame coordinates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PixelRect {
    /// Inclusive left edge.
    pub xmin: i32,
    /// Inclusive top edge; row 0 is the first stored row.
    pub ymin: i32,
    /// Exclusive right edge.
    pub xmax: i32,
    /// Exclusive bottom edge.
    pub ymax: i32,
}

impl PixelRect {
    /// Create a rectangle from its edges.
    pub const fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Rectangle anchored at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Scale a normalized border rectangle to a `winx * winy` frame.
    ///
    /// Edges are truncated towards zero, matching how partial-frame renders have always
    /// computed their display rectangle.
    pub fn from_border(border: Rect, winx: u32, winy: u32) -> Self {
        Self {
            xmin: (border.x0 * f64::from(winx)) as i32,
            xmax: (border.x1 * f64::from(winx)) as i32,
            ymin: (border.y0 * f64::from(winy)) as i32,
            ymax: (border.y1 * f64::from(winy)) as i32,
        }
    }

    /// Width in pixels, zero when degenerate.
    pub fn width(self) -> u32 {
        (self.xmax - self.xmin).max(0) as u32
    }

    /// Height in pixels, zero when degenerate.
    pub fn height(self) -> u32 {
        (self.ymax - self.ymin).max(0) as u32
    }

    /// Return `true` when the rectangle covers no pixels.
    pub fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Return `true` when `(x, y)` lies inside.
    pub fn contains(self, x: i32, y: i32) -> bool {
        self.xmin <= x && x < self.xmax && self.ymin <= y && y < self.ymax
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let r = Self {
            xmin: self.xmin.max(other.xmin),
            ymin: self.ymin.max(other.ymin),
            xmax: self.xmax.min(other.xmax),
            ymax: self.ymax.min(other.ymax),
        };
        (!r.is_empty()).then_some(r)
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.xmin + dx, self.ymin + dy, self.xmax + dx, self.ymax + dy)
    }
}

/// Straight-alpha RGBA color with float channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rgba {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Rgba {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Build a color from its channels.
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Channels as an array.
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Validate a normalized border rectangle.
pub fn validate_border(border: Rect) -> JobResult<()> {
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);
    if !(in_unit(border.x0) && in_unit(border.x1) && in_unit(border.y0) && in_unit(border.y1)) {
        return Err(JobError::validation("border must lie inside [0, 1]"));
    }
    Ok(())
}

/// Return `true` when a normalized border does not select any area.
pub fn border_is_degenerate(border: Rect) -> bool {
    border.x1 <= border.x0 || border.y1 <= border.y0
}

/// Return `true` when a normalized border covers the whole frame.
pub fn border_is_full_frame(border: Rect) -> bool {
    border.x0 == 0.0 && border.x1 == 1.0 && border.y0 == 0.0 && border.y1 == 1.0
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
