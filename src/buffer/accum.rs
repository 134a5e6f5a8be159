use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    buffer::{image::ImageRect, stamp::StampData},
    foundation::{core::PixelRect, error::{JobError, JobResult}},
    scene::model::ViewLayer,
};

/// Name of the pass every layer carries.
pub const COMBINED_PASS: &str = "Combined";
/// Name of the single-channel depth pass.
pub const DEPTH_PASS: &str = "Depth";

/// View names shared by every pass of one buffer.
pub type ViewList = Arc<[String]>;

/// Identity of an [`AccumBuffer`] allocation.
///
/// A new id is handed out for every allocation, so comparing ids tells whether a buffer was
/// kept or replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// View list holding one unnamed view.
pub fn single_view() -> ViewList {
    Arc::from(vec![String::new()])
}

/// Channel count and channel id of a known pass name.
pub fn pass_layout(name: &str) -> (u8, &'static str) {
    match name {
        DEPTH_PASS | "Mist" => (1, "Z"),
        "Normal" | "Position" => (3, "XYZ"),
        "Vector" => (4, "XYZW"),
        _ => (4, "RGBA"),
    }
}

/// One named pass: a pixel rectangle per view.
#[derive(Clone, Debug)]
pub struct BufferPass {
    pub name: String,
    pub channels: u8,
    pub chan_id: String,
    views: ViewList,
    rects: Vec<ImageRect>,
}

impl BufferPass {
    fn new(name: &str, views: &ViewList, width: u32, height: u32) -> Self {
        let (channels, chan_id) = pass_layout(name);
        Self {
            name: name.to_string(),
            channels,
            chan_id: chan_id.to_string(),
            views: Arc::clone(views),
            rects: views
                .iter()
                .map(|_| ImageRect::new(width, height, channels))
                .collect(),
        }
    }

    pub fn views(&self) -> &ViewList {
        &self.views
    }

    pub fn rect(&self, view: usize) -> Option<&ImageRect> {
        self.rects.get(view)
    }

    pub fn rect_mut(&mut self, view: usize) -> Option<&mut ImageRect> {
        self.rects.get_mut(view)
    }

    pub fn rects(&self) -> &[ImageRect] {
        &self.rects
    }
}

/// One named layer of passes.
#[derive(Clone, Debug)]
pub struct BufferLayer {
    pub name: String,
    passes: Vec<BufferPass>,
}

impl BufferLayer {
    pub fn passes(&self) -> &[BufferPass] {
        &self.passes
    }

    pub fn pass(&self, name: &str) -> Option<&BufferPass> {
        self.passes.iter().find(|p| p.name == name)
    }

    pub fn pass_mut(&mut self, name: &str) -> Option<&mut BufferPass> {
        self.passes.iter_mut().find(|p| p.name == name)
    }

    /// The [`COMBINED_PASS`] of this layer.
    pub fn combined(&self) -> Option<&BufferPass> {
        self.pass(COMBINED_PASS)
    }
}

/// Pixels of one frame: layers of passes, each pass holding one rectangle per view, plus an
/// optional composited image per view.
///
/// Every pass rectangle has the buffer's dimensions. The view list is shared by reference
/// between the buffer and all of its passes.
#[derive(Debug)]
pub struct AccumBuffer {
    id: BufferId,
    width: u32,
    height: u32,
    xof: i32,
    yof: i32,
    tile_rect: PixelRect,
    views: ViewList,
    layers: Vec<BufferLayer>,
    view_images: Vec<Option<ImageRect>>,
    stamp: Option<StampData>,
}

impl AccumBuffer {
    /// Empty buffer with one unnamed view and no layers.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::with_views(width, height, single_view())
    }

    /// Empty buffer with the given views and no layers.
    pub fn with_views(width: u32, height: u32, views: ViewList) -> Self {
        Self {
            id: BufferId::next(),
            width,
            height,
            xof: 0,
            yof: 0,
            tile_rect: PixelRect::from_size(width, height),
            view_images: vec![None; views.len()],
            views,
            layers: Vec::new(),
            stamp: None,
        }
    }

    /// Buffer covering `rect` of the full frame, with one layer per render-enabled view layer.
    ///
    /// With `single_layer` set only that layer is allocated.
    pub fn for_render(
        rect: PixelRect,
        views: ViewList,
        layers: &[ViewLayer],
        single_layer: Option<&str>,
    ) -> Self {
        let mut out = Self::with_views(rect.width(), rect.height(), views);
        out.xof = rect.xmin;
        out.yof = rect.ymin;
        out.tile_rect = rect;
        let selected = layers.iter().filter(|l| match single_layer {
            Some(name) => l.name == name,
            None => l.use_for_render,
        });
        for layer in selected {
            out.add_layer(&layer.name, &layer.passes);
        }
        out
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Where this buffer sits within the full frame.
    pub fn offset(&self) -> (i32, i32) {
        (self.xof, self.yof)
    }

    pub fn set_offset(&mut self, xof: i32, yof: i32) {
        self.xof = xof;
        self.yof = yof;
    }

    /// Full-frame rectangle this buffer was rendered for.
    pub fn tile_rect(&self) -> PixelRect {
        self.tile_rect
    }

    pub fn set_tile_rect(&mut self, rect: PixelRect) {
        self.tile_rect = rect;
    }

    pub fn views(&self) -> &ViewList {
        &self.views
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn view_index(&self, name: &str) -> Option<usize> {
        self.views.iter().position(|v| v == name)
    }

    pub fn layers(&self) -> &[BufferLayer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&BufferLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut BufferLayer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layer(name).is_some()
    }

    /// Layer named `name`, else the first layer.
    pub fn active_layer(&self, name: Option<&str>) -> Option<&BufferLayer> {
        name.and_then(|n| self.layer(n))
            .or_else(|| self.layers.first())
    }

    /// Add a layer holding [`COMBINED_PASS`] plus `passes`, sized to the buffer.
    ///
    /// An existing layer of the same name is returned unchanged.
    pub fn add_layer(&mut self, name: &str, passes: &[String]) -> &mut BufferLayer {
        let idx = match self.layers.iter().position(|l| l.name == name) {
            Some(idx) => idx,
            None => {
                let mut layer = BufferLayer {
                    name: name.to_string(),
                    passes: vec![BufferPass::new(
                        COMBINED_PASS,
                        &self.views,
                        self.width,
                        self.height,
                    )],
                };
                for pass in passes.iter().filter(|p| p.as_str() != COMBINED_PASS) {
                    if layer.pass(pass).is_none() {
                        layer
                            .passes
                            .push(BufferPass::new(pass, &self.views, self.width, self.height));
                    }
                }
                self.layers.push(layer);
                self.layers.len() - 1
            }
        };
        &mut self.layers[idx]
    }

    /// Insert or replace a layer taken from a buffer of identical size and views.
    pub fn insert_layer(&mut self, mut layer: BufferLayer) -> JobResult<()> {
        for pass in &mut layer.passes {
            if pass.rects.len() != self.views.len() {
                return Err(JobError::backend(format!(
                    "layer '{}' has {} views, buffer has {}",
                    layer.name,
                    pass.rects.len(),
                    self.views.len()
                )));
            }
            if pass
                .rects
                .iter()
                .any(|r| r.width != self.width || r.height != self.height)
            {
                return Err(JobError::backend(format!(
                    "layer '{}' does not match buffer size {}x{}",
                    layer.name, self.width, self.height
                )));
            }
            pass.views = Arc::clone(&self.views);
        }
        match self.layers.iter_mut().find(|l| l.name == layer.name) {
            Some(slot) => *slot = layer,
            None => self.layers.push(layer),
        }
        Ok(())
    }

    pub fn take_layer(&mut self, name: &str) -> Option<BufferLayer> {
        let idx = self.layers.iter().position(|l| l.name == name)?;
        Some(self.layers.remove(idx))
    }

    /// Replace the view list, reallocating every pass and dropping composited images.
    pub fn set_views(&mut self, views: ViewList) {
        if *self.views == *views {
            return;
        }
        for layer in &mut self.layers {
            for pass in &mut layer.passes {
                *pass = BufferPass::new(&pass.name, &views, self.width, self.height);
            }
        }
        self.view_images = vec![None; views.len()];
        self.views = views;
    }

    /// Composited (or sequencer) pixels of a view.
    pub fn view_image(&self, view: usize) -> Option<&ImageRect> {
        self.view_images.get(view).and_then(Option::as_ref)
    }

    /// Store composited pixels for a view; the image must match the buffer size.
    pub fn set_view_image(&mut self, view: usize, image: ImageRect) -> JobResult<()> {
        if image.width != self.width || image.height != self.height {
            return Err(JobError::backend(format!(
                "view image {}x{} does not match buffer {}x{}",
                image.width, image.height, self.width, self.height
            )));
        }
        let slot = self
            .view_images
            .get_mut(view)
            .ok_or_else(|| JobError::backend(format!("view index {view} out of range")))?;
        *slot = Some(image);
        Ok(())
    }

    /// Replace a view's composited pixels with zeroed RGBA.
    pub fn fill_view_zero(&mut self, view: usize) {
        let (w, h) = (self.width, self.height);
        if let Some(slot) = self.view_images.get_mut(view) {
            match slot {
                Some(img) if img.width == w && img.height == h => img.clear(),
                _ => *slot = Some(ImageRect::new(w, h, 4)),
            }
        }
    }

    /// Pixels shown for `view`: the composited image when present, else the combined pass of
    /// the active layer.
    pub fn display_image(&self, view: usize, layer: Option<&str>) -> Option<&ImageRect> {
        self.view_image(view).or_else(|| {
            self.active_layer(layer)
                .and_then(BufferLayer::combined)
                .and_then(|p| p.rect(view))
        })
    }

    /// Copy `tile` into one pass rectangle at `(x, y)` of this buffer.
    pub fn write_tile(
        &mut self,
        layer: &str,
        pass: &str,
        view: usize,
        x: i32,
        y: i32,
        tile: &ImageRect,
    ) -> JobResult<()> {
        let rect = self
            .layer_mut(layer)
            .and_then(|l| l.pass_mut(pass))
            .and_then(|p| p.rect_mut(view))
            .ok_or_else(|| {
                JobError::backend(format!("no pass '{layer}/{pass}' for view {view}"))
            })?;
        rect.blit(tile, x, y)
    }

    /// New buffer of `full_width * full_height` holding this buffer's pixels at its tile
    /// position; the rest is zero.
    pub fn uncropped(&self, full_width: u32, full_height: u32) -> JobResult<AccumBuffer> {
        let mut out = AccumBuffer::with_views(full_width, full_height, Arc::clone(&self.views));
        let (dx, dy) = (self.tile_rect.xmin, self.tile_rect.ymin);
        for layer in &self.layers {
            let names: Vec<String> = layer
                .passes
                .iter()
                .filter(|p| p.name != COMBINED_PASS)
                .map(|p| p.name.clone())
                .collect();
            let dst = out.add_layer(&layer.name, &names);
            for src_pass in &layer.passes {
                let Some(dst_pass) = dst.pass_mut(&src_pass.name) else {
                    continue;
                };
                for (dst_rect, src_rect) in dst_pass.rects.iter_mut().zip(&src_pass.rects) {
                    dst_rect.blit(src_rect, dx, dy)?;
                }
            }
        }
        for (view, img) in self.view_images.iter().enumerate() {
            if let Some(img) = img {
                let mut full = ImageRect::new(full_width, full_height, img.channels);
                full.blit(img, dx, dy)?;
                out.view_images[view] = Some(full);
            }
        }
        out.stamp = self.stamp.clone();
        Ok(out)
    }

    /// Move every layer of `other` into this buffer, replacing same-named layers.
    pub fn merge_layers_from(&mut self, other: AccumBuffer) -> JobResult<()> {
        if other.size() != self.size() {
            return Err(JobError::backend(format!(
                "cannot merge {}x{} result into {}x{}",
                other.width, other.height, self.width, self.height
            )));
        }
        for layer in other.layers {
            self.insert_layer(layer)?;
        }
        Ok(())
    }

    /// Return `true` when every pass holds one full-size rectangle per view.
    pub fn is_consistent(&self) -> bool {
        self.view_images.len() == self.views.len()
            && self.layers.iter().all(|l| {
                !l.passes.is_empty()
                    && l.passes.iter().all(|p| {
                        Arc::ptr_eq(&p.views, &self.views)
                            && p.rects.len() == self.views.len()
                            && p.rects
                                .iter()
                                .all(|r| r.width == self.width && r.height == self.height)
                    })
            })
    }

    pub fn stamp(&self) -> Option<&StampData> {
        self.stamp.as_ref()
    }

    pub fn stamp_mut(&mut self) -> &mut StampData {
        self.stamp.get_or_insert_with(StampData::new)
    }

    pub fn set_stamp(&mut self, stamp: Option<StampData>) {
        self.stamp = stamp;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/accum.rs"]
mod tests;
