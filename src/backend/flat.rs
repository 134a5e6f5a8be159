use rayon::prelude::*;

use crate::{
    backend::engine::{EngineContext, RenderBackend},
    buffer::{accum::{COMBINED_PASS, DEPTH_PASS, pass_layout}, image::ImageRect},
    foundation::{core::PixelRect, error::{JobError, JobResult}},
};

/// Engine name of [`FlatShadeBackend`].
pub const FLAT_ENGINE: &str = "flat";

/// Deterministic CPU backend.
///
/// Fills the combined pass with the scene's world color and the depth pass with a constant,
/// in row tiles spread over a rayon pool sized by the job's thread count. The world color is
/// multiplied by the shutter curve at the frame's subframe when one is configured.
#[derive(Clone, Debug)]
pub struct FlatShadeBackend {
    tile_rows: u32,
    depth: f32,
}

impl Default for FlatShadeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatShadeBackend {
    pub fn new() -> Self {
        Self {
            tile_rows: 32,
            depth: 1.0,
        }
    }

    /// Rows per tile.
    pub fn with_tile_rows(mut self, rows: u32) -> Self {
        self.tile_rows = rows.max(1);
        self
    }

    fn tiles(&self, width: u32, height: u32) -> Vec<PixelRect> {
        (0..height)
            .step_by(self.tile_rows as usize)
            .map(|y0| {
                let y1 = (y0 + self.tile_rows).min(height);
                PixelRect::new(0, y0 as i32, width as i32, y1 as i32)
            })
            .collect()
    }

    fn render_tile(
        &self,
        ctx: &EngineContext<'_>,
        tile: PixelRect,
        layers: &[(String, Vec<String>)],
        views: usize,
        color: [f32; 4],
    ) -> JobResult<()> {
        ctx.highlight(tile, true);
        let (w, h) = (tile.width(), tile.height());
        for (layer, passes) in layers {
            for pass in passes {
                let fill: Vec<f32> = match pass.as_str() {
                    COMBINED_PASS => color.to_vec(),
                    DEPTH_PASS => vec![self.depth],
                    _ => continue,
                };
                let mut pixels = ImageRect::new(w, h, pass_layout(pass).0);
                pixels.fill(&fill);
                for view in 0..views {
                    ctx.write_tile(layer, pass, view, tile.xmin, tile.ymin, &pixels)?;
                }
            }
        }
        ctx.highlight(tile, false);
        ctx.tile_done();
        ctx.update(Some(tile));
        Ok(())
    }
}

impl RenderBackend for FlatShadeBackend {
    fn name(&self) -> &str {
        FLAT_ENGINE
    }

    #[tracing::instrument(skip_all, fields(job = ctx.job().name(), frame = ctx.frame().current))]
    fn render(&self, ctx: &EngineContext<'_>) -> JobResult<()> {
        let rect = ctx.render_rect();
        let layers = ctx.layers();
        let views = ctx.num_views();
        let scene = ctx.scene();
        let shutter = scene
            .render
            .shutter_curve
            .as_ref()
            .map_or(1.0, |curve| curve.evaluate(ctx.frame().subframe));
        let world = scene.world_color;
        let color = [world.r * shutter, world.g * shutter, world.b * shutter, world.a];

        let tiles = self.tiles(rect.width(), rect.height());
        ctx.set_tiles_total(tiles.len() as u32);
        let pool = build_thread_pool(Some(ctx.threads()))?;
        pool.install(|| {
            tiles.par_iter().try_for_each(|tile| {
                if ctx.test_break() {
                    return Ok(());
                }
                self.render_tile(ctx, *tile, &layers, views, color)
            })
        })?;
        ctx.progress(1.0);
        Ok(())
    }
}

/// Rayon pool with `threads` workers, or rayon's default when `None`.
pub fn build_thread_pool(threads: Option<usize>) -> JobResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(JobError::configuration("thread count must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| JobError::backend(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/backend/flat.rs"]
mod tests;
