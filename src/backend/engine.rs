use std::sync::Arc;

use crate::{
    buffer::image::ImageRect,
    foundation::{core::PixelRect, error::{JobError, JobResult}},
    job::job::RenderJob,
    scene::model::{FrameClock, Scene},
};

/// A pixel-producing renderer.
///
/// `render` is synchronous from the pipeline's point of view and fills the job's result
/// through the [`EngineContext`]. Backends poll [`EngineContext::test_break`] inside their tile
/// loops and finish the tile in progress before returning.
pub trait RenderBackend: Send + Sync {
    /// Engine name, matched against `RenderConfig::engine`.
    fn name(&self) -> &str;

    /// Render the current frame.
    fn render(&self, ctx: &EngineContext<'_>) -> JobResult<()>;

    /// Return `true` when this backend renders the frame start to finish, bypassing the
    /// sequencer and compositor phases.
    fn supports_full_override(&self) -> bool {
        false
    }

    /// Return `false` to disable image and movie output for this backend.
    fn image_save_enabled(&self) -> bool {
        true
    }

    /// Return `true` when the backend may be kept alive between renders.
    fn supports_persistent_data(&self) -> bool {
        true
    }

    /// Interactive redraw; returns `true` when something was drawn.
    fn draw(&self, _job: &RenderJob) -> bool {
        false
    }

    /// Teardown of a backend that is not retained.
    fn free(&self) {}
}

/// Creates backends by engine name.
pub trait BackendFactory: Send + Sync {
    fn create(&self, engine: &str) -> Option<Arc<dyn RenderBackend>>;
}

/// Factory for the engines shipped with the crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinBackends;

impl BackendFactory for BuiltinBackends {
    fn create(&self, engine: &str) -> Option<Arc<dyn RenderBackend>> {
        match engine {
            crate::backend::flat::FLAT_ENGINE => {
                Some(Arc::new(crate::backend::flat::FlatShadeBackend::new()))
            }
            _ => None,
        }
    }
}

/// What a backend sees while rendering one frame of one job.
pub struct EngineContext<'a> {
    job: &'a RenderJob,
    scene: &'a Scene,
    camera: &'a str,
    frame: FrameClock,
}

impl<'a> EngineContext<'a> {
    pub fn new(job: &'a RenderJob, scene: &'a Scene, camera: &'a str, frame: FrameClock) -> Self {
        Self {
            job,
            scene,
            camera,
            frame,
        }
    }

    pub fn job(&self) -> &RenderJob {
        self.job
    }

    /// Evaluated scene for this frame.
    pub fn scene(&self) -> &Scene {
        self.scene
    }

    pub fn camera(&self) -> &str {
        self.camera
    }

    pub fn frame(&self) -> FrameClock {
        self.frame
    }

    /// Rectangle of the full frame being rendered.
    pub fn render_rect(&self) -> PixelRect {
        self.job.render_rect()
    }

    pub fn threads(&self) -> usize {
        self.job.thread_count()
    }

    /// `(layer, passes)` allocated in the current result.
    pub fn layers(&self) -> Vec<(String, Vec<String>)> {
        self.job
            .acquire_result_read()
            .as_ref()
            .map(|buf| {
                buf.layers()
                    .iter()
                    .map(|l| {
                        let passes = l.passes().iter().map(|p| p.name.clone()).collect();
                        (l.name.clone(), passes)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn num_views(&self) -> usize {
        self.job
            .acquire_result_read()
            .as_ref()
            .map_or(0, |buf| buf.num_views())
    }

    /// Copy a tile into the result at `(x, y)` relative to the rendered rectangle.
    ///
    /// Holds the result write lock only for the copy.
    pub fn write_tile(
        &self,
        layer: &str,
        pass: &str,
        view: usize,
        x: i32,
        y: i32,
        tile: &ImageRect,
    ) -> JobResult<()> {
        let mut result = self.job.acquire_result_write();
        let buf = result
            .as_mut()
            .ok_or_else(|| JobError::backend("no result buffer to render into"))?;
        buf.write_tile(layer, pass, view, x, y, tile)
    }

    /// Tell viewers that `rect` (relative to the rendered rectangle) changed.
    pub fn update(&self, rect: Option<PixelRect>) {
        self.job.display_update(rect);
    }

    pub fn highlight(&self, rect: PixelRect, on: bool) {
        self.job.highlight_tile(rect, on);
    }

    pub fn progress(&self, value: f32) {
        self.job.progress(value);
    }

    /// Count a finished tile in the job stats.
    pub fn tile_done(&self) {
        self.job.update_stats(|s| s.tiles_done += 1);
    }

    pub fn set_tiles_total(&self, total: u32) {
        self.job.update_stats(|s| s.tiles_total = total);
    }

    pub fn test_break(&self) -> bool {
        self.job.test_break()
    }
}
