use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{
    buffer::{image::ImageRect, stamp::StampData},
    job::job::RenderJob,
    pipeline::{Pipeline, sequencer::SceneStripRequest},
    scene::{model::{Scene, SceneId}, store::SceneStore, strips::StripKind},
};

/// Everything a sequencer renderer sees for one frame of one job.
pub struct SequencerContext<'a> {
    /// Re-entry point for scene strips.
    pub pipeline: &'a Pipeline,
    pub store: &'a SceneStore,
    /// Evaluated scene owning the timeline.
    pub scene: &'a Scene,
    pub job: &'a RenderJob,
    /// Output size of the sequencer image.
    pub width: u32,
    pub height: u32,
}

/// One composited sequencer frame, in sequencer (display) space.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerImage {
    pub image: ImageRect,
    /// Metadata delivered by the strips.
    pub metadata: StampData,
}

/// Sequencer strip renderer.
pub trait SequencerRenderer: Send + Sync {
    /// Composite the timeline of `ctx.scene` at `frame` for one view; `None` when nothing
    /// covers the frame.
    fn render_view(
        &self,
        ctx: &SequencerContext<'_>,
        frame: i32,
        view_id: usize,
    ) -> Option<SequencerImage>;

    /// Convert an image from sequencer space to the render result's linear space.
    fn from_sequencer_space(&self, _image: &mut ImageRect) {}

    /// Drop cached strip images.
    fn free_cache(&self) {}
}

type StripKey = (SceneId, i32, usize);

/// Built-in sequencer: color strips and scene strips, alpha-over from the lowest channel up.
///
/// Works in sRGB. Scene strips re-enter the pipeline and their linear results are encoded to
/// sRGB before blending; rendered strips are cached until [`SequencerRenderer::free_cache`].
#[derive(Debug, Default)]
pub struct StripSequencer {
    cache: Mutex<HashMap<StripKey, ImageRect>>,
    cache_frees: AtomicUsize,
}

impl StripSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the cache was released.
    pub fn cache_frees(&self) -> usize {
        self.cache_frees.load(Ordering::SeqCst)
    }

    pub fn cached_strips(&self) -> usize {
        self.cache.lock().len()
    }

    fn scene_strip(
        &self,
        ctx: &SequencerContext<'_>,
        req: SceneStripRequest<'_>,
    ) -> Option<ImageRect> {
        let key = (req.scene.clone(), req.frame, req.view_id);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Some(hit.clone());
        }
        let mut image = ctx.pipeline.render_scene_strip(ctx, &req)?.to_rgba();
        image.linear_to_srgb_in_place();
        self.cache.lock().insert(key, image.clone());
        Some(image)
    }
}

impl SequencerRenderer for StripSequencer {
    fn render_view(
        &self,
        ctx: &SequencerContext<'_>,
        frame: i32,
        view_id: usize,
    ) -> Option<SequencerImage> {
        let strips = ctx.scene.sequencer.as_ref()?.strips_at(frame);
        let top = strips.first()?;
        let mut metadata = StampData::new();
        metadata.set("Strip", top.name.as_str());

        let mut out = ImageRect::new(ctx.width, ctx.height, 4);
        for strip in strips.iter().rev() {
            let layer = match &strip.kind {
                StripKind::Color { color } => {
                    Some(ImageRect::filled(ctx.width, ctx.height, color.to_array()))
                }
                StripKind::Scene {
                    scene,
                    camera_override,
                    use_sequencer,
                } => self.scene_strip(
                    ctx,
                    SceneStripRequest {
                        scene,
                        camera_override: camera_override.as_deref(),
                        use_sequencer: *use_sequencer,
                        frame: frame - strip.start,
                        view_id,
                    },
                ),
                StripKind::Sound { .. } => None,
            };
            let Some(layer) = layer else {
                continue;
            };
            if let Err(err) = out.alpha_over(&layer) {
                tracing::warn!(strip = %strip.name, "strip skipped: {err}");
            }
        }
        Some(SequencerImage {
            image: out,
            metadata,
        })
    }

    fn from_sequencer_space(&self, image: &mut ImageRect) {
        image.srgb_to_linear_in_place();
    }

    fn free_cache(&self) {
        self.cache.lock().clear();
        self.cache_frees.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/sequencer.rs"]
mod tests;
