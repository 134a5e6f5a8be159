use crate::{
    buffer::image::ImageRect,
    foundation::{error::JobResult, report::ReportLevel},
    job::{job::RenderJob, registry::{RenderRegistry, scene_job_name}},
    scene::{config::RenderConfig, model::{Scene, SceneId}, nodes::{NodeKind, NodeTree}},
};

/// Stats, progress and cancellation hooks wired to the calling job for one evaluation.
///
/// The hooks only live as long as the request, so nothing stays attached to the evaluator
/// after the call returns.
#[derive(Clone, Copy)]
pub struct CompositeHooks<'a> {
    job: &'a RenderJob,
}

impl<'a> CompositeHooks<'a> {
    pub fn new(job: &'a RenderJob) -> Self {
        Self { job }
    }

    pub fn stats(&self, info: &str) {
        self.job.update_stats(|s| s.info = Some(info.to_string()));
        self.job.stats_draw();
    }

    pub fn progress(&self, value: f32) {
        self.job.progress(value);
    }

    pub fn test_break(&self) -> bool {
        self.job.test_break()
    }
}

/// One node-tree evaluation for one view.
pub struct CompositeRequest<'a> {
    pub scene: &'a Scene,
    pub tree: &'a NodeTree,
    pub config: &'a RenderConfig,
    pub allow_interactive: bool,
    pub view_name: &'a str,
    pub view_id: usize,
    /// Job receiving the composited pixels.
    pub job: &'a RenderJob,
    /// Where render-layer nodes find the results of other scenes.
    pub registry: &'a RenderRegistry,
    pub hooks: CompositeHooks<'a>,
}

/// Compositor node-tree evaluator.
///
/// Failures inside the tree are reported through the job's report sink; the returned error
/// only aborts the current view.
pub trait NodeEvaluator: Send + Sync {
    fn execute(&self, req: &CompositeRequest<'_>) -> JobResult<()>;

    /// Drop cached intermediate images of `tree`.
    fn free_cache(&self, _tree: &NodeTree) {}
}

/// Built-in evaluator.
///
/// Follows the `Composite` node's input chain through filter and group nodes to a render-layer
/// node and copies that layer's combined pixels into the job's composited image for the view.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayerCompositor;

impl LayerCompositor {
    /// `(scene, layer)` feeding the composite node, when the chain reaches a render layer.
    pub fn resolve_source<'t>(
        tree: &'t NodeTree,
        own: &'t SceneId,
    ) -> Option<(&'t SceneId, Option<&'t str>)> {
        let composite = tree.composite_node()?;
        let mut node = tree.input_of(&composite.name)?;
        for _ in 0..tree.nodes.len() {
            match &node.kind {
                NodeKind::RenderLayers { scene, layer } => {
                    return Some((scene.as_ref().unwrap_or(own), layer.as_deref()));
                }
                NodeKind::Filter { .. } | NodeKind::Group { .. } => {
                    node = tree.input_of(&node.name)?;
                }
                _ => return None,
            }
        }
        None
    }

    /// Pixels of `scene`'s layer placed on the target buffer, given as `(size, offset)`.
    fn source_pixels(
        req: &CompositeRequest<'_>,
        scene: &SceneId,
        layer: Option<&str>,
        target: ((u32, u32), (i32, i32)),
    ) -> Option<ImageRect> {
        let source_job;
        let job = if *scene == req.scene.id {
            req.job
        } else {
            source_job = req.registry.find(&scene_job_name(scene))?;
            &*source_job
        };
        let read = job.acquire_result_read();
        let buf = read.as_ref()?;
        let view = buf.view_index(req.view_name).unwrap_or(0);
        let pixels = buf.active_layer(layer)?.combined()?.rect(view)?;
        let (xof, yof) = buf.offset();
        let ((w, h), (txof, tyof)) = target;
        if (pixels.width, pixels.height) == (w, h) {
            return Some(pixels.clone());
        }
        let mut placed = ImageRect::new(w, h, pixels.channels);
        placed.blit(pixels, xof - txof, yof - tyof).ok()?;
        Some(placed)
    }
}

impl NodeEvaluator for LayerCompositor {
    #[tracing::instrument(skip_all, fields(scene = %req.scene.id, view = req.view_name))]
    fn execute(&self, req: &CompositeRequest<'_>) -> JobResult<()> {
        if req.hooks.test_break() {
            return Ok(());
        }
        req.hooks.stats("Compositing");
        let target = req
            .job
            .acquire_result_read()
            .as_ref()
            .map(|buf| (buf.size(), buf.offset()));
        let Some(target) = target else {
            return Ok(());
        };
        let pixels = Self::resolve_source(req.tree, &req.scene.id)
            .and_then(|(scene, layer)| Self::source_pixels(req, scene, layer, target));

        let mut result = req.job.acquire_result_write();
        let Some(buf) = result.as_mut() else {
            return Ok(());
        };
        match pixels {
            Some(pixels) => buf.set_view_image(req.view_id, pixels.to_rgba())?,
            None => {
                buf.fill_view_zero(req.view_id);
                drop(result);
                req.job.reports().push(
                    ReportLevel::Warning,
                    format!(
                        "Compositor in scene \"{}\" has no render layer input",
                        req.scene.id
                    ),
                );
            }
        }
        req.hooks.progress(1.0);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/compositor.rs"]
mod tests;
