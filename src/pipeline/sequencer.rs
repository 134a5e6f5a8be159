use std::sync::atomic::Ordering;

use crate::{
    backend::sequencer::{SequencerContext, SequencerImage},
    buffer::{accum::AccumBuffer, image::ImageRect},
    foundation::{error::JobResult, report::ReportLevel},
    job::{job::RenderJob, registry::scene_job_name},
    pipeline::{Pipeline, dispatch::view_list, frame::FrameRequest},
    scene::{config::Resolution, model::{Scene, SceneId}, store::SceneStore},
};

/// A scene strip asking the pipeline for one view of another scene.
#[derive(Clone, Copy, Debug)]
pub struct SceneStripRequest<'a> {
    pub scene: &'a SceneId,
    pub camera_override: Option<&'a str>,
    /// Render the strip scene's own sequencer instead of its layers.
    pub use_sequencer: bool,
    /// Frame relative to the strip start.
    pub frame: i32,
    pub view_id: usize,
}

/// Registry name of the job rendering `scene` for a scene strip.
///
/// Kept apart from the scene's own job so a strip showing the scene being rendered does not
/// overwrite its result.
pub fn strip_job_name(scene: &SceneId) -> String {
    format!("{} [strip]", scene_job_name(scene))
}

fn sequencer_progress(frame: i32, start: i32, end: i32) -> f32 {
    if end == start {
        return 1.0;
    }
    ((frame - start) as f32 / (end - start) as f32).clamp(0.0, 1.0)
}

impl Pipeline {
    /// Fill every view of the job's result from the sequencer.
    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene.id))]
    pub(crate) fn render_sequencer(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &Scene,
    ) -> JobResult<()> {
        let depth = self.seq_depth.fetch_add(1, Ordering::SeqCst);
        let rendered = self.sequence_views(store, job, scene);
        if depth == 0 {
            self.services.sequencer.free_cache();
        }
        self.seq_depth.fetch_sub(1, Ordering::SeqCst);

        let settings = job.settings();
        let frames = settings.config.frames;
        job.progress(sequencer_progress(
            settings.frame.current,
            frames.start,
            frames.end,
        ));
        rendered
    }

    fn sequence_views(&self, store: &SceneStore, job: &RenderJob, scene: &Scene) -> JobResult<()> {
        let settings = job.settings();
        let (width, height) = if settings.config.border_active() && !settings.config.crop {
            (settings.winx, settings.winy)
        } else {
            settings.render_size()
        };
        let views = view_list(&settings.config);
        let ctx = SequencerContext {
            pipeline: self,
            store,
            scene,
            job,
            width,
            height,
        };

        let renderer = &self.services.sequencer;
        let images: Vec<Option<SequencerImage>> = (0..views.len())
            .map(|view_id| {
                let mut out = renderer.render_view(&ctx, settings.frame.current, view_id)?;
                renderer.from_sequencer_space(&mut out.image);
                Some(out)
            })
            .collect();

        let strip_metadata = settings.config.stamp.strip_metadata;
        {
            let mut result = job.acquire_result_write();
            let reuse = result.as_ref().is_some_and(|buf| buf.size() == (width, height));
            if !reuse {
                *result = Some(AccumBuffer::with_views(width, height, views.clone()));
            }
            if let Some(buf) = result.as_mut() {
                buf.set_views(views.clone());
                for (view_id, image) in images.into_iter().enumerate() {
                    let Some(seq) = image else {
                        buf.fill_view_zero(view_id);
                        continue;
                    };
                    if let Err(err) = buf.set_view_image(view_id, seq.image) {
                        tracing::warn!(view_id, "sequencer image rejected: {err}");
                        buf.fill_view_zero(view_id);
                        continue;
                    }
                    if strip_metadata {
                        buf.stamp_mut().merge_missing(&seq.metadata);
                    }
                }
            }
        }

        for view in views.iter() {
            job.set_active_view(view);
            job.display_update(None);
        }
        Ok(())
    }

    /// Render one view of a scene strip's scene and return its displayed pixels.
    ///
    /// Runs the full frame pipeline in a dedicated job sized to the sequencer output, sharing
    /// the calling job's reports and cancellation poll. A strip that would re-enter a sequencer
    /// already on the stack is refused with a warning.
    pub(crate) fn render_scene_strip(
        &self,
        ctx: &SequencerContext<'_>,
        req: &SceneStripRequest<'_>,
    ) -> Option<ImageRect> {
        let Some(mut scene) = ctx.store.snapshot(req.scene) else {
            ctx.job.reports().push(
                ReportLevel::Warning,
                format!("Scene strip references missing scene \"{}\"", req.scene),
            );
            return None;
        };
        {
            let mut stack = self.strip_stack.lock();
            let recursive = req.use_sequencer
                && (*req.scene == ctx.scene.id || stack.contains(req.scene));
            if recursive {
                drop(stack);
                ctx.job.reports().push(
                    ReportLevel::Warning,
                    format!("Recursive scene strip \"{}\" skipped", req.scene),
                );
                return None;
            }
            stack.push(req.scene.clone());
        }

        scene.render.use_border = false;
        scene.render.resolution = Resolution {
            x: ctx.width,
            y: ctx.height,
            percentage: 100,
        };
        scene.render.multiview = ctx.job.settings().config.multiview;
        scene.render.pipeline.sequencer &= req.use_sequencer;
        let frame = scene.render.frames.start + req.frame;

        let job = self.registry.get_or_create(&strip_job_name(req.scene));
        job.set_reports(ctx.job.reports());
        let test_break = ctx.job.callbacks().test_break;
        job.update_callbacks(|slots| slots.test_break = test_break);

        let request = FrameRequest {
            single_layer: None,
            camera_override: req.camera_override.map(str::to_string),
            frame,
            subframe: 0.0,
            write_still: false,
        };
        let rendered = self.run_frame(ctx.store, &job, scene, &request);
        self.strip_stack.lock().pop();

        match rendered {
            Ok(_) => job.acquire_result_image(req.view_id).map(|img| img.to_rgba()),
            Err(err) => {
                tracing::warn!(scene = %req.scene, "scene strip render failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/sequencer.rs"]
mod tests;
