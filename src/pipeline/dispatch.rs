use std::sync::Arc;

use crate::{
    backend::engine::{EngineContext, RenderBackend},
    buffer::{accum::{AccumBuffer, ViewList}, stamp::{StampContext, StampData}},
    foundation::error::{JobError, JobResult},
    job::job::{JobState, RenderJob},
    pipeline::Pipeline,
    scene::{config::RenderConfig, model::Scene, store::SceneStore},
};

/// Top-level strategy that produced a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A backend that owns the whole frame.
    Engine,
    /// Sequencer strips.
    Sequencer,
    /// Engine render followed by node-tree compositing.
    Compositor,
}

pub(crate) fn view_list(config: &RenderConfig) -> ViewList {
    config.view_names().into()
}

/// Release the run-scoped resources of `job`, keeping the backend only when persistent data is
/// on and the backend supports it.
pub(crate) fn release_pipeline(job: &RenderJob) {
    let keep = job.settings().config.persistent_data
        && job.engine().is_some_and(|e| e.supports_persistent_data());
    job.free_pipeline(keep);
}

impl Pipeline {
    /// Backend for `engine`, reusing the one the job retained when the names match.
    pub(crate) fn backend_for(
        &self,
        job: &RenderJob,
        engine: &str,
    ) -> JobResult<Arc<dyn RenderBackend>> {
        if let Some(existing) = job.engine() {
            if existing.name() == engine {
                return Ok(existing);
            }
            job.free_engine();
        }
        let Some(backend) = self.services.backends.create(engine) else {
            job.reports()
                .error(format!("Unknown render engine \"{engine}\""));
            return Err(JobError::configuration(format!("unknown engine '{engine}'")));
        };
        job.set_engine(Some(Arc::clone(&backend)));
        Ok(backend)
    }

    /// Render the scene's layers with the configured backend, then uncrop.
    #[tracing::instrument(skip_all, fields(job = job.name()))]
    pub(crate) fn render_engine(&self, job: &RenderJob, scene: &Scene) -> JobResult<()> {
        let settings = job.settings();
        let camera = settings
            .camera_override
            .clone()
            .or_else(|| scene.resolve_camera().map(str::to_string));
        let Some(camera) = camera else {
            job.reports().error("Cannot render, no camera");
            job.set_state(JobState::Failed);
            return Err(JobError::validation(format!(
                "scene \"{}\" has no camera",
                scene.id
            )));
        };

        let views = view_list(&settings.config);
        let single = settings.single_layer_name();
        {
            let mut result = job.acquire_result_write();
            let keep = settings.config.pipeline.preview
                && result.as_ref().is_some_and(|buf| {
                    buf.size() == settings.render_size() && buf.views() == &views
                });
            if keep {
                if let Some(buf) = result.as_mut() {
                    let missing = settings.view_layers.iter().filter(|l| {
                        let wanted = match single {
                            Some(name) => l.name == name,
                            None => l.use_for_render,
                        };
                        wanted && !buf.has_layer(&l.name)
                    });
                    let missing: Vec<_> = missing.collect();
                    for layer in missing {
                        buf.add_layer(&layer.name, &layer.passes);
                    }
                }
            } else {
                *result = Some(AccumBuffer::for_render(
                    settings.disprect,
                    views,
                    &settings.view_layers,
                    single,
                ));
            }
        }

        let backend = self.backend_for(job, &settings.config.engine)?;
        job.current_scene_update(&scene.id);
        job.set_engine_busy(true);
        let rendered = {
            let ctx = EngineContext::new(job, scene, &camera, settings.frame);
            backend.render(&ctx)
        };
        job.set_engine_busy(false);
        match rendered {
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                job.reports()
                    .error(format!("Render engine \"{}\" failed: {err}", backend.name()));
                return Err(err);
            }
            Ok(()) => {}
        }

        self.uncrop(job)
    }

    /// Put a border render back into the full frame.
    ///
    /// Without crop the rendered rectangle is copied into a new full-frame buffer, zero
    /// elsewhere. With crop only the frame offset is reset.
    pub(crate) fn uncrop(&self, job: &RenderJob) -> JobResult<()> {
        let settings = job.settings();
        if !settings.config.border_active() {
            return Ok(());
        }
        if settings.config.crop {
            if let Some(buf) = job.acquire_result_write().as_mut() {
                buf.set_offset(0, 0);
            }
            return Ok(());
        }

        {
            let mut result = job.acquire_result_write();
            let Some(buf) = result.as_ref() else {
                return Ok(());
            };
            if buf.size() == (settings.winx, settings.winy) {
                return Ok(());
            }
            let full = buf.uncropped(settings.winx, settings.winy)?;
            *result = Some(full);
        }
        tracing::debug!(
            job = job.name(),
            winx = settings.winx,
            winy = settings.winy,
            "uncropped border render"
        );
        job.display_init();
        job.display_update(None);
        Ok(())
    }

    /// Run one frame through the phase chosen for the scene and stamp the result.
    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene.id, frame = scene.frame.current))]
    pub(crate) fn render_full_pipeline(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &Scene,
    ) -> JobResult<Phase> {
        job.current_scene_update(&scene.id);
        job.update_stats(|s| s.begin_frame(&scene.id.name, scene.frame.current));

        let config = job.settings().config;
        let backend = self.backend_for(job, &config.engine)?;
        let phase = if backend.supports_full_override() {
            self.render_engine(job, scene)?;
            if job.has_single_layer() {
                job.pop_single_layer_result(job.test_break())?;
            }
            Phase::Engine
        } else if scene.sequencer_active() {
            if !job.test_break() {
                self.render_sequencer(store, job, scene)?;
            }
            job.stats_draw();
            job.display_update(None);
            Phase::Sequencer
        } else {
            self.render_compositor(store, job, scene)?;
            Phase::Compositor
        };

        let elapsed = job.update_stats(|s| {
            s.last_frame_time = s.elapsed();
            s.last_frame_time
        });
        job.stats_draw();

        let strip_stamped = phase == Phase::Sequencer && config.stamp.strip_metadata;
        if !strip_stamped && !job.test_break() && config.stamp.enabled {
            let camera = job
                .settings()
                .camera_override
                .or_else(|| scene.resolve_camera().map(str::to_string));
            let stamp = StampData::from_settings(
                &config.stamp,
                &StampContext {
                    frame: scene.frame.current,
                    fps: config.frames.fps(),
                    scene: &scene.id.name,
                    camera: camera.as_deref(),
                    render_time: Some(elapsed),
                },
            );
            if let Some(buf) = job.acquire_result_write().as_mut() {
                buf.set_stamp(Some(stamp));
            }
        }
        tracing::debug!(?phase, ?elapsed, "frame rendered");
        Ok(phase)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/dispatch.rs"]
mod tests;
