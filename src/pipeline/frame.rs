use std::path::PathBuf;
use std::time::Instant;

use crate::{
    buffer::{image::ImageRect, stamp::format_duration},
    foundation::{core::PixelRect, error::{JobError, JobResult}},
    job::{init::InitRequest, job::{JobState, RenderJob}},
    output::{image::write_image, path::output_paths, stereo::pack_stereo},
    pipeline::{
        Phase, Pipeline, PipelineEvent, dispatch::release_pipeline, validate::is_rendering_allowed,
    },
    scene::{
        config::{OutputViewsFormat, RenderConfig},
        model::{FrameClock, Scene, SceneId},
        store::SceneStore,
    },
};

/// Arguments of [`Pipeline::render_frame`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameRequest {
    /// Render only this view layer.
    pub single_layer: Option<String>,
    pub camera_override: Option<String>,
    pub frame: i32,
    pub subframe: f32,
    /// Write the finished frame to the configured output path.
    pub write_still: bool,
}

impl FrameRequest {
    pub fn new(frame: i32) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub fn with_write_still(mut self, write_still: bool) -> Self {
        self.write_still = write_still;
        self
    }

    pub fn with_single_layer(mut self, layer: impl Into<String>) -> Self {
        self.single_layer = Some(layer.into());
        self
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera_override = Some(camera.into());
        self
    }
}

fn stereo_3d(config: &RenderConfig) -> bool {
    config.multiview.enabled
        && config.output.views_format == OutputViewsFormat::Stereo3d
        && config.num_views() >= 2
}

fn stereo_frame(job: &RenderJob, config: &RenderConfig) -> JobResult<ImageRect> {
    let left = job.acquire_result_image(0).map(|img| img.to_rgba());
    let right = job.acquire_result_image(1).map(|img| img.to_rgba());
    match (left, right) {
        (Some(left), Some(right)) => pack_stereo(&left, &right, config.output.stereo_packing),
        _ => Err(JobError::output("stereo output needs two rendered views")),
    }
}

impl Pipeline {
    /// Size the job for `scene` and (re)initialize it.
    pub(crate) fn init_job(
        &self,
        job: &RenderJob,
        scene: &Scene,
        single_layer: Option<&str>,
    ) -> JobResult<()> {
        let config = &scene.render;
        let (winx, winy) = config.window_size();
        let disprect = config
            .border_active()
            .then(|| PixelRect::from_border(config.border, winx, winy));
        job.init(InitRequest {
            config,
            view_layers: &scene.view_layers,
            single_layer,
            winx,
            winy,
            disprect,
            source: None,
        })?;
        Ok(())
    }

    /// Validation gate, job init and evaluation graph for a new run.
    pub(crate) fn init_from_scene(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &Scene,
        single_layer: Option<&str>,
        camera_override: Option<&str>,
    ) -> JobResult<()> {
        if !is_rendering_allowed(store, scene, single_layer, camera_override, &job.reports()) {
            job.set_state(JobState::Failed);
            return Err(JobError::validation(format!(
                "scene \"{}\" cannot be rendered",
                scene.id
            )));
        }

        let single = single_layer.filter(|name| scene.view_layer_index(name).is_some());
        if single.is_some() {
            job.push_result_for_single_layer();
        }
        if let Err(err) = self.init_job(job, scene, single) {
            if single.is_some() {
                job.pop_single_layer_result(true)?;
            }
            return Err(err);
        }
        job.update_settings(|s| {
            s.scene = Some(scene.id.clone());
            s.frame = scene.frame;
            s.camera_override = camera_override.map(str::to_string);
            s.state = JobState::Validated;
        });

        let layer = single
            .and_then(|name| scene.view_layers.iter().find(|l| l.name == name))
            .or_else(|| scene.default_render_layer());
        match self.services.graphs.build_for_render(scene, layer) {
            Ok(graph) => job.set_graph(Some(graph)),
            Err(err) => {
                job.reports()
                    .error(format!("Cannot build evaluation graph for \"{}\"", scene.id));
                job.set_state(JobState::Failed);
                return Err(err);
            }
        }
        job.set_state(JobState::Rendering);
        Ok(())
    }

    /// Render one frame of `scene`, optionally writing it.
    ///
    /// Moves the stored scene to the requested frame. Fires `Init`, `Pre`, `Post` and then
    /// `Cancel` or `Complete`; a failed validation fires only `Init`. A failed still write
    /// fails the job and is returned.
    pub fn render_frame(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &SceneId,
        req: &FrameRequest,
    ) -> JobResult<Phase> {
        self.registry.clear_stop();
        let shared = store.require(scene)?;
        let snapshot = {
            let mut scene = shared.write();
            scene.frame = FrameClock {
                current: req.frame,
                subframe: req.subframe,
            };
            scene.clone()
        };
        self.run_frame(store, job, snapshot, req)
    }

    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene.id, frame = req.frame))]
    pub(crate) fn run_frame(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: Scene,
        req: &FrameRequest,
    ) -> JobResult<Phase> {
        let id = scene.id.clone();
        self.fire(PipelineEvent::Init, &id);
        if let Err(err) = self.init_from_scene(
            store,
            job,
            &scene,
            req.single_layer.as_deref(),
            req.camera_override.as_deref(),
        ) {
            release_pipeline(job);
            return Err(err);
        }

        self.fire(PipelineEvent::Pre, &id);
        let clock = FrameClock {
            current: req.frame,
            subframe: req.subframe,
        };
        let evaluated = job
            .with_graph(|graph| {
                graph.evaluate_on_frame_change(clock);
                graph.evaluated_scene().clone()
            })
            .unwrap_or(scene);
        job.update_settings(|s| s.frame = evaluated.frame);

        let phase = match self.render_full_pipeline(store, job, &evaluated) {
            Ok(phase) => phase,
            Err(err) => {
                job.set_state(JobState::Failed);
                release_pipeline(job);
                return Err(err);
            }
        };
        self.fire(PipelineEvent::Post, &id);

        let mut written = Ok(());
        if req.write_still && !job.test_break() {
            if job.settings().config.output.format.is_movie() {
                job.reports()
                    .error("Cannot write a single file with an animation format selected");
            } else {
                written = self.write_result(store, job, &evaluated);
            }
        }

        let cancelled = job.test_break();
        job.set_state(match (&written, cancelled) {
            (Err(_), _) => JobState::Failed,
            (Ok(()), true) => JobState::Cancelled,
            (Ok(()), false) => JobState::Done,
        });
        self.fire(
            if written.is_err() || cancelled {
                PipelineEvent::Cancel
            } else {
                PipelineEvent::Complete
            },
            &id,
        );
        release_pipeline(job);
        written.map(|()| phase)
    }

    /// Write the job's result for the scene's current frame: append to the open movies or
    /// write still images.
    ///
    /// Skipped when the backend disables saving. Failures are pushed to the job's reports and
    /// returned. Fires `Write` on success and `Stats` in any case.
    pub(crate) fn write_result(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &Scene,
    ) -> JobResult<()> {
        if job.engine().is_some_and(|e| !e.image_save_enabled()) {
            return Ok(());
        }
        let config = job.settings().config;
        let frame = scene.frame.current;
        let saving = Instant::now();
        let written = if config.output.format.is_movie() {
            self.append_movies(job, &config, frame)
        } else {
            self.write_images(store, job, &config, frame).map(|paths| {
                for path in paths {
                    tracing::info!(path = %path.display(), "Saved");
                }
            })
        };
        let total = job.update_stats(|s| {
            s.last_frame_time = s.elapsed();
            s.last_frame_time
        });

        match &written {
            Ok(()) => {
                tracing::info!(
                    frame,
                    time = %format_duration(total),
                    saving = %format_duration(saving.elapsed()),
                    "frame written"
                );
                self.fire(PipelineEvent::Write, &scene.id);
            }
            Err(err) => {
                job.reports()
                    .error(format!("Cannot write frame {frame}: {err}"));
            }
        }
        self.fire(PipelineEvent::Stats, &scene.id);
        written
    }

    fn write_images(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        config: &RenderConfig,
        frame: i32,
    ) -> JobResult<Vec<PathBuf>> {
        let paths = output_paths(config, store.base_dir(), frame);
        let format = config.output.format;
        if config.is_multiview_name() {
            for (view_id, path) in paths.iter().enumerate() {
                let image = job
                    .acquire_result_image(view_id)
                    .ok_or_else(|| JobError::output(format!("view {view_id} has no pixels")))?;
                write_image(path, &image, format)?;
            }
            return Ok(paths);
        }

        let Some(path) = paths.first() else {
            return Ok(paths);
        };
        if stereo_3d(config) {
            write_image(path, &stereo_frame(job, config)?, format)?;
        } else {
            let view_id = job.active_view_index();
            let image = job
                .acquire_result_image(view_id)
                .ok_or_else(|| JobError::output("render result has no pixels"))?;
            write_image(path, &image, format)?;
        }
        Ok(paths)
    }

    fn append_movies(&self, job: &RenderJob, config: &RenderConfig, frame: i32) -> JobResult<()> {
        let frames: Vec<(u32, u32, Vec<u8>)> = if stereo_3d(config) {
            let packed = stereo_frame(job, config)?;
            vec![(packed.width, packed.height, packed.to_rgba8())]
        } else {
            (0..config.num_videos())
                .map(|view_id| {
                    job.result_rgba8(view_id).ok_or_else(|| {
                        JobError::output(format!("view {view_id} has no pixels"))
                    })
                })
                .collect::<JobResult<_>>()?
        };
        job.with_movies(|writers| {
            if writers.len() < frames.len() {
                return Err(JobError::output("no movie is open for this view"));
            }
            for (writer, (width, height, rgba)) in writers.iter_mut().zip(&frames) {
                writer.append(frame, rgba, *width, *height)?;
            }
            Ok(())
        })
    }

    /// Render the scene's layers with the backend only, for material and thumbnail previews.
    ///
    /// Skips validation and the sequencer and compositor phases. The backend is never kept.
    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene))]
    pub fn preview_render(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &SceneId,
    ) -> JobResult<()> {
        let scene = store.require(scene)?.read().clone();
        self.init_job(job, &scene, None)?;
        job.update_settings(|s| {
            s.scene = Some(scene.id.clone());
            s.frame = scene.frame;
            s.camera_override = None;
            s.state = JobState::Rendering;
        });
        let rendered = self.render_engine(job, &scene);
        job.free_engine();
        job.set_state(match &rendered {
            Err(_) => JobState::Failed,
            Ok(()) if job.test_break() => JobState::Cancelled,
            Ok(()) => JobState::Done,
        });
        rendered
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/frame.rs"]
mod tests;
