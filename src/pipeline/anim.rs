use std::fs;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::{
    foundation::error::{JobError, JobResult},
    job::job::{JobState, RenderJob},
    output::{
        ensure_parent_dir,
        movie::{MovieSpec, MovieWriter},
        path::{movie_path, output_paths},
        stereo::video_dimensions,
    },
    pipeline::{Pipeline, PipelineEvent, dispatch::release_pipeline},
    scene::{
        config::{FrameSettings, RenderConfig},
        model::{FrameClock, Scene, SceneId},
        store::SceneStore,
    },
};

/// Arguments of [`Pipeline::render_anim`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimRequest {
    pub single_layer: Option<String>,
    pub camera_override: Option<String>,
    /// First frame, inclusive.
    pub first: i32,
    /// Last frame, inclusive.
    pub last: i32,
    pub step: i32,
}

impl AnimRequest {
    pub fn new(first: i32, last: i32) -> Self {
        Self {
            single_layer: None,
            camera_override: None,
            first,
            last,
            step: 1,
        }
    }

    /// The scene's configured frame range.
    pub fn from_frames(frames: FrameSettings) -> Self {
        Self::new(frames.start, frames.end).with_step(frames.step)
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = step;
        self
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera_override = Some(camera.into());
        self
    }
}

/// Outcome of an animation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimStats {
    /// Frames that went through the pipeline.
    pub rendered: u32,
    /// Frames skipped because every output file already existed.
    pub skipped: u32,
    /// Frames written to images or movies.
    pub written: u32,
    /// Image frames whose write failed.
    pub write_failures: u32,
    pub cancelled: bool,
}

/// Output size of one rendered frame before stereo packing.
fn frame_size(job: &RenderJob) -> (u32, u32) {
    let settings = job.settings();
    if settings.config.border_active() && !settings.config.crop {
        (settings.winx, settings.winy)
    } else {
        settings.render_size()
    }
}

/// Create empty placeholders for the missing `paths`; returns the ones created.
fn touch_missing(job: &RenderJob, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut touched = Vec::new();
    for path in paths.iter().filter(|p| !p.exists()) {
        let created = ensure_parent_dir(path).and_then(|()| {
            fs::File::create(path)
                .with_context(|| format!("touch '{}'", path.display()))
                .map_err(JobError::from)
        });
        match created {
            Ok(_) => touched.push(path.clone()),
            Err(err) => job.reports().error(err.to_string()),
        }
    }
    touched
}

/// Delete placeholders that are still empty.
fn remove_placeholders(touched: &[PathBuf]) {
    for path in touched {
        let empty = fs::metadata(path).is_ok_and(|m| m.len() == 0);
        if empty && let Err(err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), "cannot remove placeholder: {err}");
        }
    }
}

fn close_movies(job: &RenderJob, writers: Vec<Box<dyn MovieWriter>>) {
    for writer in writers {
        if let Err(err) = writer.finish() {
            job.reports().error(format!("Cannot finish movie: {err}"));
        }
    }
}

impl Pipeline {
    /// Render (and write) every `step`-th frame from `first` to `last`.
    ///
    /// Movie outputs are opened before the first frame and closed after the last. A frame whose
    /// own channels remap it to another frame is skipped without counting. With
    /// `skip_existing`, frames whose files all exist are counted as skipped; with `touch`,
    /// placeholders reserve the files while the frame renders and are removed again when the
    /// run is cancelled. The stored scene's frame is restored afterwards.
    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene, first = req.first, last = req.last))]
    pub fn render_anim(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &SceneId,
        req: &AnimRequest,
    ) -> JobResult<AnimStats> {
        self.registry.clear_stop();
        let shared = store.require(scene)?;
        let (base, original_clock) = {
            let scene = shared.read();
            (scene.clone(), scene.frame)
        };
        let single = req
            .single_layer
            .as_deref()
            .filter(|name| base.view_layer_index(name).is_some());

        self.fire(PipelineEvent::Init, scene);
        let started = self
            .init_from_scene(store, job, &base, single, req.camera_override.as_deref())
            .and_then(|()| self.backend_for(job, &base.render.engine))
            .and_then(|backend| {
                let config = job.settings().config;
                if config.output.format.is_movie() && backend.image_save_enabled() {
                    self.open_movies(store, job, &config)?;
                }
                Ok(config)
            });
        let config = match started {
            Ok(config) => config,
            Err(err) => {
                job.set_state(JobState::Failed);
                release_pipeline(job);
                return Err(err);
            }
        };
        let is_movie = config.output.format.is_movie();
        let saves = job.engine().is_none_or(|e| e.image_save_enabled());

        let step = req.step.max(1);
        let mut stats = AnimStats::default();
        let mut failure = None;
        let mut frame = req.first;
        // The run's setup already initialized the job for the first frame.
        let mut fresh = true;
        while frame <= req.last {
            let requested = frame;
            frame = frame.saturating_add(step);

            let mut current = base.clone();
            current.frame = FrameClock {
                current: requested,
                subframe: 0.0,
            };
            current.evaluate_own_channels();
            shared.write().frame = current.frame;
            if current.frame.current != requested {
                tracing::debug!(
                    requested,
                    evaluated = current.frame.current,
                    "frame remapped, skipped"
                );
                continue;
            }

            if !fresh && let Err(err) = self.init_for_frame(job, &current, single) {
                failure = Some(err);
                break;
            }
            fresh = false;

            let mut touched = Vec::new();
            if !is_movie && saves {
                let paths = output_paths(&config, store.base_dir(), requested);
                if config.output.skip_existing && paths.iter().all(|p| p.exists()) {
                    tracing::info!(frame = requested, "skipping existing frame");
                    stats.skipped += 1;
                    continue;
                }
                if config.output.touch {
                    touched = touch_missing(job, &paths);
                }
            }

            self.fire(PipelineEvent::Pre, scene);
            let evaluated = job
                .with_graph(|graph| {
                    graph.evaluate_on_frame_change(current.frame);
                    graph.evaluated_scene().clone()
                })
                .unwrap_or(current);
            job.update_settings(|s| s.frame = evaluated.frame);

            if let Err(err) = self.render_full_pipeline(store, job, &evaluated) {
                remove_placeholders(&touched);
                failure = Some(err);
                break;
            }

            if !job.test_break() {
                stats.rendered += 1;
                self.fire(PipelineEvent::Post, scene);
                if saves {
                    match self.write_result(store, job, &evaluated) {
                        Ok(()) => stats.written += 1,
                        Err(err) if is_movie => {
                            failure = Some(err);
                            break;
                        }
                        Err(_) => stats.write_failures += 1,
                    }
                }
            }

            if job.test_break() {
                remove_placeholders(&touched);
                break;
            }
        }

        close_movies(job, job.take_movies());
        if job.has_pushed_result()
            && let Err(err) = job.pop_single_layer_result(true)
        {
            failure.get_or_insert(err);
        }
        shared.write().frame = original_clock;
        if stats.rendered == 0 && stats.skipped > 0 {
            job.reports()
                .info("No frames rendered, skipped to not overwrite");
        }

        stats.cancelled = job.test_break();
        let state = match (&failure, stats.cancelled) {
            (Some(_), _) => JobState::Failed,
            (None, true) => JobState::Cancelled,
            (None, false) => JobState::Done,
        };
        job.set_state(state);
        let event = if failure.is_some() || stats.cancelled {
            PipelineEvent::Cancel
        } else {
            PipelineEvent::Complete
        };
        self.fire(event, scene);
        release_pipeline(job);
        tracing::info!(
            rendered = stats.rendered,
            skipped = stats.skipped,
            written = stats.written,
            cancelled = stats.cancelled,
            "animation finished"
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    /// Re-initialize the job before a frame of an animation run.
    ///
    /// The result is pushed aside again for single-layer runs, because the previous frame's
    /// merge consumed it. Viewers are reset through the init callbacks.
    fn init_for_frame(
        &self,
        job: &RenderJob,
        scene: &Scene,
        single: Option<&str>,
    ) -> JobResult<()> {
        if single.is_some() && !job.has_pushed_result() {
            job.push_result_for_single_layer();
        }
        if let Err(err) = self.init_job(job, scene, single) {
            if single.is_some() {
                job.pop_single_layer_result(true)?;
            }
            return Err(err);
        }
        job.set_state(JobState::Rendering);
        Ok(())
    }

    /// Open one movie per video stream; on failure the ones already opened are closed.
    fn open_movies(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        config: &RenderConfig,
    ) -> JobResult<()> {
        let (width, height) = frame_size(job);
        let (width, height) = video_dimensions(config, width, height);
        let mut writers = Vec::with_capacity(config.num_videos());
        for video in 0..config.num_videos() {
            let spec = MovieSpec {
                path: movie_path(config, store.base_dir(), video),
                width,
                height,
                fps_num: config.frames.fps_num,
                fps_den: config.frames.fps_den,
                background: config.output.movie_background,
            };
            match self.services.movies.start(&spec) {
                Ok(writer) => writers.push(writer),
                Err(err) => {
                    job.reports()
                        .error(format!("Cannot open movie \"{}\": {err}", spec.path.display()));
                    close_movies(job, writers);
                    return Err(err);
                }
            }
        }
        job.set_movies(writers);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/anim.rs"]
mod tests;
