use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::*;
use crate::{
    foundation::{core::Rgba, report::ReportLevel},
    job::{callbacks::JobCallbacks, registry::RenderRegistry},
    output::movie::MovieWriterFactory,
    pipeline::{FrameRequest, PipelineEvents, RenderServices},
    scene::{config::{OutputFormat, ThreadMode}, model::{Scene, ViewLayer}},
};

fn small_scene(out: &str) -> Scene {
    let mut scene = Scene::new("Main");
    scene.camera = Some("Camera".to_string());
    scene.world_color = Rgba::new(1.0, 1.0, 0.0, 1.0);
    scene.render.resolution.x = 4;
    scene.render.resolution.y = 2;
    scene.render.threads = ThreadMode::Fixed(1);
    scene.render.output.path = out.to_string();
    scene
}

#[derive(Clone, Debug, PartialEq)]
enum MovieCall {
    Start(PathBuf),
    Frame(i32, u32, u32),
    Finish,
}

#[derive(Default)]
struct RecordingMovies {
    calls: Arc<Mutex<Vec<MovieCall>>>,
    fail_start: bool,
}

struct RecordingWriter {
    calls: Arc<Mutex<Vec<MovieCall>>>,
}

impl MovieWriter for RecordingWriter {
    fn append(&mut self, frame: i32, rgba8: &[u8], width: u32, height: u32) -> JobResult<()> {
        assert_eq!(rgba8.len(), (width * height * 4) as usize);
        self.calls.lock().push(MovieCall::Frame(frame, width, height));
        Ok(())
    }

    fn finish(self: Box<Self>) -> JobResult<()> {
        self.calls.lock().push(MovieCall::Finish);
        Ok(())
    }
}

impl MovieWriterFactory for RecordingMovies {
    fn start(&self, spec: &MovieSpec) -> JobResult<Box<dyn MovieWriter>> {
        if self.fail_start {
            return Err(JobError::output("encoder unavailable"));
        }
        self.calls.lock().push(MovieCall::Start(spec.path.clone()));
        Ok(Box::new(RecordingWriter {
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct Fixture {
    pipeline: Pipeline,
    store: SceneStore,
    job: Arc<RenderJob>,
    events: Arc<Mutex<Vec<PipelineEvent>>>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn base(&self) -> &Path {
        self.store.base_dir()
    }

    fn run(&self, req: &AnimRequest) -> JobResult<AnimStats> {
        self.pipeline
            .render_anim(&self.store, &self.job, &SceneId::local("Main"), req)
    }

    fn last_event(&self) -> Option<PipelineEvent> {
        self.events.lock().last().copied()
    }
}

fn fixture_with(scene: &Scene, services: RenderServices) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let pipeline = Pipeline::new(
        Arc::new(RenderRegistry::init_process()),
        services.with_events(PipelineEvents::new().on(move |event, _| sink.lock().push(event))),
    );
    let mut store = SceneStore::new();
    store.set_base_dir(dir.path());
    store.insert(scene.clone());
    let job = pipeline.registry().new_scene_job(&scene.id);
    Fixture {
        pipeline,
        store,
        job,
        events,
        _dir: dir,
    }
}

fn fixture(scene: &Scene) -> Fixture {
    fixture_with(scene, RenderServices::default())
}

#[test]
fn request_defaults_to_unit_step() {
    let req = AnimRequest::new(3, 9);
    assert_eq!((req.first, req.last, req.step), (3, 9, 1));
    let from = AnimRequest::from_frames(FrameSettings {
        start: 2,
        end: 8,
        step: 3,
        ..FrameSettings::default()
    });
    assert_eq!((from.first, from.last, from.step), (2, 8, 3));
}

#[test]
fn every_frame_is_written() {
    let scene = small_scene("frames/f_####");
    let f = fixture(&scene);

    let stats = f.run(&AnimRequest::new(1, 3)).unwrap();
    assert_eq!(
        stats,
        AnimStats {
            rendered: 3,
            written: 3,
            ..AnimStats::default()
        }
    );
    for frame in 1..=3 {
        assert!(f.base().join(format!("frames/f_{frame:04}.png")).is_file());
    }
    assert_eq!(f.job.state(), JobState::Done);
    assert_eq!(f.last_event(), Some(PipelineEvent::Complete));
}

#[test]
fn step_skips_frames_between() {
    let scene = small_scene("frames/f_####");
    let f = fixture(&scene);

    let stats = f.run(&AnimRequest::new(1, 5).with_step(2)).unwrap();
    assert_eq!(stats.rendered, 3);
    assert!(f.base().join("frames/f_0003.png").is_file());
    assert!(!f.base().join("frames/f_0002.png").exists());
}

#[test]
fn remapped_frames_are_skipped_without_counting() {
    let mut scene = small_scene("frames/f_####");
    scene.channels.frame_remap.insert(2, 7);
    let f = fixture(&scene);

    let stats = f.run(&AnimRequest::new(1, 2)).unwrap();
    assert_eq!((stats.rendered, stats.skipped), (1, 0));
    assert!(f.base().join("frames/f_0001.png").is_file());
    assert!(!f.base().join("frames/f_0002.png").exists());
    assert!(!f.base().join("frames/f_0007.png").exists());
}

#[test]
fn stored_frame_is_restored() {
    let mut scene = small_scene("frames/f_####");
    scene.frame.current = 42;
    let f = fixture(&scene);

    f.run(&AnimRequest::new(1, 2)).unwrap();
    let stored = f.store.snapshot(&scene.id).unwrap();
    assert_eq!(stored.frame.current, 42);
}

#[test]
fn existing_frames_are_skipped_and_reported() {
    let mut scene = small_scene("frames/f_####");
    scene.render.output.skip_existing = true;
    let f = fixture(&scene);
    let existing = f.base().join("frames/f_0001.png");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"kept").unwrap();

    let stats = f.run(&AnimRequest::new(1, 1)).unwrap();
    assert_eq!((stats.rendered, stats.skipped), (0, 1));
    assert_eq!(std::fs::read(&existing).unwrap(), b"kept");
    let infos: Vec<_> = f
        .job
        .reports()
        .entries()
        .into_iter()
        .filter(|r| r.level == ReportLevel::Info)
        .map(|r| r.message)
        .collect();
    assert_eq!(
        infos,
        vec!["No frames rendered, skipped to not overwrite".to_string()]
    );
}

#[test]
fn cancelled_run_removes_placeholders() {
    let mut scene = small_scene("frames/f_####");
    scene.render.output.touch = true;
    let f = fixture(&scene);
    f.job.update_callbacks(|slots| slots.test_break = Some(Arc::new(|| true)));

    let stats = f.run(&AnimRequest::new(1, 3)).unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.rendered, 0);
    assert!(!f.base().join("frames/f_0001.png").exists());
    assert_eq!(f.job.state(), JobState::Cancelled);
    assert_eq!(f.last_event(), Some(PipelineEvent::Cancel));
}

#[test]
fn movie_frames_go_to_one_writer() {
    let mut scene = small_scene("movies/shot_####");
    scene.render.resolution.x = 16;
    scene.render.resolution.y = 16;
    scene.render.frames.start = 1;
    scene.render.frames.end = 2;
    scene.render.output.format = OutputFormat::Ffmpeg;
    let movies = Arc::new(RecordingMovies::default());
    let calls = Arc::clone(&movies.calls);
    let f = fixture_with(&scene, RenderServices::default().with_movies(movies));

    let stats = f.run(&AnimRequest::new(1, 2)).unwrap();
    assert_eq!(stats.written, 2);
    assert_eq!(
        *calls.lock(),
        vec![
            MovieCall::Start(f.base().join("movies/shot_0001-0002.mp4")),
            MovieCall::Frame(1, 16, 16),
            MovieCall::Frame(2, 16, 16),
            MovieCall::Finish,
        ]
    );
    assert!(f.job.take_movies().is_empty());
}

#[test]
fn movie_that_cannot_open_fails_before_rendering() {
    let mut scene = small_scene("movies/shot_####");
    scene.render.resolution.x = 16;
    scene.render.resolution.y = 16;
    scene.render.output.format = OutputFormat::Ffmpeg;
    let movies = Arc::new(RecordingMovies {
        fail_start: true,
        ..RecordingMovies::default()
    });
    let f = fixture_with(&scene, RenderServices::default().with_movies(movies));

    assert!(f.run(&AnimRequest::new(1, 2)).is_err());
    assert_eq!(f.job.state(), JobState::Failed);
    let errors = f.job.reports().errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Cannot open movie"));
    assert_eq!(f.last_event(), Some(PipelineEvent::Init));
}

#[test]
fn viewers_are_reset_before_every_frame() {
    let scene = small_scene("frames/f_####");
    let f = fixture(&scene);
    let inits = Arc::new(AtomicUsize::new(0));
    let clears = Arc::new(AtomicUsize::new(0));
    let (i, c) = (Arc::clone(&inits), Arc::clone(&clears));
    f.job.set_callbacks(
        JobCallbacks::default()
            .with_display_init(move |_| {
                i.fetch_add(1, Ordering::SeqCst);
            })
            .with_display_clear(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let stats = f.run(&AnimRequest::new(1, 3)).unwrap();
    assert_eq!(stats.rendered, 3);
    assert_eq!(inits.load(Ordering::SeqCst), 3);
    assert_eq!(clears.load(Ordering::SeqCst), 3);
}

#[test]
fn single_layer_run_keeps_the_other_layers() {
    let mut scene = small_scene("frames/f_####");
    scene.view_layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    let f = fixture(&scene);
    f.pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1))
        .unwrap();
    let first = f.job.result_id();

    let mut req = AnimRequest::new(1, 3);
    req.single_layer = Some("A".to_string());
    let stats = f.run(&req).unwrap();
    assert_eq!((stats.rendered, stats.written), (3, 3));

    let read = f.job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert_eq!(buf.id(), first.unwrap());
    assert!(buf.has_layer("A"));
    assert!(buf.has_layer("B"));
    drop(read);
    assert!(!f.job.has_pushed_result());
}

#[test]
fn skipped_last_frame_restores_the_pushed_result() {
    let mut scene = small_scene("frames/f_####");
    scene.view_layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    scene.render.output.skip_existing = true;
    let f = fixture(&scene);
    f.pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1))
        .unwrap();
    std::fs::create_dir_all(f.base().join("frames")).unwrap();
    std::fs::write(f.base().join("frames/f_0002.png"), b"kept").unwrap();

    let mut req = AnimRequest::new(1, 2);
    req.single_layer = Some("B".to_string());
    let stats = f.run(&req).unwrap();
    assert_eq!((stats.rendered, stats.skipped), (1, 1));
    assert!(!f.job.has_pushed_result());
    let read = f.job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert!(buf.has_layer("A") && buf.has_layer("B"));
}
