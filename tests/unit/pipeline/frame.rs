use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::{
    foundation::core::Rgba,
    job::registry::RenderRegistry,
    pipeline::{PipelineEvents, RenderServices},
    scene::{config::{OutputFormat, ThreadMode}, model::ViewLayer},
};

fn small_scene(name: &str, out: &str) -> Scene {
    let mut scene = Scene::new(name);
    scene.camera = Some("Camera".to_string());
    scene.world_color = Rgba::new(0.0, 1.0, 0.0, 1.0);
    scene.render.resolution.x = 4;
    scene.render.resolution.y = 2;
    scene.render.threads = ThreadMode::Fixed(1);
    scene.render.output.path = out.to_string();
    scene
}

struct Fixture {
    pipeline: Pipeline,
    store: SceneStore,
    job: Arc<RenderJob>,
    events: Arc<Mutex<Vec<PipelineEvent>>>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.store.base_dir().join(name)
    }
}

fn fixture(scene: &Scene) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let pipeline = Pipeline::new(
        Arc::new(RenderRegistry::init_process()),
        RenderServices::default()
            .with_events(PipelineEvents::new().on(move |event, _| sink.lock().push(event))),
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

#[test]
fn still_frame_is_written_with_events_in_order() {
    let scene = small_scene("Main", "out/shot_##");
    let f = fixture(&scene);

    let phase = f
        .pipeline
        .render_frame(
            &f.store,
            &f.job,
            &scene.id,
            &FrameRequest::new(5).with_write_still(true),
        )
        .unwrap();
    assert_eq!(phase, Phase::Compositor);
    assert!(f.path("out/shot_05.png").is_file());
    assert_eq!(
        f.events(),
        vec![
            PipelineEvent::Init,
            PipelineEvent::Pre,
            PipelineEvent::Post,
            PipelineEvent::Write,
            PipelineEvent::Stats,
            PipelineEvent::Complete,
        ]
    );
    assert_eq!(f.job.state(), JobState::Done);
    assert_eq!(f.store.snapshot(&scene.id).unwrap().frame.current, 5);
    assert!(f.job.engine().is_none());
}

#[test]
fn frame_without_write_still_writes_nothing() {
    let scene = small_scene("Main", "out/shot_##");
    let f = fixture(&scene);

    f.pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1))
        .unwrap();
    assert!(!f.path("out").exists());
    assert!(!f.events().contains(&PipelineEvent::Write));
}

#[test]
fn failed_validation_fires_only_init() {
    let mut scene = small_scene("Main", "out/shot_##");
    scene.camera = None;
    let f = fixture(&scene);

    let result = f
        .pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1));
    assert!(result.is_err());
    assert_eq!(f.events(), vec![PipelineEvent::Init]);
    assert_eq!(f.job.state(), JobState::Failed);
    assert!(f.job.reports().has_errors());
}

#[test]
fn failed_still_write_fails_the_job() {
    let scene = small_scene("Main", "blocked/shot_##");
    let f = fixture(&scene);
    std::fs::write(f.path("blocked"), b"not a directory").unwrap();

    let result = f.pipeline.render_frame(
        &f.store,
        &f.job,
        &scene.id,
        &FrameRequest::new(1).with_write_still(true),
    );
    assert!(result.is_err());
    assert_eq!(f.job.state(), JobState::Failed);
    assert_eq!(f.events().last(), Some(&PipelineEvent::Cancel));
    assert!(!f.events().contains(&PipelineEvent::Write));
    let errors = f.job.reports().errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Cannot write frame 1"));
}

#[test]
fn still_with_movie_format_is_refused() {
    let mut scene = small_scene("Main", "out/shot_##");
    scene.render.resolution.x = 16;
    scene.render.resolution.y = 16;
    scene.render.output.format = OutputFormat::Ffmpeg;
    let f = fixture(&scene);

    f.pipeline
        .render_frame(
            &f.store,
            &f.job,
            &scene.id,
            &FrameRequest::new(1).with_write_still(true),
        )
        .unwrap();
    assert_eq!(
        f.job.reports().errors(),
        vec!["Cannot write a single file with an animation format selected".to_string()]
    );
    assert!(!f.path("out").exists());
}

#[test]
fn persistent_data_keeps_the_backend() {
    let mut scene = small_scene("Main", "out/shot_##");
    scene.render.persistent_data = true;
    let f = fixture(&scene);

    f.pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1))
        .unwrap();
    assert!(f.job.engine().is_some());

    f.pipeline.registry().free_persistent_data(Some(&scene.id));
    assert!(f.job.engine().is_none());
}

#[test]
fn single_layer_rerender_merges_into_previous_result() {
    let mut scene = small_scene("Main", "out/shot_##");
    scene.view_layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    let f = fixture(&scene);

    f.pipeline
        .render_frame(&f.store, &f.job, &scene.id, &FrameRequest::new(1))
        .unwrap();
    f.pipeline
        .render_frame(
            &f.store,
            &f.job,
            &scene.id,
            &FrameRequest::new(1).with_single_layer("B"),
        )
        .unwrap();

    let read = f.job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert!(buf.has_layer("A"));
    assert!(buf.has_layer("B"));
    drop(read);
    assert!(!f.job.has_pushed_result());
}

#[test]
fn stereo_output_is_packed_side_by_side() {
    let mut scene = small_scene("Main", "out/stereo_#");
    scene.render.multiview.enabled = true;
    scene.render.output.views_format = OutputViewsFormat::Stereo3d;
    let f = fixture(&scene);

    f.pipeline
        .render_frame(
            &f.store,
            &f.job,
            &scene.id,
            &FrameRequest::new(3).with_write_still(true),
        )
        .unwrap();
    let written = image::open(f.path("out/stereo_3.png")).unwrap();
    assert_eq!((written.width(), written.height()), (8, 2));
}

#[test]
fn individual_views_are_written_with_suffixes() {
    let mut scene = small_scene("Main", "out/view_#");
    scene.render.multiview.enabled = true;
    let f = fixture(&scene);

    f.pipeline
        .render_frame(
            &f.store,
            &f.job,
            &scene.id,
            &FrameRequest::new(2).with_write_still(true),
        )
        .unwrap();
    assert!(f.path("out/view_2_L.png").is_file());
    assert!(f.path("out/view_2_R.png").is_file());
}

#[test]
fn preview_render_skips_validation_and_frees_the_backend() {
    let mut scene = small_scene("Main", "out/shot_##");
    scene.render.persistent_data = true;
    let f = fixture(&scene);

    f.pipeline
        .preview_render(&f.store, &f.job, &scene.id)
        .unwrap();
    assert_eq!(f.job.state(), JobState::Done);
    assert!(f.job.engine().is_none());
    assert_eq!(f.job.result_size(), Some((4, 2)));
    assert!(f.events().is_empty());
}
