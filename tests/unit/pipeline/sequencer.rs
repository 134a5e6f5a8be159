use std::sync::Arc;

use super::*;
use crate::{
    backend::sequencer::StripSequencer,
    foundation::core::Rgba,
    job::registry::RenderRegistry,
    pipeline::{Phase, RenderServices},
    scene::{config::ThreadMode, strips::{Editing, Strip, StripKind}},
};

fn small_scene(name: &str) -> Scene {
    let mut scene = Scene::new(name);
    scene.camera = Some("Camera".to_string());
    scene.render.resolution.x = 4;
    scene.render.resolution.y = 2;
    scene.render.threads = ThreadMode::Fixed(1);
    scene
}

fn with_strips(mut scene: Scene, strips: Vec<Strip>) -> Scene {
    scene.sequencer = Some(Editing { strips });
    scene
}

fn scene_strip(name: &str, scene: &str, use_sequencer: bool) -> Strip {
    Strip::new(
        name,
        1,
        1,
        10,
        StripKind::Scene {
            scene: SceneId::local(scene),
            camera_override: None,
            use_sequencer,
        },
    )
}

struct Fixture {
    pipeline: Pipeline,
    sequencer: Arc<StripSequencer>,
    store: SceneStore,
    job: Arc<RenderJob>,
}

fn fixture(main: &Scene, others: &[Scene]) -> Fixture {
    let sequencer = Arc::new(StripSequencer::new());
    let pipeline = Pipeline::new(
        Arc::new(RenderRegistry::init_process()),
        RenderServices::default().with_sequencer(sequencer.clone()),
    );
    let mut store = SceneStore::new();
    store.insert(main.clone());
    for scene in others {
        store.insert(scene.clone());
    }
    let job = pipeline.registry().new_scene_job(&main.id);
    pipeline
        .init_from_scene(&store, &job, main, None, None)
        .unwrap();
    Fixture {
        pipeline,
        sequencer,
        store,
        job,
    }
}

fn assert_close(actual: Vec<f32>, expected: [f32; 4]) {
    let near = actual
        .iter()
        .zip(expected)
        .all(|(a, b)| (a - b).abs() < 1e-5);
    assert!(near, "{actual:?} != {expected:?}");
}

fn view_pixel(job: &RenderJob, x: u32, y: u32) -> Vec<f32> {
    let read = job.acquire_result_read();
    read.as_ref()
        .unwrap()
        .view_image(0)
        .unwrap()
        .pixel(x, y)
        .to_vec()
}

#[test]
fn progress_spans_the_frame_range() {
    assert_eq!(sequencer_progress(5, 1, 9), 0.5);
    assert_eq!(sequencer_progress(3, 3, 3), 1.0);
    assert_eq!(sequencer_progress(20, 1, 9), 1.0);
}

#[test]
fn strip_jobs_are_named_after_the_scene() {
    assert_eq!(strip_job_name(&SceneId::local("Main")), "Main [strip]");
}

#[test]
fn color_strip_fills_the_view() {
    let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
    let main = with_strips(
        small_scene("Main"),
        vec![Strip::new("Red", 1, 1, 10, StripKind::Color { color: red })],
    );
    let f = fixture(&main, &[]);

    let phase = f
        .pipeline
        .render_full_pipeline(&f.store, &f.job, &main)
        .unwrap();
    assert_eq!(phase, Phase::Sequencer);
    assert_eq!(f.job.result_size(), Some((4, 2)));
    assert_close(view_pixel(&f.job, 3, 1), [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(f.sequencer.cache_frees(), 1);
}

#[test]
fn empty_frame_is_zero_filled() {
    let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
    let main = with_strips(
        small_scene("Main"),
        vec![Strip::new("Late", 1, 5, 10, StripKind::Color { color: red })],
    );
    let f = fixture(&main, &[]);

    let mut covered = main.clone();
    covered.frame.current = 5;
    f.job.update_settings(|s| s.frame = covered.frame);
    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &covered)
        .unwrap();
    assert_close(view_pixel(&f.job, 0, 0), [1.0, 0.0, 0.0, 1.0]);

    let mut gap = main.clone();
    gap.frame.current = 1;
    f.job.update_settings(|s| s.frame = gap.frame);
    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &gap)
        .unwrap();
    let read = f.job.acquire_result_read();
    assert!(read.as_ref().unwrap().view_image(0).unwrap().is_zero());
}

#[test]
fn strip_metadata_replaces_the_render_stamp() {
    let red = Rgba::new(1.0, 0.0, 0.0, 1.0);
    let mut main = with_strips(
        small_scene("Main"),
        vec![Strip::new("Red", 1, 1, 10, StripKind::Color { color: red })],
    );
    main.render.stamp.strip_metadata = true;
    let f = fixture(&main, &[]);

    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &main)
        .unwrap();
    let read = f.job.acquire_result_read();
    let stamp = read.as_ref().unwrap().stamp().unwrap();
    assert_eq!(stamp.get("Strip"), Some("Red"));
    assert_eq!(stamp.get("Scene"), None);
}

#[test]
fn scene_strip_renders_in_its_own_job() {
    let mut sub = small_scene("Sub");
    sub.world_color = Rgba::new(0.0, 0.0, 1.0, 1.0);
    let main = with_strips(small_scene("Main"), vec![scene_strip("Shot", "Sub", false)]);
    let f = fixture(&main, &[sub]);

    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &main)
        .unwrap();
    assert_close(view_pixel(&f.job, 0, 0), [0.0, 0.0, 1.0, 1.0]);

    let strip_job = f.pipeline.registry().find("Sub [strip]").unwrap();
    assert_eq!(strip_job.result_size(), Some((4, 2)));
    assert!(f.pipeline.registry().find("Sub").is_none());
    // Freed once by the outer sequencer phase.
    assert_eq!(f.sequencer.cache_frees(), 1);
    assert_eq!(f.sequencer.cached_strips(), 0);
    assert!(f.pipeline.strip_stack.lock().is_empty());
}

#[test]
fn recursive_scene_strip_is_skipped_with_warning() {
    let main = with_strips(small_scene("Main"), vec![scene_strip("Self", "Main", true)]);
    let f = fixture(&main, &[]);

    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &main)
        .unwrap();
    let warnings: Vec<_> = f
        .job
        .reports()
        .entries()
        .into_iter()
        .filter(|r| r.level == ReportLevel::Warning)
        .map(|r| r.message)
        .collect();
    assert_eq!(warnings, vec!["Recursive scene strip \"Main\" skipped".to_string()]);
    assert_eq!(view_pixel(&f.job, 1, 1), vec![0.0; 4]);
}

#[test]
fn missing_strip_scene_is_reported() {
    let main = with_strips(small_scene("Main"), vec![scene_strip("Gone", "Nowhere", false)]);
    let f = fixture(&main, &[]);

    f.pipeline
        .render_full_pipeline(&f.store, &f.job, &main)
        .unwrap();
    let messages: Vec<_> = f
        .job
        .reports()
        .entries()
        .into_iter()
        .map(|r| r.message)
        .collect();
    assert!(messages.contains(&"Scene strip references missing scene \"Nowhere\"".to_string()));
}
