use std::sync::Arc;

use super::*;
use crate::{
    foundation::core::{Rect, Rgba},
    job::registry::RenderRegistry,
    scene::{config::ThreadMode, nodes::{Node, NodeKind, NodeLink, NodeTree}},
};

const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);

fn small_scene(name: &str) -> Scene {
    let mut scene = Scene::new(name);
    scene.camera = Some("Camera".to_string());
    scene.render.resolution.x = 4;
    scene.render.resolution.y = 2;
    scene.render.threads = ThreadMode::Fixed(1);
    scene
}

/// Scene whose compositor reads the render-layer outputs of `reads`; `None` is the scene
/// itself.
fn compositing(name: &str, reads: &[Option<&str>]) -> Scene {
    let mut scene = small_scene(name);
    scene.use_nodes = true;
    let mut nodes = Vec::new();
    let mut links = Vec::new();
    for (i, read) in reads.iter().enumerate() {
        let node = format!("Layers {i}");
        nodes.push(Node::new(
            node.as_str(),
            NodeKind::RenderLayers {
                scene: read.map(SceneId::local),
                layer: None,
            },
        ));
        links.push(NodeLink::new(node, "Out"));
    }
    nodes.push(Node::new("Out", NodeKind::Composite));
    scene.node_tree = Some(NodeTree {
        name: "Compositing".into(),
        nodes,
        links,
    });
    scene
}

fn store_with(scenes: &[Scene]) -> SceneStore {
    let mut store = SceneStore::new();
    for scene in scenes {
        store.insert(scene.clone());
    }
    store
}

fn ids(names: &[&str]) -> Vec<SceneId> {
    names.iter().copied().map(SceneId::local).collect()
}

#[test]
fn own_scene_is_read_without_active_tree() {
    let scene = small_scene("Main");
    assert!(compositor_reads_own_scene(&scene));

    let mut inactive = compositing("Main", &[Some("Other")]);
    inactive.use_nodes = false;
    assert!(compositor_reads_own_scene(&inactive));
}

#[test]
fn own_scene_is_read_by_unbound_or_self_nodes() {
    assert!(compositor_reads_own_scene(&compositing("Main", &[None])));
    assert!(compositor_reads_own_scene(&compositing("Main", &[Some("Main")])));
    assert!(!compositor_reads_own_scene(&compositing("Main", &[Some("Other")])));
}

#[test]
fn dependencies_come_first_and_once() {
    let main = compositing("Main", &[Some("B"), Some("C"), Some("B")]);
    let b = compositing("B", &[None, Some("C")]);
    let c = small_scene("C");
    let store = store_with(&[main.clone(), b, c]);

    assert_eq!(dependency_order(&store, &main).unwrap(), ids(&["C", "B"]));
}

#[test]
fn missing_dependencies_are_skipped() {
    let main = compositing("Main", &[Some("Gone"), Some("B")]);
    let store = store_with(&[main.clone(), small_scene("B")]);

    assert_eq!(dependency_order(&store, &main).unwrap(), ids(&["B"]));
}

#[test]
fn dependency_cycle_names_the_chain() {
    let a = compositing("A", &[Some("B")]);
    let b = compositing("B", &[Some("A")]);
    let store = store_with(&[a.clone(), b]);

    let err = dependency_order(&store, &a).unwrap_err();
    assert!(err.to_string().contains("Scene dependency cycle: A -> B -> A"));
}

fn prepared(store: &SceneStore, scene: &Scene) -> (Pipeline, Arc<RenderJob>) {
    let pipeline = Pipeline::with_defaults(Arc::new(RenderRegistry::init_process()));
    let job = pipeline.registry().new_scene_job(&scene.id);
    pipeline
        .init_from_scene(store, &job, scene, None, None)
        .unwrap();
    (pipeline, job)
}

#[test]
fn compositor_reads_rendered_dependency() {
    let main = compositing("Main", &[Some("B")]);
    let mut b = small_scene("B");
    b.world_color = BLUE;
    let store = store_with(&[main.clone(), b]);
    let (pipeline, job) = prepared(&store, &main);

    pipeline.render_compositor(&store, &job, &main).unwrap();

    let dep = pipeline.registry().find("B").unwrap();
    assert_eq!(dep.state(), JobState::Done);
    assert_eq!(dep.result_size(), Some((4, 2)));

    let read = job.acquire_result_read();
    let composited = read.as_ref().unwrap().view_image(0).unwrap();
    assert_eq!(composited.pixel(2, 1), &BLUE.to_array()[..]);
    drop(read);
    assert!(job.reports().errors().is_empty());
}

#[test]
fn cropped_border_composites_at_crop_size() {
    let mut main = compositing("Main", &[Some("B")]);
    main.render.use_border = true;
    main.render.crop = true;
    main.render.border = Rect::new(0.5, 0.5, 1.0, 1.0);
    let mut b = small_scene("B");
    b.world_color = BLUE;
    let store = store_with(&[main.clone(), b]);
    let (pipeline, job) = prepared(&store, &main);

    pipeline.render_compositor(&store, &job, &main).unwrap();

    assert_eq!(pipeline.registry().find("B").unwrap().result_size(), Some((2, 1)));
    let read = job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert_eq!(buf.size(), (2, 1));
    let composited = buf.view_image(0).unwrap();
    assert_eq!((composited.width, composited.height), (2, 1));
    assert_eq!(composited.pixel(1, 0), &BLUE.to_array()[..]);
    drop(read);
    assert!(job.reports().errors().is_empty());
}

#[test]
fn tree_without_other_scenes_renders_engine_only() {
    let main = compositing("Main", &[None]);
    let store = store_with(&[main.clone()]);
    let (pipeline, job) = prepared(&store, &main);

    pipeline.render_compositor(&store, &job, &main).unwrap();

    let read = job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert!(buf.view_image(0).is_none());
    assert!(buf.layer("ViewLayer").is_some());
    drop(read);
    assert_eq!(pipeline.registry().len(), 1);
}

#[test]
fn cycle_fails_the_compositor_phase() {
    let a = compositing("A", &[Some("B")]);
    let b = compositing("B", &[Some("A")]);
    let store = store_with(&[a.clone(), b]);
    let (pipeline, job) = prepared(&store, &a);

    assert!(pipeline.render_compositor(&store, &job, &a).is_err());
    assert_eq!(job.state(), JobState::Failed);
    let errors = job.reports().errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with("Scene dependency cycle: A -> B -> A"));
}
