use super::*;
use crate::scene::model::LayerKey;

#[test]
fn evaluation_applies_layer_keys_without_remap() {
    let mut scene = Scene::new("Shot");
    scene.channels.layer_keys.push(LayerKey {
        frame: 5,
        layer: "ViewLayer".to_string(),
        use_for_render: false,
    });
    scene.channels.frame_remap.insert(5, 9);
    let mut graph = SnapshotGraph::new(scene);

    graph.evaluate_on_frame_change(FrameClock {
        current: 4,
        subframe: 0.0,
    });
    assert!(graph.evaluated_scene().view_layers[0].use_for_render);

    graph.evaluate_on_frame_change(FrameClock {
        current: 5,
        subframe: 0.5,
    });
    let evaluated = graph.evaluated_scene();
    assert!(!evaluated.view_layers[0].use_for_render);
    assert_eq!(evaluated.frame.current, 5);
    assert_eq!(evaluated.frame.subframe, 0.5);
    assert_eq!(graph.evaluations(), 2);
}

#[test]
fn builder_snapshots_scene() {
    let scene = Scene::new("Shot");
    let graph = SnapshotGraphBuilder
        .build_for_render(&scene, scene.default_render_layer())
        .unwrap();
    assert_eq!(graph.evaluated_scene().id, scene.id);
}
