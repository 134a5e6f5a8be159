use crate::{
    foundation::report::Reports,
    scene::{config::ViewsFormat, model::Scene, store::SceneStore, strips::StripKind},
};

/// Pre-flight checks run before a job is allowed to start.
///
/// Checks the border, then the active image source (sequencer, compositor or plain layers),
/// then the camera setup. The first failure is pushed to `reports` naming the scene, and
/// `false` is returned. Nothing is mutated.
#[tracing::instrument(skip_all, fields(scene = %scene.id))]
pub fn is_rendering_allowed(
    store: &SceneStore,
    scene: &Scene,
    single_layer: Option<&str>,
    camera_override: Option<&str>,
    reports: &Reports,
) -> bool {
    if scene.render.border_degenerate() {
        reports.error("No border area selected");
        return false;
    }

    if scene.sequencer_active() {
        if scene.render.use_border {
            reports.error("Border rendering is not supported by sequencer");
            return false;
        }
    } else if scene.compositing_active() {
        let Some(tree) = &scene.node_tree else {
            reports.error("No node tree in scene");
            return false;
        };
        if !tree.has_output(store.node_groups()) {
            reports.error("No render output node in scene");
            return false;
        }
    } else if !scene.has_layers_to_render(single_layer) {
        reports.error("All render layers are disabled");
        return false;
    }

    check_valid_camera(store, scene, camera_override, reports)
}

fn no_camera(reports: &Reports, scene: &Scene) -> bool {
    reports.error(format!("No camera found in scene \"{}\"", scene.id.name));
    false
}

fn check_valid_camera(
    store: &SceneStore,
    scene: &Scene,
    camera_override: Option<&str>,
    reports: &Reports,
) -> bool {
    if !check_multiview_camera(scene, scene.resolve_camera(), reports) {
        return false;
    }

    if !scene.sequencer_active() {
        return compositing_camera_ok(store, scene, camera_override) || no_camera(reports, scene);
    }

    let strips = scene.sequencer.iter().flat_map(|ed| ed.strips.iter());
    for strip in strips {
        let StripKind::Scene {
            scene: id,
            camera_override: strip_camera,
            use_sequencer: false,
        } = &strip.kind
        else {
            continue;
        };
        let Some(sub) = store.snapshot(id) else {
            continue;
        };
        match strip_camera {
            Some(camera) => {
                if !check_multiview_camera(&sub, Some(camera), reports) {
                    return false;
                }
            }
            None if sub.resolve_camera().is_none() => {
                let camera = if sub.id == scene.id {
                    camera_override
                } else {
                    None
                };
                if !compositing_camera_ok(store, &sub, camera) {
                    return no_camera(reports, &sub);
                }
            }
            None => {}
        }
    }
    true
}

/// Every render-layer node of an active compositor needs a camera in its scene; plain renders
/// need the override or a scene camera.
fn compositing_camera_ok(store: &SceneStore, scene: &Scene, camera_override: Option<&str>) -> bool {
    let tree = scene
        .node_tree
        .as_ref()
        .filter(|_| scene.compositing_active());
    let Some(tree) = tree else {
        return camera_override.is_some() || scene.resolve_camera().is_some();
    };
    tree.render_layer_nodes().all(|(_, other, _)| match other {
        Some(id) if *id != scene.id => store
            .snapshot(id)
            .is_some_and(|s| s.resolve_camera().is_some()),
        _ => scene.resolve_camera().is_some(),
    })
}

fn check_multiview_camera(scene: &Scene, camera: Option<&str>, reports: &Reports) -> bool {
    let mv = &scene.render.multiview;
    let Some(camera) = camera else {
        return true;
    };
    if !mv.enabled {
        return true;
    }

    let mut any_active = false;
    for view in mv.active_views() {
        any_active = true;
        if mv.format != ViewsFormat::Multiview {
            continue;
        }
        let view_camera = multiview_camera(scene, camera, &view.suffix);
        if view_camera == camera && !camera.ends_with(&view.suffix) {
            reports.error(format!("Camera \"{camera}\" is not a multi-view camera"));
            return false;
        }
    }
    if !any_active {
        reports.error(format!(
            "No active view found in scene \"{}\"",
            scene.id.name
        ));
        return false;
    }
    true
}

/// Camera rendering the view with `suffix`: `camera` with its view suffix swapped for
/// `suffix` when such a camera exists, else `camera` itself.
pub fn multiview_camera(scene: &Scene, camera: &str, suffix: &str) -> String {
    let prefix = scene
        .render
        .multiview
        .active_views()
        .filter(|v| !v.suffix.is_empty())
        .find_map(|v| camera.strip_suffix(v.suffix.as_str()))
        .unwrap_or(camera);
    let candidate = format!("{prefix}{suffix}");
    if scene.has_camera(&candidate) {
        candidate
    } else {
        camera.to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/validate.rs"]
mod tests;
