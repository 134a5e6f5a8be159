use std::collections::HashSet;

use crate::{
    backend::compositor::{CompositeHooks, CompositeRequest},
    buffer::accum::AccumBuffer,
    foundation::{core::PixelRect, error::{JobError, JobResult}},
    job::{init::InitRequest, job::{JobState, RenderJob}},
    pipeline::{Pipeline, dispatch::{release_pipeline, view_list}},
    scene::{model::{Scene, SceneId}, store::SceneStore},
};

/// The scene's own render is needed: no active node tree, or a render-layer node reads the
/// scene itself.
pub fn compositor_reads_own_scene(scene: &Scene) -> bool {
    let Some(tree) = scene.node_tree.as_ref().filter(|_| scene.compositing_active()) else {
        return true;
    };
    tree.render_layer_nodes()
        .any(|(_, other, _)| other.is_none_or(|id| *id == scene.id))
}

/// Other scenes read by the scene's active compositor, in node order, without duplicates.
fn referenced_scenes(scene: &Scene) -> Vec<SceneId> {
    let Some(tree) = scene.node_tree.as_ref().filter(|_| scene.compositing_active()) else {
        return Vec::new();
    };
    let mut out: Vec<SceneId> = Vec::new();
    for (_, other, _) in tree.render_layer_nodes() {
        if let Some(id) = other
            && *id != scene.id
            && !out.contains(id)
        {
            out.push(id.clone());
        }
    }
    out
}

/// Scenes that must be rendered before `scene` composites, dependencies first.
///
/// Follows the compositors of the referenced scenes transitively. Each scene appears once. A
/// scene reached again while its own dependencies are being resolved is a cycle and fails with
/// a configuration error naming the chain. Scenes missing from the store are skipped.
#[tracing::instrument(skip_all, fields(scene = %scene.id))]
pub fn dependency_order(store: &SceneStore, scene: &Scene) -> JobResult<Vec<SceneId>> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut path = vec![scene.id.clone()];
    visit(store, scene, &mut path, &mut done, &mut order)?;
    Ok(order)
}

fn visit(
    store: &SceneStore,
    scene: &Scene,
    path: &mut Vec<SceneId>,
    done: &mut HashSet<SceneId>,
    order: &mut Vec<SceneId>,
) -> JobResult<()> {
    for dep in referenced_scenes(scene) {
        if done.contains(&dep) {
            continue;
        }
        if let Some(pos) = path.iter().position(|p| *p == dep) {
            let chain: Vec<String> = path[pos..]
                .iter()
                .chain(std::iter::once(&dep))
                .map(ToString::to_string)
                .collect();
            return Err(JobError::configuration(format!(
                "Scene dependency cycle: {}",
                chain.join(" -> ")
            )));
        }
        let Some(sub) = store.snapshot(&dep) else {
            tracing::warn!(scene = %dep, "compositor references a missing scene");
            done.insert(dep);
            continue;
        };
        path.push(dep.clone());
        visit(store, &sub, path, done, order)?;
        path.pop();
        done.insert(dep.clone());
        order.push(dep);
    }
    Ok(())
}

impl Pipeline {
    #[tracing::instrument(skip_all, fields(job = job.name(), scene = %scene.id))]
    pub(crate) fn render_compositor(
        &self,
        store: &SceneStore,
        job: &RenderJob,
        scene: &Scene,
    ) -> JobResult<()> {
        let deps = match dependency_order(store, scene) {
            Ok(deps) => deps,
            Err(err) => {
                job.reports().error(err.to_string());
                job.set_state(JobState::Failed);
                return Err(err);
            }
        };

        if deps.is_empty() {
            self.render_engine(job, scene)?;
            self.end_single_layer(job)?;
            job.display_update(None);
            return Ok(());
        }

        if compositor_reads_own_scene(scene) {
            self.render_engine(job, scene)?;
        } else {
            let settings = job.settings();
            let rect = if settings.config.crop {
                settings.disprect
            } else {
                PixelRect::from_size(settings.winx, settings.winy)
            };
            let buf = AccumBuffer::for_render(
                rect,
                view_list(&settings.config),
                &settings.view_layers,
                settings.single_layer_name(),
            );
            job.replace_result(buf);
        }
        self.end_single_layer(job)?;

        if !job.test_break() && !job.has_single_layer() {
            for dep in &deps {
                if job.test_break() {
                    break;
                }
                if let Err(err) = self.render_dependency(store, job, scene, dep) {
                    tracing::warn!(dependency = %dep, "dependency render failed: {err}");
                }
            }
            job.current_scene_update(&scene.id);
        }

        if !job.test_break() {
            self.evaluate_tree(job, scene);
        }
        job.display_update(None);
        Ok(())
    }

    fn end_single_layer(&self, job: &RenderJob) -> JobResult<()> {
        if !job.has_single_layer() {
            return Ok(());
        }
        job.pop_single_layer_result(job.test_break())
    }

    /// Run the node tree once per view.
    fn evaluate_tree(&self, job: &RenderJob, scene: &Scene) {
        let Some(tree) = scene.node_tree.as_ref() else {
            return;
        };
        let config = job.settings().config;
        for (view_id, view_name) in config.view_names().iter().enumerate() {
            if job.test_break() {
                break;
            }
            job.set_active_view(view_name);
            let req = CompositeRequest {
                scene,
                tree,
                config: &config,
                allow_interactive: false,
                view_name,
                view_id,
                job,
                registry: &self.registry,
                hooks: CompositeHooks::new(job),
            };
            if let Err(err) = self.services.compositor.execute(&req) {
                job.reports()
                    .error(format!("Compositing failed in scene \"{}\": {err}", scene.id));
            }
        }
    }

    /// Render `dep` in its own job at the parent's size and border, sharing the parent's
    /// reports and display callbacks.
    #[tracing::instrument(skip_all, fields(parent = parent.name(), dependency = %dep))]
    fn render_dependency(
        &self,
        store: &SceneStore,
        parent: &RenderJob,
        parent_scene: &Scene,
        dep: &SceneId,
    ) -> JobResult<()> {
        let Some(base) = store.snapshot(dep) else {
            parent
                .reports()
                .error(format!("Scene \"{dep}\" not found"));
            return Err(JobError::configuration(format!("scene '{dep}' not found")));
        };
        let mut graph = self
            .services
            .graphs
            .build_for_render(&base, base.default_render_layer())?;
        graph.evaluate_on_frame_change(parent_scene.frame);
        let scene = graph.evaluated_scene().clone();

        let job = self.registry.new_scene_job(dep);
        let parent_settings = parent.settings();
        job.set_reports(parent.reports());
        let cb = parent.callbacks();
        job.update_callbacks(|slots| {
            slots.display_update = cb.display_update;
            slots.test_break = cb.test_break;
            slots.stats = cb.stats;
            slots.current_scene_update = cb.current_scene_update;
        });
        job.init(InitRequest {
            config: &scene.render,
            view_layers: &scene.view_layers,
            single_layer: None,
            winx: parent_settings.winx,
            winy: parent_settings.winy,
            disprect: Some(parent_settings.disprect),
            source: Some(parent),
        })?;
        job.update_settings(|s| {
            s.scene = Some(scene.id.clone());
            s.frame = scene.frame;
            s.state = JobState::Rendering;
        });

        let rendered = self.render_engine(&job, &scene);
        job.set_state(match &rendered {
            Err(_) => JobState::Failed,
            Ok(()) if job.test_break() => JobState::Cancelled,
            Ok(()) => JobState::Done,
        });
        release_pipeline(&job);
        rendered
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/compositor.rs"]
mod tests;
