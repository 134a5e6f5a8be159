use crate::{
    foundation::error::JobResult,
    scene::model::{FrameClock, Scene, ViewLayer},
};

/// Scene evaluation scoped to one render run.
pub trait EvalGraph: Send {
    /// Re-evaluate for a new frame.
    fn evaluate_on_frame_change(&mut self, frame: FrameClock);

    /// Scene state at the last evaluated frame.
    fn evaluated_scene(&self) -> &Scene;
}

/// Builds evaluation graphs for rendering.
pub trait EvalGraphBuilder: Send + Sync {
    fn build_for_render(
        &self,
        scene: &Scene,
        view_layer: Option<&ViewLayer>,
    ) -> JobResult<Box<dyn EvalGraph>>;
}

/// Builder of [`SnapshotGraph`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotGraphBuilder;

impl EvalGraphBuilder for SnapshotGraphBuilder {
    fn build_for_render(
        &self,
        scene: &Scene,
        view_layer: Option<&ViewLayer>,
    ) -> JobResult<Box<dyn EvalGraph>> {
        tracing::debug!(
            scene = %scene.id,
            layer = view_layer.map(|l| l.name.as_str()),
            "build render graph"
        );
        Ok(Box::new(SnapshotGraph::new(scene.clone())))
    }
}

/// Graph over a scene snapshot taken at build time.
///
/// Evaluation copies the snapshot, moves it to the frame and applies its layer visibility
/// keys.
#[derive(Clone, Debug)]
pub struct SnapshotGraph {
    base: Scene,
    evaluated: Scene,
    evaluations: usize,
}

impl SnapshotGraph {
    pub fn new(base: Scene) -> Self {
        Self {
            evaluated: base.clone(),
            base,
            evaluations: 0,
        }
    }

    /// Number of frame evaluations since the graph was built.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl EvalGraph for SnapshotGraph {
    fn evaluate_on_frame_change(&mut self, frame: FrameClock) {
        let mut scene = self.base.clone();
        scene.frame = frame;
        scene.apply_layer_keys();
        self.evaluated = scene;
        self.evaluations += 1;
    }

    fn evaluated_scene(&self) -> &Scene {
        &self.evaluated
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/graph.rs"]
mod tests;
