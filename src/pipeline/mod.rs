//! The render pipeline: validation, phase dispatch, single frames and animations.
//!
//! A [`Pipeline`] bundles the job registry with the collaborators that produce pixels
//! ([`RenderServices`]). It runs on the render thread; display code talks to the jobs
//! directly through their result locks.

/// Animation loop.
pub mod anim;
/// Compositor phase and scene dependency ordering.
pub mod compositor;
/// Engine phase, full-pipeline phase selection, uncrop and stamping.
pub mod dispatch;
/// Single frame, still output and preview renders.
pub mod frame;
/// Sequencer phase and scene-strip re-entry.
pub mod sequencer;
/// Pre-flight checks.
pub mod validate;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use parking_lot::Mutex;

use crate::{
    backend::{
        compositor::{LayerCompositor, NodeEvaluator},
        engine::{BackendFactory, BuiltinBackends},
        graph::{EvalGraphBuilder, SnapshotGraphBuilder},
        sequencer::{SequencerRenderer, StripSequencer},
    },
    job::registry::RenderRegistry,
    output::movie::{FfmpegMovieFactory, MovieWriterFactory},
    scene::model::SceneId,
};

pub use anim::{AnimRequest, AnimStats};
pub use dispatch::Phase;
pub use frame::FrameRequest;

/// Application-level notifications fired around renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    /// A render run starts.
    Init,
    /// A frame is about to render.
    Pre,
    /// A frame finished rendering.
    Post,
    /// A frame was written.
    Write,
    /// Frame timing is final.
    Stats,
    /// The run was cancelled.
    Cancel,
    /// The run finished without cancellation.
    Complete,
}

pub type EventHook = Arc<dyn Fn(PipelineEvent, &SceneId) + Send + Sync>;

/// Registered [`PipelineEvent`] listeners, called in registration order.
#[derive(Clone, Default)]
pub struct PipelineEvents {
    hooks: Vec<EventHook>,
}

impl fmt::Debug for PipelineEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEvents")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl PipelineEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, hook: impl Fn(PipelineEvent, &SceneId) + Send + Sync + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn fire(&self, event: PipelineEvent, scene: &SceneId) {
        tracing::trace!(?event, scene = %scene, "pipeline event");
        for hook in &self.hooks {
            hook(event, scene);
        }
    }
}

/// Collaborators the pipeline drives.
#[derive(Clone)]
pub struct RenderServices {
    pub backends: Arc<dyn BackendFactory>,
    pub compositor: Arc<dyn NodeEvaluator>,
    pub sequencer: Arc<dyn SequencerRenderer>,
    pub graphs: Arc<dyn EvalGraphBuilder>,
    pub movies: Arc<dyn MovieWriterFactory>,
    pub events: PipelineEvents,
}

impl Default for RenderServices {
    fn default() -> Self {
        Self {
            backends: Arc::new(BuiltinBackends),
            compositor: Arc::new(LayerCompositor),
            sequencer: Arc::new(StripSequencer::new()),
            graphs: Arc::new(SnapshotGraphBuilder),
            movies: Arc::new(FfmpegMovieFactory),
            events: PipelineEvents::default(),
        }
    }
}

impl fmt::Debug for RenderServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderServices")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl RenderServices {
    pub fn with_backends(mut self, backends: Arc<dyn BackendFactory>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_compositor(mut self, compositor: Arc<dyn NodeEvaluator>) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_sequencer(mut self, sequencer: Arc<dyn SequencerRenderer>) -> Self {
        self.sequencer = sequencer;
        self
    }

    pub fn with_graphs(mut self, graphs: Arc<dyn EvalGraphBuilder>) -> Self {
        self.graphs = graphs;
        self
    }

    pub fn with_movies(mut self, movies: Arc<dyn MovieWriterFactory>) -> Self {
        self.movies = movies;
        self
    }

    pub fn with_events(mut self, events: PipelineEvents) -> Self {
        self.events = events;
        self
    }
}

/// Render pipeline bound to a job registry.
#[derive(Debug)]
pub struct Pipeline {
    registry: Arc<RenderRegistry>,
    services: RenderServices,
    /// Nesting depth of sequencer phases; only the outermost one frees the strip cache.
    seq_depth: AtomicUsize,
    /// Scenes currently rendered for scene strips, innermost last.
    strip_stack: Mutex<Vec<SceneId>>,
}

impl Pipeline {
    pub fn new(registry: Arc<RenderRegistry>, services: RenderServices) -> Self {
        Self {
            registry,
            services,
            seq_depth: AtomicUsize::new(0),
            strip_stack: Mutex::new(Vec::new()),
        }
    }

    /// Pipeline with the built-in collaborators.
    pub fn with_defaults(registry: Arc<RenderRegistry>) -> Self {
        Self::new(registry, RenderServices::default())
    }

    pub fn registry(&self) -> &Arc<RenderRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &RenderServices {
        &self.services
    }

    pub(crate) fn fire(&self, event: PipelineEvent, scene: &SceneId) {
        self.services.events.fire(event, scene);
    }
}
