use std::fmt;
use std::sync::Arc;

use crate::{
    foundation::core::PixelRect,
    job::{job::RenderJob, stats::RenderStats},
    scene::model::SceneId,
};

pub type DisplayFn = Arc<dyn Fn(&RenderJob) + Send + Sync>;
pub type DisplayUpdateFn = Arc<dyn Fn(&RenderJob, Option<PixelRect>) + Send + Sync>;
pub type SceneUpdateFn = Arc<dyn Fn(&SceneId) + Send + Sync>;
pub type StatsFn = Arc<dyn Fn(&RenderStats) + Send + Sync>;
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;
pub type DrawLockFn = Arc<dyn Fn(bool) + Send + Sync>;
pub type TestBreakFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callback slots of a [`RenderJob`]. An empty slot is a no-op.
///
/// Display callbacks are always invoked without any job lock held, so they may take the
/// result read lock themselves.
#[derive(Clone, Default)]
pub struct JobCallbacks {
    /// A new result buffer was allocated.
    pub display_init: Option<DisplayFn>,
    /// The viewer should clear before pixels arrive.
    pub display_clear: Option<DisplayFn>,
    /// Pixels changed, optionally only inside a rectangle.
    pub display_update: Option<DisplayUpdateFn>,
    /// The scene being rendered changed (dependency and strip scenes).
    pub current_scene_update: Option<SceneUpdateFn>,
    pub stats: Option<StatsFn>,
    pub progress: Option<ProgressFn>,
    /// Bracket around interactive backend draws.
    pub draw_lock: Option<DrawLockFn>,
    /// Cancellation poll, consulted in addition to the process stop flag.
    pub test_break: Option<TestBreakFn>,
}

impl JobCallbacks {
    /// Callbacks for headless rendering: stats are logged, everything else is a no-op.
    pub fn background() -> Self {
        Self {
            stats: Some(Arc::new(|stats: &RenderStats| {
                tracing::info!(target: "renderjob::stats", "{}", stats.summary());
            })),
            ..Self::default()
        }
    }

    pub fn with_display_init(mut self, f: impl Fn(&RenderJob) + Send + Sync + 'static) -> Self {
        self.display_init = Some(Arc::new(f));
        self
    }

    pub fn with_display_clear(mut self, f: impl Fn(&RenderJob) + Send + Sync + 'static) -> Self {
        self.display_clear = Some(Arc::new(f));
        self
    }

    pub fn with_display_update(
        mut self,
        f: impl Fn(&RenderJob, Option<PixelRect>) + Send + Sync + 'static,
    ) -> Self {
        self.display_update = Some(Arc::new(f));
        self
    }

    pub fn with_stats(mut self, f: impl Fn(&RenderStats) + Send + Sync + 'static) -> Self {
        self.stats = Some(Arc::new(f));
        self
    }

    pub fn with_progress(mut self, f: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn with_draw_lock(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.draw_lock = Some(Arc::new(f));
        self
    }

    pub fn with_test_break(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.test_break = Some(Arc::new(f));
        self
    }

    pub fn with_scene_update(mut self, f: impl Fn(&SceneId) + Send + Sync + 'static) -> Self {
        self.current_scene_update = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for JobCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCallbacks")
            .field("display_init", &self.display_init.is_some())
            .field("display_clear", &self.display_clear.is_some())
            .field("display_update", &self.display_update.is_some())
            .field("current_scene_update", &self.current_scene_update.is_some())
            .field("stats", &self.stats.is_some())
            .field("progress", &self.progress.is_some())
            .field("draw_lock", &self.draw_lock.is_some())
            .field("test_break", &self.test_break.is_some())
            .finish()
    }
}
