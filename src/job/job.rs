use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::{
    backend::{engine::RenderBackend, graph::EvalGraph},
    buffer::{accum::{AccumBuffer, BufferId}, image::ImageRect},
    foundation::{core::PixelRect, report::Reports},
    job::{callbacks::JobCallbacks, stats::RenderStats},
    output::movie::MovieWriter,
    scene::{config::RenderConfig, model::{FrameClock, SceneId, ViewLayer}},
};

/// Lifecycle state of a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created or re-initialized, not yet checked.
    #[default]
    Unvalidated,
    /// Passed the validation gate.
    Validated,
    /// A frame or animation is in progress.
    Rendering,
    /// The last run finished.
    Done,
    /// The last init or run failed; see the job's reports.
    Failed,
    /// The last run stopped through the cancellation poll.
    Cancelled,
}

impl JobState {
    /// Return `true` unless the job failed.
    pub fn is_ok(self) -> bool {
        self != Self::Failed
    }

    /// Return `true` once a run ended, whatever the outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Job-private copy of everything the render thread reads.
#[derive(Clone, Debug)]
pub struct JobSettings {
    pub config: RenderConfig,
    pub view_layers: Vec<ViewLayer>,
    /// Index into `view_layers` of the single layer being rendered.
    pub active_layer: usize,
    pub single_layer: bool,
    /// Full frame size.
    pub winx: u32,
    pub winy: u32,
    /// Part of the full frame being rendered.
    pub disprect: PixelRect,
    pub state: JobState,
    pub active_view: String,
    pub camera_override: Option<String>,
    pub scene: Option<SceneId>,
    pub frame: FrameClock,
    pub threads: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            config: RenderConfig::default(),
            view_layers: Vec::new(),
            active_layer: 0,
            single_layer: false,
            winx: 0,
            winy: 0,
            disprect: PixelRect::default(),
            state: JobState::Unvalidated,
            active_view: String::new(),
            camera_override: None,
            scene: None,
            frame: FrameClock::default(),
            threads: 1,
        }
    }
}

impl JobSettings {
    /// Size of the rendered rectangle.
    pub fn render_size(&self) -> (u32, u32) {
        (self.disprect.width(), self.disprect.height())
    }

    /// Name of the single layer, when rendering only one.
    pub fn single_layer_name(&self) -> Option<&str> {
        if !self.single_layer {
            return None;
        }
        self.view_layers
            .get(self.active_layer)
            .map(|l| l.name.as_str())
    }

    /// Name of the layer shown by default.
    pub fn active_layer_name(&self) -> Option<&str> {
        self.view_layers
            .get(self.active_layer)
            .map(|l| l.name.as_str())
    }
}

/// Current and pushed-aside result buffers, guarded together.
#[derive(Debug, Default)]
pub struct ResultSlots {
    pub current: Option<AccumBuffer>,
    /// Full result kept aside while a single layer re-renders.
    pub pushed: Option<AccumBuffer>,
}

pub type ResultRead<'a> = MappedRwLockReadGuard<'a, Option<AccumBuffer>>;
pub type ResultWrite<'a> = MappedRwLockWriteGuard<'a, Option<AccumBuffer>>;

/// One render unit bound to a scene name.
///
/// Shared as `Arc<RenderJob>` between the render thread and display code. The result buffer
/// sits behind a reader/writer lock; the render thread takes the write side only to swap or
/// reshape the buffer and for brief tile copies. Tile highlights and interactive draws have
/// their own locks, never held together with the result lock.
pub struct RenderJob {
    name: String,
    result: RwLock<ResultSlots>,
    tiles: Mutex<Option<HashSet<PixelRect>>>,
    draw: Mutex<()>,
    callbacks: RwLock<JobCallbacks>,
    stats: Mutex<RenderStats>,
    stop: Arc<AtomicBool>,
    engine: Mutex<Option<Arc<dyn RenderBackend>>>,
    engine_busy: AtomicBool,
    graph: Mutex<Option<Box<dyn EvalGraph>>>,
    movies: Mutex<Vec<Box<dyn MovieWriter>>>,
    reports: RwLock<Arc<Reports>>,
    settings: Mutex<JobSettings>,
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderJob")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RenderJob {
    pub(crate) fn new(name: impl Into<String>, stop: Arc<AtomicBool>) -> Self {
        Self {
            name: name.into(),
            result: RwLock::new(ResultSlots::default()),
            tiles: Mutex::new(None),
            draw: Mutex::new(()),
            callbacks: RwLock::new(JobCallbacks::default()),
            stats: Mutex::new(RenderStats::default()),
            stop,
            engine: Mutex::new(None),
            engine_busy: AtomicBool::new(false),
            graph: Mutex::new(None),
            movies: Mutex::new(Vec::new()),
            reports: RwLock::new(Arc::new(Reports::new())),
            settings: Mutex::new(JobSettings::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- settings ----

    /// Snapshot of the job-private settings.
    pub fn settings(&self) -> JobSettings {
        self.settings.lock().clone()
    }

    pub(crate) fn update_settings<R>(&self, f: impl FnOnce(&mut JobSettings) -> R) -> R {
        f(&mut self.settings.lock())
    }

    pub fn state(&self) -> JobState {
        self.settings.lock().state
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.settings.lock().state = state;
    }

    /// Full frame size.
    pub fn window_size(&self) -> (u32, u32) {
        let s = self.settings.lock();
        (s.winx, s.winy)
    }

    /// Rectangle of the full frame being rendered.
    pub fn render_rect(&self) -> PixelRect {
        self.settings.lock().disprect
    }

    pub fn has_single_layer(&self) -> bool {
        self.settings.lock().single_layer
    }

    pub fn thread_count(&self) -> usize {
        self.settings.lock().threads
    }

    // ---- reports ----

    pub fn reports(&self) -> Arc<Reports> {
        Arc::clone(&self.reports.read())
    }

    /// Route diagnostics into another sink (dependency jobs share their parent's).
    pub fn set_reports(&self, reports: Arc<Reports>) {
        *self.reports.write() = reports;
    }

    // ---- callbacks ----

    pub fn callbacks(&self) -> JobCallbacks {
        self.callbacks.read().clone()
    }

    pub fn set_callbacks(&self, callbacks: JobCallbacks) {
        *self.callbacks.write() = callbacks;
    }

    /// Register or clear individual slots.
    pub fn update_callbacks(&self, f: impl FnOnce(&mut JobCallbacks)) {
        f(&mut self.callbacks.write());
    }

    pub(crate) fn display_init(&self) {
        let cb = self.callbacks.read().display_init.clone();
        if let Some(cb) = cb {
            cb(self);
        }
    }

    pub(crate) fn display_clear(&self) {
        let cb = self.callbacks.read().display_clear.clone();
        if let Some(cb) = cb {
            cb(self);
        }
    }

    pub(crate) fn display_update(&self, rect: Option<PixelRect>) {
        let cb = self.callbacks.read().display_update.clone();
        if let Some(cb) = cb {
            cb(self, rect);
        }
    }

    pub(crate) fn current_scene_update(&self, scene: &SceneId) {
        let cb = self.callbacks.read().current_scene_update.clone();
        if let Some(cb) = cb {
            cb(scene);
        }
    }

    pub(crate) fn progress(&self, value: f32) {
        self.stats.lock().progress = value;
        let cb = self.callbacks.read().progress.clone();
        if let Some(cb) = cb {
            cb(value);
        }
    }

    /// Push the current stats to the stats callback.
    pub(crate) fn stats_draw(&self) {
        let cb = self.callbacks.read().stats.clone();
        if let Some(cb) = cb {
            let snapshot = self.stats.lock().clone();
            cb(&snapshot);
        }
    }

    // ---- stats ----

    pub fn stats(&self) -> RenderStats {
        self.stats.lock().clone()
    }

    pub(crate) fn update_stats<R>(&self, f: impl FnOnce(&mut RenderStats) -> R) -> R {
        f(&mut self.stats.lock())
    }

    // ---- cancellation ----

    /// Set the process-wide stop flag.
    pub fn request_cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Cancellation poll: the process stop flag, then the job's own poll.
    pub fn test_break(&self) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        let cb = self.callbacks.read().test_break.clone();
        cb.is_some_and(|cb| cb())
    }

    pub(crate) fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stop
    }

    // ---- result access ----

    /// Read access to the current result; the lock is released when the guard drops.
    pub fn acquire_result_read(&self) -> ResultRead<'_> {
        RwLockReadGuard::map(self.result.read(), |slots| &slots.current)
    }

    /// Write access to the current result.
    ///
    /// Do not call job-mutating methods while holding the guard.
    pub fn acquire_result_write(&self) -> ResultWrite<'_> {
        RwLockWriteGuard::map(self.result.write(), |slots| &mut slots.current)
    }

    pub(crate) fn lock_slots(&self) -> RwLockWriteGuard<'_, ResultSlots> {
        self.result.write()
    }

    /// Read-guarded pixels displayed for `view_id`.
    ///
    /// The composited image of the view when one exists, else the combined pass of the active
    /// layer.
    pub fn acquire_result_image(
        &self,
        view_id: usize,
    ) -> Option<MappedRwLockReadGuard<'_, ImageRect>> {
        let layer = self.settings.lock().active_layer_name().map(str::to_string);
        RwLockReadGuard::try_map(self.result.read(), |slots| {
            slots
                .current
                .as_ref()?
                .display_image(view_id, layer.as_deref())
        })
        .ok()
    }

    /// 8-bit sRGB copy of the displayed image as `(width, height, rgba)`.
    pub fn result_rgba8(&self, view_id: usize) -> Option<(u32, u32, Vec<u8>)> {
        let image = self.acquire_result_image(view_id)?;
        Some((image.width, image.height, image.to_rgba8()))
    }

    pub fn result_id(&self) -> Option<BufferId> {
        self.result.read().current.as_ref().map(AccumBuffer::id)
    }

    pub fn result_size(&self) -> Option<(u32, u32)> {
        self.result.read().current.as_ref().map(AccumBuffer::size)
    }

    /// Drop the current result.
    pub fn clear_result(&self) {
        self.result.write().current = None;
    }

    /// Drop the current and pushed results.
    pub fn clear_all_results(&self) {
        let mut slots = self.result.write();
        slots.current = None;
        slots.pushed = None;
    }

    /// Exchange the job's current result with `other`.
    pub fn swap_result(&self, other: &mut Option<AccumBuffer>) {
        std::mem::swap(&mut self.result.write().current, other);
    }

    pub(crate) fn replace_result(&self, buffer: AccumBuffer) -> Option<AccumBuffer> {
        self.result.write().current.replace(buffer)
    }

    pub fn has_pushed_result(&self) -> bool {
        self.result.read().pushed.is_some()
    }

    // ---- views ----

    pub fn set_active_view(&self, name: &str) {
        self.settings.lock().active_view = name.to_string();
    }

    pub fn active_view(&self) -> String {
        self.settings.lock().active_view.clone()
    }

    /// Index of the active view in the current result, `0` when unknown.
    pub fn active_view_index(&self) -> usize {
        let name = self.active_view();
        self.acquire_result_read()
            .as_ref()
            .and_then(|buf| buf.view_index(&name))
            .unwrap_or(0)
    }

    // ---- tiles ----

    /// Mark or unmark a tile as in flight.
    pub fn highlight_tile(&self, rect: PixelRect, on: bool) {
        let mut tiles = self.tiles.lock();
        if on {
            tiles.get_or_insert_with(HashSet::new).insert(rect);
        } else if let Some(set) = tiles.as_mut() {
            set.remove(&rect);
        }
    }

    pub fn highlighted_tiles(&self) -> Vec<PixelRect> {
        self.tiles
            .lock()
            .as_ref()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear_highlights(&self) {
        *self.tiles.lock() = None;
    }

    // ---- backend ----

    pub fn engine(&self) -> Option<Arc<dyn RenderBackend>> {
        self.engine.lock().clone()
    }

    pub(crate) fn set_engine(&self, engine: Option<Arc<dyn RenderBackend>>) {
        *self.engine.lock() = engine;
    }

    /// Release the backend, calling its teardown.
    pub(crate) fn free_engine(&self) {
        let engine = self.engine.lock().take();
        if let Some(engine) = engine {
            engine.free();
        }
    }

    pub fn is_engine_busy(&self) -> bool {
        self.engine_busy.load(Ordering::SeqCst)
    }

    pub(crate) fn set_engine_busy(&self, busy: bool) {
        self.engine_busy.store(busy, Ordering::SeqCst);
    }

    /// Interactive redraw of the backend, serialized through the draw lock.
    pub fn draw_engine(&self) -> bool {
        let Some(engine) = self.engine() else {
            return false;
        };
        let _draw = self.draw.lock();
        let lock_cb = self.callbacks.read().draw_lock.clone();
        if let Some(cb) = &lock_cb {
            cb(true);
        }
        let drawn = engine.draw(self);
        if let Some(cb) = &lock_cb {
            cb(false);
        }
        drawn
    }

    // ---- evaluation graph ----

    pub(crate) fn set_graph(&self, graph: Option<Box<dyn EvalGraph>>) {
        *self.graph.lock() = graph;
    }

    pub fn has_graph(&self) -> bool {
        self.graph.lock().is_some()
    }

    pub(crate) fn with_graph<R>(&self, f: impl FnOnce(&mut dyn EvalGraph) -> R) -> Option<R> {
        let mut graph = self.graph.lock();
        match graph.as_deref_mut() {
            Some(g) => Some(f(g)),
            None => None,
        }
    }

    // ---- movie writers ----

    pub(crate) fn set_movies(&self, writers: Vec<Box<dyn MovieWriter>>) {
        *self.movies.lock() = writers;
    }

    pub(crate) fn take_movies(&self) -> Vec<Box<dyn MovieWriter>> {
        std::mem::take(&mut *self.movies.lock())
    }

    pub(crate) fn with_movies<R>(&self, f: impl FnOnce(&mut Vec<Box<dyn MovieWriter>>) -> R) -> R {
        f(&mut self.movies.lock())
    }

    // ---- teardown ----

    /// Release the transient resources of a finished run: the scoped graph, tile markers and,
    /// unless `keep_engine`, the backend.
    pub(crate) fn free_pipeline(&self, keep_engine: bool) {
        self.set_graph(None);
        self.clear_highlights();
        if !keep_engine {
            self.free_engine();
        }
        self.update_stats(|s| s.is_rendering = false);
    }

    /// Release everything the job owns.
    pub(crate) fn free_all(&self) {
        self.free_pipeline(false);
        for writer in self.take_movies() {
            if let Err(err) = writer.finish() {
                tracing::warn!(job = %self.name, "closing movie on free failed: {err}");
            }
        }
        self.clear_all_results();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/job.rs"]
mod tests;
