use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::{
    job::job::RenderJob,
    scene::model::SceneId,
};

type TeardownHook = Box<dyn FnOnce() + Send>;

/// Name-keyed collection of render jobs, owned by the host application.
///
/// Lifecycle: [`RenderRegistry::init_process`] at startup, [`RenderRegistry::teardown_process`]
/// at shutdown. Every job shares the registry's stop flag.
pub struct RenderRegistry {
    jobs: RwLock<HashMap<String, Arc<RenderJob>>>,
    stop: Arc<AtomicBool>,
    teardown: Mutex<Vec<TeardownHook>>,
}

impl std::fmt::Debug for RenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRegistry")
            .field("jobs", &self.names())
            .field("stop", &self.stop_requested())
            .finish_non_exhaustive()
    }
}

impl RenderRegistry {
    /// Create the process-wide registry.
    pub fn init_process() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            stop: Arc::new(AtomicBool::new(false)),
            teardown: Mutex::new(Vec::new()),
        }
    }

    /// Free every job and run the teardown hooks.
    pub fn teardown_process(self) {
        self.free_all();
    }

    /// Existing job named `name`, or a new one with no-op callbacks.
    pub fn get_or_create(&self, name: &str) -> Arc<RenderJob> {
        if let Some(job) = self.jobs.read().get(name) {
            return Arc::clone(job);
        }
        let mut jobs = self.jobs.write();
        let job = jobs
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(job = name, "new render job");
                Arc::new(RenderJob::new(name, Arc::clone(&self.stop)))
            });
        Arc::clone(job)
    }

    /// Job named `name`; never allocates.
    pub fn find(&self, name: &str) -> Option<Arc<RenderJob>> {
        self.jobs.read().get(name).cloned()
    }

    /// Remove `job` from the registry and release everything it owns.
    pub fn free(&self, job: &Arc<RenderJob>) {
        let removed = {
            let mut jobs = self.jobs.write();
            match jobs.get(job.name()) {
                Some(existing) if Arc::ptr_eq(existing, job) => jobs.remove(job.name()),
                _ => None,
            }
        };
        if removed.is_some() {
            tracing::debug!(job = job.name(), "render job freed");
        }
        job.free_all();
    }

    /// Free every job, then run the registered teardown hooks once.
    pub fn free_all(&self) {
        let jobs: Vec<_> = self.jobs.write().drain().map(|(_, job)| job).collect();
        for job in jobs {
            job.free_all();
        }
        let hooks = std::mem::take(&mut *self.teardown.lock());
        for hook in hooks {
            hook();
        }
    }

    /// Register process-wide teardown run by [`RenderRegistry::free_all`].
    pub fn add_teardown_hook(&self, hook: impl FnOnce() + Send + 'static) {
        self.teardown.lock().push(Box::new(hook));
    }

    /// Drop the current and pushed results of every job.
    pub fn free_all_results(&self) {
        for job in self.jobs() {
            job.clear_all_results();
        }
    }

    /// Release retained backends of jobs rendering `scene` (all jobs when `None`).
    ///
    /// Backends that are rendering right now are left alone.
    pub fn free_persistent_data(&self, scene: Option<&SceneId>) {
        for job in self.jobs() {
            if let Some(scene) = scene
                && job.settings().scene.as_ref() != Some(scene)
            {
                continue;
            }
            if job.is_engine_busy() {
                continue;
            }
            job.free_engine();
        }
    }

    /// Job rendering `scene`, when one exists.
    pub fn get_scene_job(&self, scene: &SceneId) -> Option<Arc<RenderJob>> {
        self.find(&scene_job_name(scene))
    }

    /// Job rendering `scene`, created on demand.
    pub fn new_scene_job(&self, scene: &SceneId) -> Arc<RenderJob> {
        self.get_or_create(&scene_job_name(scene))
    }

    /// Snapshot of all jobs.
    pub fn jobs(&self) -> Vec<Arc<RenderJob>> {
        self.jobs.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.jobs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Ask every running job to stop.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Registry name of the job rendering `scene`.
///
/// Scenes linked from a library are prefixed with the library name, so same-named scenes from
/// different files get different jobs.
pub fn scene_job_name(scene: &SceneId) -> String {
    scene.to_string()
}

#[cfg(test)]
#[path = "../../tests/unit/job/registry.rs"]
mod tests;
