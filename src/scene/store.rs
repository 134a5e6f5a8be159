use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use parking_lot::RwLock;

use crate::{
    foundation::error::{JobError, JobResult},
    scene::{model::{Scene, SceneId}, nodes::NodeTree},
};

/// Scene shared between the pipeline and the host application.
pub type SharedScene = Arc<RwLock<Scene>>;

/// On-disk scene file layout.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SceneFile {
    /// Scenes.
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// Node group trees referenced by group nodes.
    #[serde(default)]
    pub node_groups: Vec<NodeTree>,
}

/// Scene database the pipeline reads from.
///
/// Scenes sit behind their own lock: the pipeline writes the current frame while rendering and
/// restores it afterwards, everything else is read-only during a render.
#[derive(Debug, Default)]
pub struct SceneStore {
    scenes: HashMap<SceneId, SharedScene>,
    order: Vec<SceneId>,
    node_groups: HashMap<String, NodeTree>,
    base_dir: PathBuf,
}

impl SceneStore {
    /// Empty store resolving relative output paths against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a parsed scene file.
    pub fn from_file(file: SceneFile, base_dir: impl Into<PathBuf>) -> JobResult<Self> {
        let mut store = Self {
            base_dir: base_dir.into(),
            ..Self::default()
        };
        for group in file.node_groups {
            store.add_node_group(group);
        }
        for scene in file.scenes {
            store.insert(scene);
        }
        store.validate()?;
        Ok(store)
    }

    /// Parse a JSON scene file.
    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> JobResult<Self> {
        let file: SceneFile = serde_json::from_str(json)?;
        Self::from_file(file, base_dir)
    }

    /// Load a JSON scene file; relative output paths resolve against its directory.
    pub fn load(path: &Path) -> JobResult<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read scene file '{}'", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::from_json(&json, base)
    }

    /// Add or replace a scene.
    pub fn insert(&mut self, scene: Scene) -> SharedScene {
        let id = scene.id.clone();
        let shared = Arc::new(RwLock::new(scene));
        if self.scenes.insert(id.clone(), shared.clone()).is_none() {
            self.order.push(id);
        }
        shared
    }

    /// Remove a scene.
    pub fn remove(&mut self, id: &SceneId) -> Option<SharedScene> {
        self.order.retain(|o| o != id);
        self.scenes.remove(id)
    }

    /// Add or replace a node group.
    pub fn add_node_group(&mut self, tree: NodeTree) {
        self.node_groups.insert(tree.name.clone(), tree);
    }

    /// Node groups by name.
    pub fn node_groups(&self) -> &HashMap<String, NodeTree> {
        &self.node_groups
    }

    /// Shared handle to a scene.
    pub fn get(&self, id: &SceneId) -> Option<SharedScene> {
        self.scenes.get(id).cloned()
    }

    /// Clone of a scene's current state.
    pub fn snapshot(&self, id: &SceneId) -> Option<Scene> {
        self.scenes.get(id).map(|s| s.read().clone())
    }

    /// Scene handle or a validation error naming it.
    pub fn require(&self, id: &SceneId) -> JobResult<SharedScene> {
        self.get(id)
            .ok_or_else(|| JobError::validation(format!("unknown scene \"{id}\"")))
    }

    /// Scene ids in insertion order.
    pub fn ids(&self) -> &[SceneId] {
        &self.order
    }

    /// Number of scenes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Return `true` when the store holds no scenes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Directory relative output paths resolve against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Set the directory relative output paths resolve against.
    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
    }

    /// Structural checks: render settings are sane and referenced scenes exist.
    pub fn validate(&self) -> JobResult<()> {
        let known: HashSet<&SceneId> = self.order.iter().collect();
        for id in &self.order {
            let scene = self.scenes[id].read();
            scene
                .render
                .validate()
                .map_err(|e| JobError::validation(format!("scene \"{id}\": {e}")))?;
            if let Some(tree) = &scene.node_tree {
                for (node, other, _) in tree.render_layer_nodes() {
                    if let Some(other) = other
                        && !known.contains(other)
                    {
                        return Err(JobError::validation(format!(
                            "scene \"{id}\": node \"{}\" references unknown scene \"{other}\"",
                            node.name
                        )));
                    }
                }
            }
            if let Some(ed) = &scene.sequencer {
                for strip in &ed.strips {
                    if let crate::scene::strips::StripKind::Scene { scene: other, .. } =
                        &strip.kind
                        && !known.contains(other)
                    {
                        return Err(JobError::validation(format!(
                            "scene \"{id}\": strip \"{}\" references unknown scene \"{other}\"",
                            strip.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/store.rs"]
mod tests;
