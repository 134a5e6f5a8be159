use std::collections::BTreeMap;
use std::fmt;

use crate::{
    foundation::core::Rgba,
    scene::{config::RenderConfig, nodes::NodeTree, strips::Editing},
};

/// Identity of a scene, qualified by the library it was linked from.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SceneId {
    /// Scene name, unique within its library.
    pub name: String,
    /// Library the scene was linked from; `None` for local scenes.
    #[serde(default)]
    pub library: Option<String>,
}

impl SceneId {
    /// Local scene id.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: None,
        }
    }

    /// Scene id linked from `library`.
    pub fn linked(library: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: Some(library.into()),
        }
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library {
            Some(lib) => write!(f, "{lib} {}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A named layer of the scene that renders into its own result layer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ViewLayer {
    /// Layer name.
    pub name: String,
    /// Whether the layer takes part in regular renders.
    #[serde(default = "default_true")]
    pub use_for_render: bool,
    /// Extra passes beyond `Combined` (for example `"Depth"`).
    #[serde(default)]
    pub passes: Vec<String>,
}

impl ViewLayer {
    /// Rendered layer with only the combined pass.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_for_render: true,
            passes: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Current time of a scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FrameClock {
    /// Current integer frame.
    pub current: i32,
    /// Sub-frame offset in `[0, 1)`.
    pub subframe: f32,
}

impl FrameClock {
    /// Frame as a float time.
    pub fn ctime(self) -> f32 {
        self.current as f32 + self.subframe
    }
}

/// Animation channels owned by the scene itself (not by its objects).
///
/// Evaluated before the render job is set up for a frame so that view-layer visibility and a
/// remapped current frame are known before layers are allocated.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneChannels {
    /// Requested frame to evaluated frame.
    pub frame_remap: BTreeMap<i32, i32>,
    /// Step keys toggling view-layer visibility.
    pub layer_keys: Vec<LayerKey>,
}

/// Step key for a view layer's render flag.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LayerKey {
    /// Frame the key takes effect.
    pub frame: i32,
    /// View layer name.
    pub layer: String,
    /// New value of [`ViewLayer::use_for_render`].
    pub use_for_render: bool,
}

/// One scene: render settings, layers, cameras and the three possible image sources.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    /// Identity.
    pub id: SceneId,
    /// Render settings.
    #[serde(default)]
    pub render: RenderConfig,
    /// View layers in order.
    #[serde(default)]
    pub view_layers: Vec<ViewLayer>,
    /// Active camera.
    #[serde(default)]
    pub camera: Option<String>,
    /// Cameras present in the default render layer.
    #[serde(default)]
    pub cameras: Vec<String>,
    /// Background color used by the built-in backend.
    #[serde(default)]
    pub world_color: Rgba,
    /// Compositing nodes are enabled for this scene.
    #[serde(default)]
    pub use_nodes: bool,
    /// Compositing node tree.
    #[serde(default)]
    pub node_tree: Option<NodeTree>,
    /// Sequencer strips.
    #[serde(default)]
    pub sequencer: Option<Editing>,
    /// Current time.
    #[serde(default)]
    pub frame: FrameClock,
    /// Scene-level animation.
    #[serde(default)]
    pub channels: SceneChannels,
}

impl Scene {
    /// Empty local scene with a single render layer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SceneId::local(name),
            render: RenderConfig::default(),
            view_layers: vec![ViewLayer::new("ViewLayer")],
            camera: None,
            cameras: Vec::new(),
            world_color: Rgba::default(),
            use_nodes: false,
            node_tree: None,
            sequencer: None,
            frame: FrameClock::default(),
            channels: SceneChannels::default(),
        }
    }

    /// Camera used when nothing overrides it: the scene camera, else the first camera of the
    /// default render layer.
    pub fn resolve_camera(&self) -> Option<&str> {
        self.camera
            .as_deref()
            .or_else(|| self.cameras.first().map(String::as_str))
    }

    /// Return `true` when a camera with this exact name exists.
    pub fn has_camera(&self, name: &str) -> bool {
        self.cameras.iter().any(|c| c == name) || self.camera.as_deref() == Some(name)
    }

    /// Compositing is requested and the scene opted into nodes.
    pub fn compositing_active(&self) -> bool {
        self.render.pipeline.compositing && self.use_nodes
    }

    /// Sequencer output replaces the scene render for this frame.
    ///
    /// Requires the sequencer flag and at least one non-audio strip.
    pub fn sequencer_active(&self) -> bool {
        self.render.pipeline.sequencer
            && self
                .sequencer
                .as_ref()
                .is_some_and(|ed| ed.has_visual_strips())
    }

    /// At least one layer renders, or a single layer is explicitly selected.
    pub fn has_layers_to_render(&self, single_layer: Option<&str>) -> bool {
        single_layer.is_some() || self.view_layers.iter().any(|l| l.use_for_render)
    }

    /// Index of a view layer by name.
    pub fn view_layer_index(&self, name: &str) -> Option<usize> {
        self.view_layers.iter().position(|l| l.name == name)
    }

    /// View layer used to build the render evaluation graph.
    pub fn default_render_layer(&self) -> Option<&ViewLayer> {
        self.view_layers
            .iter()
            .find(|l| l.use_for_render)
            .or_else(|| self.view_layers.first())
    }

    /// Evaluate the scene's own channels at its current frame.
    ///
    /// Layer keys are evaluated at the requested frame; the frame remap is applied last.
    pub fn evaluate_own_channels(&mut self) {
        self.apply_layer_keys();
        if let Some(&mapped) = self.channels.frame_remap.get(&self.frame.current) {
            self.frame.current = mapped;
        }
    }

    /// Apply view-layer visibility keys at the current frame.
    pub fn apply_layer_keys(&mut self) {
        let requested = self.frame.current;
        for layer in &mut self.view_layers {
            let key = self
                .channels
                .layer_keys
                .iter()
                .filter(|k| k.layer == layer.name && k.frame <= requested)
                .max_by_key(|k| k.frame);
            if let Some(key) = key {
                layer.use_for_render = key.use_for_render;
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/model.rs"]
mod tests;
