use std::collections::{HashMap, HashSet};

use crate::scene::model::SceneId;

/// Compositing node tree.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeTree {
    /// Tree name; group nodes refer to trees by this name.
    pub name: String,
    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Directed links `from -> to` between node names.
    #[serde(default)]
    pub links: Vec<NodeLink>,
}

/// One node of a [`NodeTree`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Unique name within the tree.
    pub name: String,
    /// Node type and its parameters.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Muted nodes are skipped by evaluation and validation.
    #[serde(default)]
    pub muted: bool,
}

impl Node {
    /// Unmuted node of the given kind.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            muted: false,
        }
    }
}

/// Node types the pipeline knows about.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Reads a rendered layer; `scene: None` means the tree's own scene.
    RenderLayers {
        /// Scene whose render result is read.
        #[serde(default)]
        scene: Option<SceneId>,
        /// Layer name; the first layer when absent.
        #[serde(default)]
        layer: Option<String>,
    },
    /// Terminal node producing the composited frame.
    Composite,
    /// Terminal node writing its input to disk.
    OutputFile {
        /// Output path template.
        path: String,
    },
    /// Preview-only output, not a terminal for rendering.
    Viewer,
    /// Instance of another tree.
    Group {
        /// Name of the referenced tree.
        #[serde(default)]
        tree: Option<String>,
    },
    /// Any other processing node; passes its first input through in the built-in compositor.
    Filter {
        /// Operation identifier.
        op: String,
    },
}

/// Directed link between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeLink {
    /// Source node name.
    pub from: String,
    /// Destination node name.
    pub to: String,
}

impl NodeLink {
    /// Link `from -> to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl NodeTree {
    /// Unmuted render-layer nodes as `(node, scene, layer)`.
    pub fn render_layer_nodes(
        &self,
    ) -> impl Iterator<Item = (&Node, Option<&SceneId>, Option<&str>)> {
        self.nodes.iter().filter(|n| !n.muted).filter_map(|n| match &n.kind {
            NodeKind::RenderLayers { scene, layer } => Some((n, scene.as_ref(), layer.as_deref())),
            _ => None,
        })
    }

    /// Node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// First unmuted node linked into `name`.
    pub fn input_of(&self, name: &str) -> Option<&Node> {
        self.links
            .iter()
            .filter(|l| l.to == name)
            .filter_map(|l| self.node(&l.from))
            .find(|n| !n.muted)
    }

    /// First unmuted `Composite` node.
    pub fn composite_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| !n.muted && matches!(n.kind, NodeKind::Composite))
    }

    /// Return `true` when the tree, or any group it instances, holds an unmuted terminal
    /// output node.
    ///
    /// Each group tree is expanded at most once per call, so self-referencing groups terminate.
    pub fn has_output(&self, groups: &HashMap<String, NodeTree>) -> bool {
        let mut expanded = HashSet::new();
        self.has_output_inner(groups, &mut expanded)
    }

    fn has_output_inner<'a>(
        &'a self,
        groups: &'a HashMap<String, NodeTree>,
        expanded: &mut HashSet<&'a str>,
    ) -> bool {
        for node in self.nodes.iter().filter(|n| !n.muted) {
            match &node.kind {
                NodeKind::Composite | NodeKind::OutputFile { .. } => return true,
                NodeKind::Group { tree: Some(tree) } => {
                    if !expanded.insert(tree.as_str()) {
                        continue;
                    }
                    if let Some(group) = groups.get(tree)
                        && group.has_output_inner(groups, expanded)
                    {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/nodes.rs"]
mod tests;
