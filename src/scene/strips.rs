use crate::{
    foundation::core::Rgba,
    scene::model::SceneId,
};

/// Sequencer timeline of a scene.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Editing {
    /// Strips on the timeline.
    #[serde(default)]
    pub strips: Vec<Strip>,
}

impl Editing {
    /// At least one strip produces pixels.
    pub fn has_visual_strips(&self) -> bool {
        self.strips
            .iter()
            .any(|s| !matches!(s.kind, StripKind::Sound { .. }))
    }

    /// Unmuted visual strips covering `frame`, top channel first.
    pub fn strips_at(&self, frame: i32) -> Vec<&Strip> {
        let mut out: Vec<&Strip> = self
            .strips
            .iter()
            .filter(|s| !s.muted && s.covers(frame))
            .filter(|s| !matches!(s.kind, StripKind::Sound { .. }))
            .collect();
        out.sort_by(|a, b| b.channel.cmp(&a.channel));
        out
    }
}

/// One strip on the sequencer timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Strip {
    /// Strip name.
    pub name: String,
    /// Channel; higher channels are drawn on top.
    pub channel: u32,
    /// First frame (inclusive).
    pub start: i32,
    /// Last frame (exclusive).
    pub end: i32,
    /// Strip type and parameters.
    #[serde(flatten)]
    pub kind: StripKind,
    /// Muted strips produce nothing.
    #[serde(default)]
    pub muted: bool,
}

impl Strip {
    /// Unmuted strip spanning `[start, end)`.
    pub fn new(name: impl Into<String>, channel: u32, start: i32, end: i32, kind: StripKind) -> Self {
        Self {
            name: name.into(),
            channel,
            start,
            end,
            kind,
            muted: false,
        }
    }

    /// Return `true` when `frame` lies inside the strip.
    pub fn covers(&self, frame: i32) -> bool {
        self.start <= frame && frame < self.end
    }
}

/// Strip types.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StripKind {
    /// Audio only.
    Sound {
        /// Audio file.
        path: String,
    },
    /// Solid color.
    Color {
        /// Fill color in sequencer (display) space.
        color: Rgba,
    },
    /// Renders another scene.
    Scene {
        /// Rendered scene.
        scene: SceneId,
        /// Camera to use instead of the scene camera.
        #[serde(default)]
        camera_override: Option<String>,
        /// Use the scene's own sequencer output instead of its camera render.
        #[serde(default)]
        use_sequencer: bool,
    },
}
