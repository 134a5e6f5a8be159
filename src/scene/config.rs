use crate::{
    foundation::{core::{Rect, border_is_degenerate, validate_border}, error::{JobError, JobResult}},
};

/// Name of the left eye view in stereo setups.
pub const STEREO_LEFT_NAME: &str = "left";
/// Name of the right eye view in stereo setups.
pub const STEREO_RIGHT_NAME: &str = "right";

/// Render settings of one scene.
///
/// Jobs keep a private clone of this value for the duration of a frame.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Backend identifier handed to the [`BackendFactory`](crate::BackendFactory).
    pub engine: String,
    /// Output resolution.
    pub resolution: Resolution,
    /// Render only the `border` sub-rectangle.
    pub use_border: bool,
    /// With `use_border`, output only the border area instead of re-embedding it.
    pub crop: bool,
    /// Normalized border rectangle in `[0, 1]`.
    pub border: Rect,
    /// Frame range and rate.
    pub frames: FrameSettings,
    /// Stereo / multi-view settings.
    pub multiview: MultiViewSettings,
    /// Where and how frames are written.
    pub output: OutputSettings,
    /// Worker thread count for backends.
    pub threads: ThreadMode,
    /// Which pipeline phases are enabled.
    pub pipeline: PipelineFlags,
    /// Burn-in metadata.
    pub stamp: StampSettings,
    /// Stylized line rendering, which restructures the layer set.
    pub freestyle: bool,
    /// Keep the backend alive between renders.
    pub persistent_data: bool,
    /// Optional motion-blur shutter curve.
    pub shutter_curve: Option<CurveMapping>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            engine: "flat".to_string(),
            resolution: Resolution::default(),
            use_border: false,
            crop: false,
            border: Rect::new(0.0, 0.0, 1.0, 1.0),
            frames: FrameSettings::default(),
            multiview: MultiViewSettings::default(),
            output: OutputSettings::default(),
            threads: ThreadMode::Auto,
            pipeline: PipelineFlags::default(),
            stamp: StampSettings::default(),
            freestyle: false,
            persistent_data: false,
            shutter_curve: None,
        }
    }
}

impl RenderConfig {
    /// Structural checks run when a scene file is loaded.
    pub fn validate(&self) -> JobResult<()> {
        if self.resolution.x == 0 || self.resolution.y == 0 {
            return Err(JobError::validation("resolution must be non-zero"));
        }
        if self.resolution.percentage == 0 {
            return Err(JobError::validation("resolution percentage must be > 0"));
        }
        validate_border(self.border)?;
        if self.frames.end < self.frames.start {
            return Err(JobError::validation("frame end must be >= frame start"));
        }
        if self.frames.step < 1 {
            return Err(JobError::validation("frame step must be >= 1"));
        }
        if self.frames.fps_num == 0 || self.frames.fps_den == 0 {
            return Err(JobError::validation("fps must be non-zero"));
        }
        if let ThreadMode::Fixed(0) = self.threads {
            return Err(JobError::validation("fixed thread count must be >= 1"));
        }
        Ok(())
    }

    /// Full-frame size in pixels after the percentage scale.
    pub fn window_size(&self) -> (u32, u32) {
        self.resolution.scaled()
    }

    /// Border rendering is requested and the border is not the full frame.
    pub fn border_active(&self) -> bool {
        self.use_border && !crate::foundation::core::border_is_full_frame(self.border)
    }

    /// Border rendering is requested but selects no area.
    pub fn border_degenerate(&self) -> bool {
        self.use_border && border_is_degenerate(self.border)
    }

    /// Number of views rendered per frame.
    pub fn num_views(&self) -> usize {
        if !self.multiview.enabled {
            return 1;
        }
        self.multiview.active_views().count()
    }

    /// Names of the views rendered per frame; a single unnamed view without multi-view.
    pub fn view_names(&self) -> Vec<String> {
        if !self.multiview.enabled {
            return vec![String::new()];
        }
        self.multiview
            .active_views()
            .map(|v| v.name.clone())
            .collect()
    }

    /// File suffix of the `view_id`-th active view, empty in single-view mode.
    pub fn view_suffix(&self, view_id: usize) -> &str {
        if !self.multiview.enabled {
            return "";
        }
        self.multiview
            .active_views()
            .nth(view_id)
            .map(|v| v.suffix.as_str())
            .unwrap_or("")
    }

    /// Number of movie files produced for one animation.
    pub fn num_videos(&self) -> usize {
        if !self.multiview.enabled {
            return 1;
        }
        if self.output.views_format == OutputViewsFormat::Stereo3d {
            return 1;
        }
        self.num_views()
    }

    /// Output files carry a per-view suffix.
    pub fn is_multiview_name(&self) -> bool {
        self.multiview.enabled && self.output.views_format == OutputViewsFormat::Individual
    }

    /// Effective worker thread count.
    pub fn thread_count(&self) -> usize {
        match self.threads {
            ThreadMode::Fixed(n) => n.max(1),
            ThreadMode::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Base resolution plus percentage scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Resolution {
    /// Width at 100%.
    pub x: u32,
    /// Height at 100%.
    pub y: u32,
    /// Scale in percent.
    pub percentage: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            x: 1920,
            y: 1080,
            percentage: 100,
        }
    }
}

impl Resolution {
    /// Scaled size in pixels.
    pub fn scaled(self) -> (u32, u32) {
        let scale = |v: u32| (u64::from(v) * u64::from(self.percentage) / 100) as u32;
        (scale(self.x), scale(self.y))
    }
}

/// Frame range, step and rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// First frame (inclusive).
    pub start: i32,
    /// Last frame (inclusive).
    pub end: i32,
    /// Render every `step`-th frame.
    pub step: i32,
    /// Frames-per-second numerator.
    pub fps_num: u32,
    /// Frames-per-second denominator.
    pub fps_den: u32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            start: 1,
            end: 250,
            step: 1,
            fps_num: 24,
            fps_den: 1,
        }
    }
}

impl FrameSettings {
    /// Frames-per-second as a float.
    pub fn fps(self) -> f64 {
        f64::from(self.fps_num) / f64::from(self.fps_den.max(1))
    }
}

/// How worker threads are sized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// One worker per available CPU.
    Auto,
    /// Exactly this many workers.
    Fixed(usize),
}

/// Phase switches of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineFlags {
    /// Run the compositing node tree.
    pub compositing: bool,
    /// Render sequencer strips when present.
    pub sequencer: bool,
    /// Render only the selected view layer.
    pub single_layer: bool,
    /// Interactive preview rendering: keep the previous buffer when possible.
    pub preview: bool,
}

impl Default for PipelineFlags {
    fn default() -> Self {
        Self {
            compositing: true,
            sequencer: true,
            single_layer: false,
            preview: false,
        }
    }
}

/// Multi-view configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MultiViewSettings {
    /// Render more than one view per frame.
    pub enabled: bool,
    /// Stereo pair or free-form views.
    pub format: ViewsFormat,
    /// Configured views.
    pub views: Vec<SceneView>,
}

impl Default for MultiViewSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            format: ViewsFormat::Stereo3d,
            views: vec![
                SceneView::new(STEREO_LEFT_NAME, "_L"),
                SceneView::new(STEREO_RIGHT_NAME, "_R"),
            ],
        }
    }
}

impl MultiViewSettings {
    /// Views that take part in rendering.
    pub fn active_views(&self) -> impl Iterator<Item = &SceneView> {
        let format = self.format;
        self.views.iter().filter(move |v| {
            v.enabled
                && match format {
                    ViewsFormat::Stereo3d => {
                        v.name == STEREO_LEFT_NAME || v.name == STEREO_RIGHT_NAME
                    }
                    ViewsFormat::Multiview => true,
                }
        })
    }

    /// Return `true` when `view` would be rendered.
    pub fn is_view_active(&self, view: &SceneView) -> bool {
        self.active_views().any(|v| v.name == view.name)
    }
}

/// How views are defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewsFormat {
    /// Fixed left/right pair.
    Stereo3d,
    /// Arbitrary named views, each resolved to a suffixed camera.
    Multiview,
}

/// One configured render view.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SceneView {
    /// View name.
    pub name: String,
    /// File and camera suffix.
    pub suffix: String,
    /// Whether the view is rendered.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SceneView {
    /// Enabled view with the given name and suffix.
    pub fn new(name: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Output destination and format.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Path template; runs of `#` become the zero-padded frame number.
    pub path: String,
    /// File format.
    pub format: OutputFormat,
    /// Append the format extension when missing.
    pub use_extension: bool,
    /// Skip frames whose output files already exist.
    pub skip_existing: bool,
    /// Create empty placeholder files before rendering a frame.
    pub touch: bool,
    /// Multi-view output layout.
    pub views_format: OutputViewsFormat,
    /// Packing used for stereo 3D output.
    pub stereo_packing: StereoPacking,
    /// Background used when flattening alpha for movie output (straight RGBA8).
    pub movie_background: [u8; 4],
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: "render/frame_####".to_string(),
            format: OutputFormat::Png,
            use_extension: true,
            skip_existing: false,
            touch: false,
            views_format: OutputViewsFormat::Individual,
            stereo_packing: StereoPacking::SideBySide,
            movie_background: [0, 0, 0, 255],
        }
    }
}

/// Output file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// PNG image.
    Png,
    /// JPEG image.
    Jpeg,
    /// BMP image.
    Bmp,
    /// TIFF image.
    Tiff,
    /// H.264 MP4 movie encoded by the system `ffmpeg`.
    Ffmpeg,
}

impl OutputFormat {
    /// Return `true` for movie containers.
    pub fn is_movie(self) -> bool {
        matches!(self, Self::Ffmpeg)
    }

    /// Canonical file extension including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
            Self::Bmp => ".bmp",
            Self::Tiff => ".tif",
            Self::Ffmpeg => ".mp4",
        }
    }

    /// Minimum width and height this format accepts.
    pub fn min_size(self) -> u32 {
        if self.is_movie() { 16 } else { 1 }
    }
}

/// Multi-view output layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputViewsFormat {
    /// One file (or movie) per view, distinguished by suffix.
    Individual,
    /// Left and right packed into one image.
    Stereo3d,
}

/// Stereo packing layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoPacking {
    /// Left and right next to each other.
    SideBySide,
    /// Left above right.
    TopBottom,
}

/// Which metadata fields are stamped onto finished frames.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StampSettings {
    /// Attach metadata at all.
    pub enabled: bool,
    /// Frame number.
    pub frame: bool,
    /// Time code.
    pub time: bool,
    /// Scene name.
    pub scene: bool,
    /// Camera name.
    pub camera: bool,
    /// Wall-clock render time.
    pub render_time: bool,
    /// Free-form note.
    pub note: Option<String>,
    /// Use metadata delivered by sequencer strips instead.
    pub strip_metadata: bool,
}

impl Default for StampSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frame: true,
            time: true,
            scene: true,
            camera: true,
            render_time: true,
            note: None,
            strip_metadata: false,
        }
    }
}

/// Piecewise-linear curve used for the motion-blur shutter.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CurveMapping {
    /// Control points `(x, y)` sorted by `x`.
    pub points: Vec<[f32; 2]>,
}

impl CurveMapping {
    /// Evaluate the curve at `x`, clamping outside the control points.
    pub fn evaluate(&self, x: f32) -> f32 {
        let Some(first) = self.points.first() else {
            return 1.0;
        };
        if x <= first[0] {
            return first[1];
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if x <= b[0] {
                let span = b[0] - a[0];
                if span <= f32::EPSILON {
                    return b[1];
                }
                let t = (x - a[0]) / span;
                return a[1] + (b[1] - a[1]) * t;
            }
        }
        self.points.last().map(|p| p[1]).unwrap_or(1.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/config.rs"]
mod tests;
