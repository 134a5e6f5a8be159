use std::time::{Duration, Instant};

/// Progress and timing information shown while a job renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderStats {
    /// Scene being rendered.
    pub scene: String,
    /// Layer currently rendered, when known.
    pub layer: Option<String>,
    /// Current frame.
    pub frame: i32,
    pub tiles_done: u32,
    pub tiles_total: u32,
    /// Progress of the current phase in `[0, 1]`.
    pub progress: f32,
    /// Free-form status line.
    pub info: Option<String>,
    /// Start of the current frame.
    pub started_at: Option<Instant>,
    /// Wall time of the last finished frame, including saving.
    pub last_frame_time: Duration,
    pub is_rendering: bool,
}

impl RenderStats {
    /// Reset per-frame counters and start the frame clock.
    pub fn begin_frame(&mut self, scene: &str, frame: i32) {
        self.scene = scene.to_string();
        self.frame = frame;
        self.tiles_done = 0;
        self.tiles_total = 0;
        self.progress = 0.0;
        self.info = None;
        self.started_at = Some(Instant::now());
        self.is_rendering = true;
    }

    /// Time since [`RenderStats::begin_frame`].
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// One-line summary used by background logging.
    pub fn summary(&self) -> String {
        let mut out = format!("Fra:{} | {}", self.frame, self.scene);
        if let Some(layer) = &self.layer {
            out.push_str(&format!(", {layer}"));
        }
        if self.tiles_total > 0 {
            out.push_str(&format!(" | Tiles {}/{}", self.tiles_done, self.tiles_total));
        }
        if let Some(info) = &self.info {
            out.push_str(" | ");
            out.push_str(info);
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/stats.rs"]
mod tests;
