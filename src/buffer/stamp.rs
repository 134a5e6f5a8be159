use std::collections::BTreeMap;
use std::time::Duration;

use crate::scene::config::StampSettings;

/// Key/value metadata attached to a finished frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StampData {
    fields: BTreeMap<String, String>,
}

/// Inputs for [`StampData::from_settings`].
#[derive(Clone, Debug)]
pub struct StampContext<'a> {
    pub frame: i32,
    pub fps: f64,
    pub scene: &'a str,
    pub camera: Option<&'a str>,
    pub render_time: Option<Duration>,
}

impl StampData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the burn-in fields enabled in `settings`.
    pub fn from_settings(settings: &StampSettings, ctx: &StampContext<'_>) -> Self {
        let mut out = Self::new();
        if settings.frame {
            out.set("Frame", format!("{:04}", ctx.frame));
        }
        if settings.time {
            out.set("Time", format_timecode(ctx.frame, ctx.fps));
        }
        if settings.scene {
            out.set("Scene", ctx.scene);
        }
        if settings.camera
            && let Some(camera) = ctx.camera
        {
            out.set("Camera", camera);
        }
        if settings.render_time
            && let Some(t) = ctx.render_time
        {
            out.set("RenderTime", format_duration(t));
        }
        if let Some(note) = &settings.note {
            out.set("Note", note.as_str());
        }
        out
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy fields from `other`, keeping existing keys.
    pub fn merge_missing(&mut self, other: &StampData) {
        for (k, v) in &other.fields {
            self.fields.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl FromIterator<(String, String)> for StampData {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// `HH:MM:SS:FF` timecode of `frame` at `fps`.
pub fn format_timecode(frame: i32, fps: f64) -> String {
    let fps_int = fps.round().max(1.0) as i64;
    let frame = i64::from(frame.max(0));
    let ff = frame % fps_int;
    let total_secs = frame / fps_int;
    let (hh, mm, ss) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
    format!("{hh:02}:{mm:02}:{ss:02}:{ff:02}")
}

/// `MM:SS.cc`, with hours prefixed when non-zero.
pub fn format_duration(d: Duration) -> String {
    let centis = d.as_millis() / 10;
    let (hours, rest) = (centis / 360_000, centis % 360_000);
    let (mins, rest) = (rest / 6000, rest % 6000);
    let (secs, cs) = (rest / 100, rest % 100);
    if hours > 0 {
        format!("{hours:02}:{mins:02}:{secs:02}.{cs:02}")
    } else {
        format!("{mins:02}:{secs:02}.{cs:02}")
    }
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/stamp.rs"]
mod tests;
