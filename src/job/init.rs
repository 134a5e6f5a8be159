use crate::{
    buffer::accum::AccumBuffer,
    foundation::{core::{PixelRect, border_is_full_frame}, error::{JobError, JobResult}},
    job::job::{JobState, RenderJob},
    scene::{config::RenderConfig, model::ViewLayer},
};

/// What [`RenderJob::init`] does with the existing result buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferDecision {
    /// Keep the buffer untouched.
    Keep,
    /// Replace it with a new empty buffer.
    Reallocate,
    /// Keep the pixels, move the buffer to the new frame offset.
    RePositionOnly,
}

/// Inputs of [`decide_buffer`].
#[derive(Clone, Copy, Debug)]
pub struct BufferRequest<'a> {
    pub preview: bool,
    /// Stylized line rendering was on for the previous init.
    pub had_freestyle: bool,
    /// Stylized line rendering is on now.
    pub freestyle: bool,
    pub size: (u32, u32),
    pub offset: (i32, i32),
    /// Layer that must be present for a kept buffer to be useful.
    pub active_layer: Option<&'a str>,
}

/// Decide whether a result buffer survives re-initialization.
///
/// Only interactive previews keep buffers, and only when the size matches and the active layer
/// is present. Stylized line rendering restructures the layer set, so it forces a new buffer
/// when active before or after.
pub fn decide_buffer(existing: Option<&AccumBuffer>, req: &BufferRequest<'_>) -> BufferDecision {
    if !req.preview || req.had_freestyle || req.freestyle {
        return BufferDecision::Reallocate;
    }
    let Some(buf) = existing else {
        return BufferDecision::Reallocate;
    };
    let has_layer = req.active_layer.is_some_and(|name| buf.has_layer(name));
    if buf.size() != req.size || !has_layer {
        return BufferDecision::Reallocate;
    }
    if buf.offset() != req.offset {
        return BufferDecision::RePositionOnly;
    }
    BufferDecision::Keep
}

/// Arguments of [`RenderJob::init`].
#[derive(Clone, Copy)]
pub struct InitRequest<'a> {
    pub config: &'a RenderConfig,
    pub view_layers: &'a [ViewLayer],
    pub single_layer: Option<&'a str>,
    /// Full frame size.
    pub winx: u32,
    pub winy: u32,
    /// Sub-rectangle to render; the full frame when `None`.
    pub disprect: Option<PixelRect>,
    /// Job whose border geometry and resolution this one inherits.
    pub source: Option<&'a RenderJob>,
}

impl<'a> InitRequest<'a> {
    /// Full-frame request without source or single layer.
    pub fn new(
        config: &'a RenderConfig,
        view_layers: &'a [ViewLayer],
        winx: u32,
        winy: u32,
    ) -> Self {
        Self {
            config,
            view_layers,
            single_layer: None,
            winx,
            winy,
            disprect: None,
            source: None,
        }
    }
}

impl RenderJob {
    /// (Re)initialize the job for a new render.
    ///
    /// Copies the configuration and view layers into the job, computes the rendered rectangle,
    /// decides what happens to the result buffer under the write lock, then resets attached
    /// viewers through `display_init` and `display_clear`.
    #[tracing::instrument(skip_all, fields(job = %self.name()))]
    pub fn init(&self, req: InitRequest<'_>) -> JobResult<BufferDecision> {
        let mut config = req.config.clone();
        let had_freestyle = self.settings().config.freestyle;

        if let Some(source) = req.source {
            let src = source.settings().config;
            config.use_border = src.use_border;
            config.crop = src.crop;
            config.border = src.border;
            config.resolution = src.resolution;
        }

        let full = PixelRect::from_size(req.winx, req.winy);
        let source_border = req
            .source
            .map(|s| s.settings().config)
            .filter(RenderConfig::border_active)
            .map(|c| c.border);
        let disprect = match (source_border, req.disprect) {
            (Some(border), _) => PixelRect::from_border(border, req.winx, req.winy),
            (None, Some(rect)) => rect,
            (None, None) => full,
        };
        if config.use_border && border_is_full_frame(config.border) {
            config.use_border = false;
        }

        let (rectx, recty) = (disprect.width(), disprect.height());
        let min = config.output.format.min_size();
        if rectx < min || recty < min {
            self.reports().error("Image too small");
            self.set_state(JobState::Failed);
            return Err(JobError::validation(format!(
                "image too small: {rectx}x{recty}, minimum {min}x{min}"
            )));
        }

        let single = req
            .single_layer
            .and_then(|name| req.view_layers.iter().position(|l| l.name == name));
        let active_layer_name = req
            .view_layers
            .get(single.unwrap_or(0))
            .map(|l| l.name.clone());
        let preview = config.pipeline.preview;
        let freestyle = config.freestyle;
        let threads = config.thread_count();
        let single_layer = single.is_some() || config.pipeline.single_layer;

        self.update_settings(|s| {
            s.config = config;
            s.view_layers = req.view_layers.to_vec();
            s.active_layer = single.unwrap_or(0);
            s.single_layer = single_layer;
            s.winx = req.winx;
            s.winy = req.winy;
            s.disprect = disprect;
            s.state = JobState::Unvalidated;
            s.threads = threads;
        });
        self.update_stats(|st| st.started_at = Some(std::time::Instant::now()));

        let decision = {
            let mut current = self.acquire_result_write();
            let decision = decide_buffer(
                current.as_ref(),
                &BufferRequest {
                    preview,
                    had_freestyle,
                    freestyle,
                    size: (rectx, recty),
                    offset: (disprect.xmin, disprect.ymin),
                    active_layer: active_layer_name.as_deref(),
                },
            );
            match decision {
                BufferDecision::Keep => {}
                BufferDecision::RePositionOnly => {
                    if let Some(buf) = current.as_mut() {
                        buf.set_offset(disprect.xmin, disprect.ymin);
                        buf.set_tile_rect(disprect);
                    }
                }
                BufferDecision::Reallocate => {
                    let mut buf = AccumBuffer::empty(rectx, recty);
                    buf.set_offset(disprect.xmin, disprect.ymin);
                    buf.set_tile_rect(disprect);
                    *current = Some(buf);
                }
            }
            decision
        };
        tracing::debug!(?decision, rectx, recty, "result buffer");

        self.display_init();
        self.display_clear();
        Ok(decision)
    }

    /// Move the current result aside before a single layer re-renders.
    pub fn push_result_for_single_layer(&self) {
        let mut slots = self.lock_slots();
        slots.pushed = slots.current.take();
    }

    /// Merge the re-rendered single layer back into the pushed result.
    ///
    /// On cancel the pushed result is restored unchanged. When sizes differ the pushed result
    /// is dropped and the new one kept.
    pub fn pop_single_layer_result(&self, cancelled: bool) -> JobResult<()> {
        let mut slots = self.lock_slots();
        let Some(mut pushed) = slots.pushed.take() else {
            return Ok(());
        };
        if cancelled {
            slots.current = Some(pushed);
            return Ok(());
        }
        let Some(current) = slots.current.take() else {
            slots.current = Some(pushed);
            return Ok(());
        };
        if current.size() != pushed.size() || current.views() != pushed.views() {
            tracing::debug!(job = %self.name(), "single layer size changed, pushed result dropped");
            slots.current = Some(current);
            return Ok(());
        }
        let merged = pushed.merge_layers_from(current);
        slots.current = Some(pushed);
        merged
    }
}

#[cfg(test)]
#[path = "../../tests/unit/job/init.rs"]
mod tests;
