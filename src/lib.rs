#![forbid(unsafe_code)]
//! Render job orchestration.
//!
//! A [`RenderRegistry`] owns named [`RenderJob`]s. Each job carries a copy of the settings it
//! renders with and a lock-guarded [`AccumBuffer`] that display threads read while the render
//! thread writes. A [`Pipeline`] validates a scene, picks the phase that produces the frame
//! (a full-override backend, the sequencer or the compositor), re-enters itself for scene
//! strips and compositor dependencies, stamps the result and writes stills or movies.

pub mod backend;
pub mod buffer;
pub mod foundation;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod scene;

pub use backend::engine::{BackendFactory, BuiltinBackends, EngineContext, RenderBackend};
pub use buffer::accum::AccumBuffer;
pub use buffer::image::ImageRect;
pub use buffer::stamp::StampData;
pub use foundation::core::{PixelRect, Rect, Rgba};
pub use foundation::error::{JobError, JobResult};
pub use foundation::report::{Report, ReportLevel, Reports};
pub use job::callbacks::JobCallbacks;
pub use job::job::{JobState, RenderJob};
pub use job::registry::RenderRegistry;
pub use pipeline::{
    AnimRequest, AnimStats, FrameRequest, Phase, Pipeline, PipelineEvent, PipelineEvents,
    RenderServices,
};
pub use scene::config::RenderConfig;
pub use scene::model::{Scene, SceneId};
pub use scene::store::SceneStore;
