use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::*;
use crate::{
    foundation::core::Rect,
    job::callbacks::JobCallbacks,
    scene::config::OutputFormat,
};

fn job() -> RenderJob {
    RenderJob::new("Scene", Arc::new(AtomicBool::new(false)))
}

fn preview_config() -> RenderConfig {
    let mut config = RenderConfig::default();
    config.pipeline.preview = true;
    config
}

fn request<'a>(existing_layer: Option<&'a str>, size: (u32, u32)) -> BufferRequest<'a> {
    BufferRequest {
        preview: true,
        had_freestyle: false,
        freestyle: false,
        size,
        offset: (0, 0),
        active_layer: existing_layer,
    }
}

#[test]
fn decision_table() {
    let mut buf = AccumBuffer::empty(8, 8);
    buf.add_layer("Main", &[]);

    assert_eq!(decide_buffer(Some(&buf), &request(Some("Main"), (8, 8))), BufferDecision::Keep);
    assert_eq!(
        decide_buffer(Some(&buf), &request(Some("Other"), (8, 8))),
        BufferDecision::Reallocate
    );
    assert_eq!(
        decide_buffer(Some(&buf), &request(Some("Main"), (9, 8))),
        BufferDecision::Reallocate
    );
    assert_eq!(decide_buffer(None, &request(Some("Main"), (8, 8))), BufferDecision::Reallocate);

    let moved = BufferRequest {
        offset: (2, 0),
        ..request(Some("Main"), (8, 8))
    };
    assert_eq!(decide_buffer(Some(&buf), &moved), BufferDecision::RePositionOnly);

    let final_render = BufferRequest {
        preview: false,
        ..request(Some("Main"), (8, 8))
    };
    assert_eq!(decide_buffer(Some(&buf), &final_render), BufferDecision::Reallocate);

    let stylized = BufferRequest {
        had_freestyle: true,
        ..request(Some("Main"), (8, 8))
    };
    assert_eq!(decide_buffer(Some(&buf), &stylized), BufferDecision::Reallocate);
}

#[test]
fn init_allocates_empty_single_view_buffer_and_notifies_display() {
    let job = job();
    let calls = Arc::new(AtomicUsize::new(0));
    let (a, b) = (Arc::clone(&calls), Arc::clone(&calls));
    job.set_callbacks(
        JobCallbacks::default()
            .with_display_init(move |job| {
                // The lock must be free while display callbacks run.
                assert!(job.acquire_result_read().is_some());
                a.fetch_add(1, Ordering::SeqCst);
            })
            .with_display_clear(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }),
    );
    let config = RenderConfig::default();
    let layers = vec![ViewLayer::new("Main")];
    let decision = job.init(InitRequest::new(&config, &layers, 64, 32)).unwrap();
    assert_eq!(decision, BufferDecision::Reallocate);
    assert_eq!(calls.load(Ordering::SeqCst), 11);
    let read = job.acquire_result_read();
    let buf = read.as_ref().unwrap();
    assert_eq!(buf.size(), (64, 32));
    assert_eq!(buf.num_views(), 1);
    assert!(buf.layers().is_empty());
}

#[test]
fn init_uses_explicit_disprect() {
    let job = job();
    let config = RenderConfig::default();
    let layers = vec![ViewLayer::new("Main")];
    let req = InitRequest {
        disprect: Some(PixelRect::new(10, 5, 30, 25)),
        ..InitRequest::new(&config, &layers, 64, 32)
    };
    job.init(req).unwrap();
    assert_eq!(job.render_rect(), PixelRect::new(10, 5, 30, 25));
    assert_eq!(job.result_size(), Some((20, 20)));
    assert_eq!(job.acquire_result_read().as_ref().unwrap().offset(), (10, 5));
}

#[test]
fn child_inherits_source_border_at_own_resolution() {
    let parent = job();
    let mut config = RenderConfig::default();
    config.use_border = true;
    config.border = Rect::new(0.25, 0.5, 0.75, 1.0);
    let layers = vec![ViewLayer::new("Main")];
    parent.init(InitRequest::new(&config, &layers, 100, 100)).unwrap();

    let child = RenderJob::new("Other", Arc::new(AtomicBool::new(false)));
    let child_config = RenderConfig::default();
    let req = InitRequest {
        source: Some(&parent),
        ..InitRequest::new(&child_config, &layers, 200, 40)
    };
    child.init(req).unwrap();
    assert_eq!(child.render_rect(), PixelRect::new(50, 20, 150, 40));
    assert!(child.settings().config.use_border);
}

#[test]
fn movie_output_rejects_small_images() {
    let job = job();
    let mut config = RenderConfig::default();
    config.output.format = OutputFormat::Ffmpeg;
    let layers = vec![ViewLayer::new("Main")];
    let err = job.init(InitRequest::new(&config, &layers, 8, 64)).unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.reports().errors(), vec!["Image too small".to_string()]);
}

#[test]
fn preview_reinit_keeps_buffer_until_resolution_changes() {
    let job = job();
    let config = preview_config();
    let layers = vec![ViewLayer::new("Main")];
    job.init(InitRequest::new(&config, &layers, 16, 16)).unwrap();
    job.acquire_result_write()
        .as_mut()
        .unwrap()
        .add_layer("Main", &[]);
    let first = job.result_id();

    let decision = job.init(InitRequest::new(&config, &layers, 16, 16)).unwrap();
    assert_eq!(decision, BufferDecision::Keep);
    assert_eq!(job.result_id(), first);

    let decision = job.init(InitRequest::new(&config, &layers, 32, 16)).unwrap();
    assert_eq!(decision, BufferDecision::Reallocate);
    assert_ne!(job.result_id(), first);
}

#[test]
fn single_layer_selects_index() {
    let job = job();
    let config = RenderConfig::default();
    let layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    let req = InitRequest {
        single_layer: Some("B"),
        ..InitRequest::new(&config, &layers, 4, 4)
    };
    job.init(req).unwrap();
    let settings = job.settings();
    assert!(settings.single_layer);
    assert_eq!(settings.active_layer, 1);
    assert_eq!(settings.single_layer_name(), Some("B"));
}

fn full_result(layers: &[ViewLayer]) -> AccumBuffer {
    AccumBuffer::for_render(
        PixelRect::from_size(4, 4),
        crate::buffer::accum::single_view(),
        layers,
        None,
    )
}

#[test]
fn single_layer_result_merges_into_pushed() {
    let job = job();
    let layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    job.replace_result(full_result(&layers));
    let pushed_id = job.result_id();
    job.push_result_for_single_layer();
    assert!(job.has_pushed_result());
    job.replace_result(AccumBuffer::for_render(
        PixelRect::from_size(4, 4),
        crate::buffer::accum::single_view(),
        &layers,
        Some("B"),
    ));
    job.pop_single_layer_result(false).unwrap();
    assert!(!job.has_pushed_result());
    assert_eq!(job.result_id(), pushed_id);
    let read = job.acquire_result_read();
    assert_eq!(read.as_ref().unwrap().layers().len(), 2);
}

#[test]
fn cancelled_single_layer_restores_pushed() {
    let job = job();
    let layers = vec![ViewLayer::new("A"), ViewLayer::new("B")];
    job.replace_result(full_result(&layers));
    let pushed_id = job.result_id();
    job.push_result_for_single_layer();
    job.replace_result(AccumBuffer::empty(4, 4));
    job.pop_single_layer_result(true).unwrap();
    assert_eq!(job.result_id(), pushed_id);
    assert_eq!(job.acquire_result_read().as_ref().unwrap().layers().len(), 2);
}

#[test]
fn resized_single_layer_drops_pushed() {
    let job = job();
    let layers = vec![ViewLayer::new("A")];
    job.replace_result(full_result(&layers));
    job.push_result_for_single_layer();
    let replacement = AccumBuffer::empty(8, 8);
    let new_id = replacement.id();
    job.replace_result(replacement);
    job.pop_single_layer_result(false).unwrap();
    assert_eq!(job.result_id(), Some(new_id));
    assert!(!job.has_pushed_result());
}
