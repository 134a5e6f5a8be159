//! Collaborators the pipeline drives: render backends, evaluation graphs, the node evaluator
//! and the sequencer, each with a built-in implementation.

/// Compositor node evaluation.
pub mod compositor;
/// Render backend trait and per-render context.
pub mod engine;
/// Built-in flat-shading CPU backend.
pub mod flat;
/// Scoped scene evaluation.
pub mod graph;
/// Sequencer strip rendering.
pub mod sequencer;
