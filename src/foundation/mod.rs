/// Geometry and small value types shared by every module.
pub mod core;
/// Crate-wide error taxonomy.
pub mod error;
/// User-visible report sink.
pub mod report;
