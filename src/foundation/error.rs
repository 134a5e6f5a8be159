/// Convenience result type used across renderjob.
pub type JobResult<T> = Result<T, JobError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// User-facing diagnostics (missing camera, image too small, ...) are also pushed into the
/// job's [`Reports`](crate::Reports); the error value is what control flow branches on.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// Scene or render settings rejected before rendering starts.
    #[error("validation error: {0}")]
    Validation(String),

    /// Settings that are individually valid but cannot be combined for this job.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A render backend, compositor or sequencer failed internally.
    #[error("backend error: {0}")]
    Backend(String),

    /// Writing an image or movie failed.
    #[error("output error: {0}")]
    Output(String),

    /// Rendering stopped through the cancellation poll.
    #[error("render cancelled")]
    Cancelled,

    /// Errors when serializing or deserializing scene files.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Build a [`JobError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`JobError::Configuration`] value.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`JobError::Backend`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Build a [`JobError::Output`] value.
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    /// Build a [`JobError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for [`JobError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::serde(err.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
