use parking_lot::Mutex;

/// Severity of a user-visible report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportLevel {
    /// Informational note ("No frames rendered, skipped to not overwrite").
    Info,
    /// Something was ignored or degraded.
    Warning,
    /// The requested operation cannot proceed.
    Error,
}

/// One user-visible diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Severity.
    pub level: ReportLevel,
    /// Message, naming the offending scene where one applies.
    pub message: String,
}

/// Thread-safe sink for diagnostics shown to the user.
///
/// Collaborators report through the sink instead of return codes; every entry is mirrored to
/// `tracing`.
#[derive(Debug, Default)]
pub struct Reports {
    entries: Mutex<Vec<Report>>,
}

impl Reports {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a report.
    pub fn push(&self, level: ReportLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ReportLevel::Info => tracing::info!(target: "renderjob::report", "{message}"),
            ReportLevel::Warning => tracing::warn!(target: "renderjob::report", "{message}"),
            ReportLevel::Error => tracing::error!(target: "renderjob::report", "{message}"),
        }
        self.entries.lock().push(Report { level, message });
    }

    /// Append an [`ReportLevel::Error`] report.
    pub fn error(&self, message: impl Into<String>) {
        self.push(ReportLevel::Error, message);
    }

    /// Append an [`ReportLevel::Info`] report.
    pub fn info(&self, message: impl Into<String>) {
        self.push(ReportLevel::Info, message);
    }

    /// Snapshot of all reports in insertion order.
    pub fn entries(&self) -> Vec<Report> {
        self.entries.lock().clone()
    }

    /// Messages of all error-level reports.
    pub fn errors(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|r| r.level == ReportLevel::Error)
            .map(|r| r.message.clone())
            .collect()
    }

    /// Return `true` when at least one error was reported.
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|r| r.level == ReportLevel::Error)
    }

    /// Number of reports.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Return `true` when nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all reports.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
