// crates/image-gate-core/src/runtime/log.rs
// ============================================================================
// Module: Image Gate Evaluation Log Sinks
// Description: JSON-lines sinks for structured evaluation events.
// Purpose: Route evaluation events to stderr, a file, memory, or nowhere.
// Dependencies: crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! Sinks serialize [`EvaluationLogEvent`] values as one JSON object per line.
//! Write failures are swallowed: logging never changes an evaluation outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use crate::interfaces::EvaluationLogEvent;
use crate::interfaces::EvaluationLogSink;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that logs JSON lines to stderr.
pub struct StderrLogSink;

impl EvaluationLogSink for StderrLogSink {
    fn record(&self, event: &EvaluationLogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EvaluationLogSink for FileLogSink {
    fn record(&self, event: &EvaluationLogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op sink.
pub struct NoopLogSink;

impl EvaluationLogSink for NoopLogSink {
    fn record(&self, _event: &EvaluationLogEvent) {}
}

/// Sink that keeps events in memory, for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogSink {
    /// Recorded events.
    events: Arc<Mutex<Vec<EvaluationLogEvent>>>,
}

impl RecordingLogSink {
    /// Creates an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<EvaluationLogEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the names of the recorded events, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl EvaluationLogSink for RecordingLogSink {
    fn record(&self, event: &EvaluationLogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
