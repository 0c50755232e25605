//! Result sink: the persistence seam for grading results.
//!
//! The orchestrator emits one [`GradingRecord`] per grading call through an
//! injected [`ResultSink`]. Sink failures are logged and swallowed by the
//! caller; the score returned to the submitter never depends on storage
//! succeeding.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

/// Identifying fields plus outcome for one grading call.
#[derive(Debug, Clone, Serialize)]
pub struct GradingRecord {
    pub username: String,
    pub class_name: String,
    pub lab_id: String,
    pub score: f64,
    /// Feedback lines joined with `", "`.
    pub feedback: String,
    pub duration_secs: f64,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Errors from persisting a grading record.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence seam for grading results.
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, record: &GradingRecord) -> Result<(), SinkError>;
}

/// Appends grading records as JSON lines to a file.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl ResultSink for JsonlSink {
    async fn record(&self, record: &GradingRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}
