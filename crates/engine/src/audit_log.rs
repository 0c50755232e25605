//! Per-lab append-only audit log.
//!
//! One log file per lab id (`<lab_id>.log`), recording a line for every
//! failed criterion: `[timestamp] CASE: <description> | ERROR: <observed>`.
//! Appends flush before returning and are serialized per lab so concurrent
//! grading calls for the same lab never interleave partial lines.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::warn;

use labgrade_core::{GradeError, Result};

/// File-backed audit log, one append-only stream per lab id.
pub struct AuditLog {
    log_dir: PathBuf,
    /// Per-lab append locks, created on first use.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AuditLog {
    /// Create an audit log rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        if !log_dir.exists() {
            if let Err(e) = fs::create_dir_all(&log_dir) {
                warn!(path = %log_dir.display(), error = %e, "failed to create audit log directory");
            }
        }
        Self {
            log_dir,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, lab_id: &str) -> PathBuf {
        self.log_dir.join(format!("{lab_id}.log"))
    }

    fn lab_lock(&self, lab_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("audit lock map poisoned");
        locks
            .entry(lab_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one failure line for a lab and flush it to disk.
    pub fn append(&self, lab_id: &str, description: &str, observed: &str) -> Result<()> {
        let lock = self.lab_lock(lab_id);
        let _guard = lock.lock().expect("audit lab lock poisoned");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(lab_id))?;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f %Z");
        writeln!(file, "[{timestamp}] CASE: {description} | ERROR: {observed}")?;
        file.flush()?;
        Ok(())
    }

    /// Read the full log for a lab.
    pub fn read(&self, lab_id: &str) -> Result<String> {
        let path = self.log_path(lab_id);
        if !path.is_file() {
            return Err(GradeError::NotFound(format!("log for lab '{lab_id}'")));
        }
        Ok(fs::read_to_string(path)?)
    }

    /// Whether any audit lines exist for a lab.
    pub fn exists(&self, lab_id: &str) -> bool {
        self.log_path(lab_id).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());

        log.append("lab01", "marker removed", "exists").unwrap();
        log.append("lab01", "nginx running", "inactive").unwrap();

        let content = log.read("lab01").unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("CASE: marker removed | ERROR: exists"));
        assert!(lines[1].contains("CASE: nginx running | ERROR: inactive"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn read_missing_log_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        assert!(matches!(log.read("nope"), Err(GradeError::NotFound(_))));
        assert!(!log.exists("nope"));
    }

    #[test]
    fn labs_get_separate_streams() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());

        log.append("lab01", "a", "x").unwrap();
        log.append("lab02", "b", "y").unwrap();

        assert!(log.read("lab01").unwrap().contains("CASE: a"));
        assert!(!log.read("lab01").unwrap().contains("CASE: b"));
        assert!(log.read("lab02").unwrap().contains("CASE: b"));
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let log = std::sync::Arc::new(AuditLog::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..20 {
                        log.append("lab01", &format!("case-{i}-{j}"), "observed")
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = log.read("lab01").unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 160);
        assert!(lines
            .iter()
            .all(|l| l.contains("CASE: case-") && l.ends_with("| ERROR: observed")));
    }
}
