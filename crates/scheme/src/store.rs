//! Filesystem scheme store.
//!
//! One JSON file per lab (`<lab_id>.json`) under a configured directory.
//! Authoring operations (`create` / `edit`) redistribute criterion scores to
//! an equal split summing to 100 before writing; `load` is read-only and
//! idempotent.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use labgrade_core::{GradeError, Result};

use crate::schema::{Criterion, Scheme};

/// Filesystem-backed scheme store keyed by lab id.
pub struct SchemeStore {
    scheme_dir: PathBuf,
}

impl SchemeStore {
    /// Create a store rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(scheme_dir: impl Into<PathBuf>) -> Self {
        let scheme_dir = scheme_dir.into();
        if !scheme_dir.exists() {
            if let Err(e) = fs::create_dir_all(&scheme_dir) {
                warn!(path = %scheme_dir.display(), error = %e, "failed to create scheme directory");
            }
        }
        Self { scheme_dir }
    }

    fn scheme_path(&self, lab_id: &str) -> PathBuf {
        self.scheme_dir.join(format!("{lab_id}.json"))
    }

    /// Whether a scheme exists for the lab id.
    pub fn exists(&self, lab_id: &str) -> bool {
        self.scheme_path(lab_id).is_file()
    }

    /// Load the scheme for a lab.
    pub fn load(&self, lab_id: &str) -> Result<Scheme> {
        let path = self.scheme_path(lab_id);
        if !path.is_file() {
            return Err(GradeError::NotFound(format!("lab '{lab_id}'")));
        }
        let raw = fs::read_to_string(&path)?;
        let scheme: Scheme = serde_json::from_str(&raw)?;
        Ok(scheme)
    }

    /// Create a scheme, redistributing criterion scores to an equal split.
    ///
    /// Rejects an empty criteria list with a validation error. Overwrites an
    /// existing scheme for the same lab id.
    pub fn create(
        &self,
        lab_id: &str,
        description: Option<String>,
        mut criteria: Vec<Criterion>,
    ) -> Result<Scheme> {
        if criteria.is_empty() {
            return Err(GradeError::Validation(
                "at least one criterion is required".to_string(),
            ));
        }
        distribute_scores(&mut criteria);

        let scheme = Scheme {
            lab_id: lab_id.to_string(),
            description,
            criteria,
        };
        self.write(&scheme)?;
        Ok(scheme)
    }

    /// Replace the criteria of an existing scheme, redistributing scores.
    pub fn edit(
        &self,
        lab_id: &str,
        description: Option<String>,
        criteria: Vec<Criterion>,
    ) -> Result<Scheme> {
        if !self.exists(lab_id) {
            return Err(GradeError::NotFound(format!("lab '{lab_id}'")));
        }
        self.create(lab_id, description, criteria)
    }

    /// Write a scheme as-is, without score redistribution.
    ///
    /// Hand-authored schemes may carry uneven scores; this path preserves
    /// them.
    pub fn save(&self, scheme: &Scheme) -> Result<()> {
        if scheme.criteria.is_empty() {
            return Err(GradeError::Validation(
                "at least one criterion is required".to_string(),
            ));
        }
        self.write(scheme)
    }

    /// Delete the scheme for a lab.
    pub fn delete(&self, lab_id: &str) -> Result<()> {
        let path = self.scheme_path(lab_id);
        if !path.is_file() {
            return Err(GradeError::NotFound(format!("lab '{lab_id}'")));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// List all schemes in the store.
    ///
    /// Unparsable files are skipped with a warning, never aborting the scan.
    pub fn list(&self) -> Result<Vec<Scheme>> {
        let mut schemes = Vec::new();
        for entry in fs::read_dir(&self.scheme_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_scheme(&path) {
                Ok(scheme) => schemes.push(scheme),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable scheme file");
                }
            }
        }
        schemes.sort_by(|a, b| a.lab_id.cmp(&b.lab_id));
        Ok(schemes)
    }

    fn write(&self, scheme: &Scheme) -> Result<()> {
        let path = self.scheme_path(&scheme.lab_id);
        let json = serde_json::to_string_pretty(scheme)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn read_scheme(path: &Path) -> Result<Scheme> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Equal-split score distribution: `round(100 / n, 2)` per criterion.
fn distribute_scores(criteria: &mut [Criterion]) {
    let per_criterion = (100.0 / criteria.len() as f64 * 100.0).round() / 100.0;
    for criterion in criteria.iter_mut() {
        criterion.score = per_criterion;
    }
}
