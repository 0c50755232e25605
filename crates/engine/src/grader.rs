//! Grading orchestrator.
//!
//! The top-level operation: given a token, lab id, and evidence payload,
//! verify the active session, load the scheme, evaluate every criterion,
//! apply the time penalty, persist the result best-effort, and return the
//! outcome. Criterion-level failures never abort a call; only a missing
//! session or scheme does.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use labgrade_checkers::Checkers;
use labgrade_core::Result;
use labgrade_scheme::SchemeStore;

use crate::audit_log::AuditLog;
use crate::evaluator::evaluate;
use crate::session::SessionStore;
use crate::sink::{GradingRecord, ResultSink};

/// Exercise duration (seconds) above which the penalty applies.
pub const MAX_DURATION_SECS: f64 = 600.0;
/// Flat deduction applied once when the limit is exceeded.
pub const PENALTY_POINTS: f64 = 10.0;

/// One grading call's input. Username and class name are authenticated
/// claims resolved by the caller, not derived from the token here.
#[derive(Debug, Clone)]
pub struct GradeRequest {
    pub token: String,
    pub lab_id: String,
    pub username: String,
    pub class_name: String,
    pub evidence: HashMap<String, String>,
}

/// Outcome of one grading call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GradingOutcome {
    pub score: f64,
    pub feedback: Vec<String>,
    pub duration_secs: f64,
    pub penalty: Vec<String>,
}

/// Top-level grading engine: owns the session store and audit log, borrows
/// schemes and checkers, and reports results through an optional sink.
pub struct Grader {
    schemes: SchemeStore,
    sessions: SessionStore,
    audit: AuditLog,
    checkers: Checkers,
    sink: Option<Box<dyn ResultSink>>,
}

impl Grader {
    pub fn new(schemes: SchemeStore, audit: AuditLog, checkers: Checkers) -> Self {
        Self {
            schemes,
            sessions: SessionStore::new(),
            audit,
            checkers,
            sink: None,
        }
    }

    /// Attach a result sink for best-effort persistence.
    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The session store (exposed for session administration and tests).
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The per-lab audit log.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Start a lab for a token. The scheme must exist; any prior active
    /// session for the token is replaced (last-start-wins).
    pub fn start(&self, token: &str, lab_id: &str) -> Result<()> {
        // Loading (not just stat-ing) surfaces malformed schemes at start
        // time instead of mid-exercise.
        self.schemes.load(lab_id)?;
        if let Some(replaced) = self.sessions.start(token, lab_id) {
            info!(
                lab_id,
                replaced_lab = %replaced.lab_id,
                "replaced active session on start"
            );
        }
        Ok(())
    }

    /// Finish the active lab for a token.
    pub fn finish(&self, token: &str, lab_id: &str) -> Result<()> {
        self.sessions.finish(token, lab_id)?;
        Ok(())
    }

    /// Grade the active lab for a token against the submitted evidence.
    pub async fn grade(&self, request: &GradeRequest) -> Result<GradingOutcome> {
        let session = self.sessions.require(&request.token, &request.lab_id)?;
        let scheme = self.schemes.load(&request.lab_id)?;

        let mut score = 0.0;
        let mut feedback = Vec::new();
        for criterion in &scheme.criteria {
            let evaluation = evaluate(criterion, &request.evidence, &self.checkers).await;
            score += evaluation.score_delta;
            if let Some(line) = evaluation.feedback {
                feedback.push(line);
            }
            if let Some(observed) = evaluation.audit {
                if let Err(e) =
                    self.audit
                        .append(&request.lab_id, &criterion.description, &observed)
                {
                    warn!(lab_id = %request.lab_id, error = %e, "failed to append audit line");
                }
            }
        }

        let duration_secs =
            (Utc::now() - session.started_at).num_milliseconds() as f64 / 1000.0;
        let (score, penalty_message) = penalized(score, duration_secs);
        let penalty = penalty_message.into_iter().collect();

        let outcome = GradingOutcome {
            score,
            feedback,
            duration_secs,
            penalty,
        };
        self.persist(request, &outcome).await;
        Ok(outcome)
    }

    /// Best-effort persistence: a sink failure never alters the outcome.
    async fn persist(&self, request: &GradeRequest, outcome: &GradingOutcome) {
        let Some(sink) = &self.sink else {
            return;
        };
        let record = GradingRecord {
            username: request.username.clone(),
            class_name: request.class_name.clone(),
            lab_id: request.lab_id.clone(),
            score: outcome.score,
            feedback: outcome.feedback.join(", "),
            duration_secs: outcome.duration_secs,
            status: "done".to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = sink.record(&record).await {
            warn!(lab_id = %request.lab_id, error = %e, "failed to persist grading result");
        }
    }
}

/// Apply the time penalty: a single flat deduction when the exercise ran
/// strictly longer than the limit, clamped at a floor of 0.
fn penalized(score: f64, duration_secs: f64) -> (f64, Option<String>) {
    if duration_secs > MAX_DURATION_SECS {
        let message = format!(
            "Took longer than {} minutes, {PENALTY_POINTS} point penalty applied.",
            MAX_DURATION_SECS as u64 / 60
        );
        ((score - PENALTY_POINTS).max(0.0), Some(message))
    } else {
        (score, None)
    }
}
