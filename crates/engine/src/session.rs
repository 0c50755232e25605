//! Per-token active-session store.
//!
//! Each auth token may have at most one lab in progress. `start` is
//! last-start-wins: starting a new lab silently replaces any prior session
//! for the token (the replaced session is returned so callers can log it).
//! All access goes through one `std::sync::RwLock`, so concurrent
//! start/grade/finish calls for the same token serialize to a consistent
//! order.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use labgrade_core::{GradeError, Result};

/// The record that a token currently has a lab in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub lab_id: String,
    pub started_at: DateTime<Utc>,
}

/// In-memory token → session map. Volatile by design: sessions do not
/// survive a process restart.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a lab for a token, replacing any prior active session.
    ///
    /// Returns the replaced session, if there was one.
    pub fn start(&self, token: &str, lab_id: &str) -> Option<Session> {
        self.start_at(token, lab_id, Utc::now())
    }

    /// Start a lab with an explicit start time.
    pub fn start_at(&self, token: &str, lab_id: &str, at: DateTime<Utc>) -> Option<Session> {
        let session = Session {
            token: token.to_string(),
            lab_id: lab_id.to_string(),
            started_at: at,
        };
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        sessions.insert(token.to_string(), session)
    }

    /// The active session for a token, if any.
    pub fn active(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.get(token).cloned()
    }

    /// Require an active session for `token` matching `lab_id`.
    ///
    /// Does not transition state; repeated grading of the same active lab is
    /// the expected polling pattern during a timed exercise.
    pub fn require(&self, token: &str, lab_id: &str) -> Result<Session> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        match sessions.get(token) {
            None => Err(GradeError::SessionState(
                "no active lab for this token".to_string(),
            )),
            Some(session) if session.lab_id != lab_id => Err(GradeError::SessionState(format!(
                "active lab is '{}', not '{lab_id}'",
                session.lab_id
            ))),
            Some(session) => Ok(session.clone()),
        }
    }

    /// Finish the active session for `token`, which must match `lab_id`.
    pub fn finish(&self, token: &str, lab_id: &str) -> Result<Session> {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        match sessions.get(token) {
            None => Err(GradeError::SessionState(
                "no active lab for this token".to_string(),
            )),
            Some(session) if session.lab_id != lab_id => Err(GradeError::SessionState(format!(
                "active lab is '{}', not '{lab_id}'",
                session.lab_id
            ))),
            Some(_) => Ok(sessions.remove(token).expect("session checked above")),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
