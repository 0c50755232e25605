//! Shared checker verdict and error types.

use serde::Serialize;

/// Boolean verdict plus a diagnostic string from an evidence checker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckOutcome {
    pub ok: bool,
    pub message: String,
}

impl CheckOutcome {
    /// A passing verdict.
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    /// A failing verdict.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Errors that can occur while querying an external platform.
///
/// The criterion evaluator converts these into failed criteria; they never
/// abort a grading call.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0} checker not configured")]
    NotConfigured(&'static str),
}

/// Result alias for checker operations.
pub type CheckResult = std::result::Result<CheckOutcome, CheckError>;
