use thiserror::Error;

/// Error taxonomy shared across the grading workspace.
///
/// Criterion-level failures (remote API errors, unsupported criterion kinds)
/// never reach this type from the evaluator; they are degraded into failed
/// criteria at that boundary. `GradeError` covers the failures that abort a
/// whole call: missing schemes, session mismatches, malformed input.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session error: {0}")]
    SessionState(String),

    #[error("Remote API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },
}

/// Result alias for grading operations.
pub type Result<T> = std::result::Result<T, GradeError>;
