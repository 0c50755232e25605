//! Criterion evaluation engine for hands-on lab grading.
//!
//! This crate provides:
//! - The criterion evaluator: one criterion plus observed evidence in, a
//!   score contribution and feedback line out
//! - The per-token session store (at most one active lab per token)
//! - The per-lab append-only audit log
//! - The grading orchestrator with time-based penalty
//! - The result sink trait for external persistence

pub mod audit_log;
pub mod evaluator;
pub mod grader;
pub mod session;
pub mod sink;

pub use audit_log::AuditLog;
pub use evaluator::{evaluate, Evaluation};
pub use grader::{GradeRequest, Grader, GradingOutcome};
pub use session::{Session, SessionStore};
pub use sink::{GradingRecord, JsonlSink, ResultSink, SinkError};
