//! Shared foundation for the lab-grading workspace.
//!
//! This crate provides:
//! - The error taxonomy ([`GradeError`]) and `Result` alias
//! - Environment-driven configuration ([`Config`]) with optional
//!   per-checker credential blocks

pub mod config;
pub mod error;

pub use config::Config;
pub use error::*;
