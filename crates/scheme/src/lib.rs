//! Grading scheme model and filesystem store.
//!
//! This crate provides:
//! - JSON-based scheme definition with serde deserialization
//! - A criterion kind sum type with an explicit unsupported fallback
//! - A filesystem store with authoring operations (create/edit/delete/list)
//!   that auto-distribute criterion scores

pub mod schema;
pub mod store;

pub use schema::{CheckKind, Criterion, Scheme};
pub use store::SchemeStore;
