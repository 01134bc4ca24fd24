//! Core records shared by every playpen crate: problems, severities and disposers.

/// Normalized diagnostic records.
pub mod problem;
/// RAII disposers for registrations and listeners.
pub mod subscription;

pub use problem::{Problem, ProblemSource, Severity};
pub use subscription::Subscription;
