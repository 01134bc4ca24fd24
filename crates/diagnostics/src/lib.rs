//! Diagnostics aggregation.
//!
//! Four producers report problems independently: the live analysis engine, the
//! compile step (errors and warnings separately) and the sandboxed runtime.
//! [`merge`] folds their current snapshots into one de-duplicated list sorted
//! errors-first, and [`StatusKind`] reduces that list to the tri-state status
//! the editor shows.

mod aggregate;
mod status;

pub use aggregate::{Producer, ProblemSlots, merge};
pub use status::{StatusKind, Summary};
