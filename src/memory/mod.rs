//! Memory module for Odysseus
//!
//! Persists one markdown record per reflection and the end-of-run summary.

mod store;
mod summary;

pub use store::{read_recent, MemoryRecord, MemoryStore};
pub use summary::{SessionSummary, SUMMARY_FILE};
