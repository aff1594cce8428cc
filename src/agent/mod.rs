//! Exploration agent: per-run state and the loop that drives it

mod explorer;
mod state;

pub use explorer::{Explorer, Outcome, SessionReport, SuggestionMode};
pub use state::{ExplorationState, Phase, Target};
