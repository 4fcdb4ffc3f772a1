//! Game Logic Module
//!
//! Transport-free quiz logic.
//!
//! ## Module Structure
//!
//! - `problem`: Problem generation and problem sources
//! - `leaderboard`: Score table and ordered snapshots
//! - `state`: Per-room game state coordinator

pub mod problem;
pub mod leaderboard;
pub mod state;

// Re-export key types
pub use problem::{Problem, ProblemSource, RandomProblems};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use state::{ConnectionId, GameState, RejectReason, RoundPhase, RoundResult, SubmitOutcome};
