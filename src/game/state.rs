//! Game State Coordinator
//!
//! Single authority over one room's quiz state. Every mutation goes through
//! [`GameState`]; the room processes one command at a time, so no locking
//! happens here.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::game::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::game::problem::{Problem, ProblemSource};

/// Correct answers needed to finish a game.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 10;

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Server-assigned identifier of a client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub uuid::Uuid);

impl ConnectionId {
    /// Fresh random identifier.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Identifier from a fixed number (tests, tooling).
    pub const fn from_u128(value: u128) -> Self {
        Self(uuid::Uuid::from_u128(value))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PHASES & OUTCOMES
// =============================================================================

/// Lifecycle of the active round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for a correct answer.
    Open,
    /// Solved; the next problem has not been generated yet.
    Solved,
    /// Final round solved. Terminal.
    Ended,
}

/// Why a submission changed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// The game is over.
    GameEnded,
    /// Someone already solved the active problem.
    AlreadySolved,
    /// Wrong value.
    Incorrect,
}

/// Result of an accepted answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundResult {
    /// Name credited with the point.
    pub username: String,
    /// Leaderboard after the point was awarded.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Correct answers accepted so far, this one included.
    pub rounds_completed: u32,
    /// This answer ended the game.
    pub is_final_round: bool,
}

/// Coordinator decision for a submitted answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// State unchanged.
    Rejected(RejectReason),
    /// First correct answer for the active problem.
    Accepted(RoundResult),
}

impl SubmitOutcome {
    /// True for [`SubmitOutcome::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Quiz state for a single room.
pub struct GameState {
    problems: Box<dyn ProblemSource>,
    current_problem: Problem,
    problem_solved: bool,
    /// Joined players by connection. Names are not unique.
    players: BTreeMap<ConnectionId, String>,
    leaderboard: Leaderboard,
    question_count: u32,
    total_rounds: u32,
    game_ended: bool,
}

impl fmt::Debug for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameState")
            .field("current_problem", &self.current_problem)
            .field("problem_solved", &self.problem_solved)
            .field("players", &self.players)
            .field("leaderboard", &self.leaderboard)
            .field("question_count", &self.question_count)
            .field("total_rounds", &self.total_rounds)
            .field("game_ended", &self.game_ended)
            .finish()
    }
}

impl GameState {
    /// Create a game that ends after `total_rounds` correct answers.
    ///
    /// The first problem is drawn immediately. `total_rounds` of 0 is
    /// treated as 1.
    pub fn new(mut problems: Box<dyn ProblemSource>, total_rounds: u32) -> Self {
        let current_problem = problems.next_problem();
        Self {
            problems,
            current_problem,
            problem_solved: false,
            players: BTreeMap::new(),
            leaderboard: Leaderboard::new(),
            question_count: 0,
            total_rounds: total_rounds.max(1),
            game_ended: false,
        }
    }

    /// Replace the active problem and reopen the round.
    ///
    /// Returns `None` once the game has ended; the terminal state is sticky.
    pub fn start_new_problem(&mut self) -> Option<&Problem> {
        if self.game_ended {
            return None;
        }
        self.current_problem = self.problems.next_problem();
        self.problem_solved = false;
        Some(&self.current_problem)
    }

    /// Associate `username` with a connection, replacing any earlier name.
    pub fn register_player(&mut self, connection: ConnectionId, username: impl Into<String>) -> Option<String> {
        self.players.insert(connection, username.into())
    }

    /// Drop a connection's player entry, returning its name if it had joined.
    pub fn remove_player(&mut self, connection: &ConnectionId) -> Option<String> {
        self.players.remove(connection)
    }

    /// Judge an answer.
    ///
    /// The point goes to `username` as submitted, whatever name the
    /// connection joined with.
    pub fn submit_answer(&mut self, connection: ConnectionId, username: &str, value: f64) -> SubmitOutcome {
        if self.game_ended {
            return SubmitOutcome::Rejected(RejectReason::GameEnded);
        }
        if self.problem_solved {
            return SubmitOutcome::Rejected(RejectReason::AlreadySolved);
        }
        if !self.current_problem.is_correct(value) {
            trace!(%connection, username, value, "incorrect answer");
            return SubmitOutcome::Rejected(RejectReason::Incorrect);
        }

        self.problem_solved = true;
        self.leaderboard.award(username);
        self.question_count += 1;
        if self.question_count >= self.total_rounds {
            self.game_ended = true;
        }

        SubmitOutcome::Accepted(RoundResult {
            username: username.to_string(),
            leaderboard: self.leaderboard.snapshot(),
            rounds_completed: self.question_count,
            is_final_round: self.game_ended,
        })
    }

    /// True once the final round has been solved.
    pub fn is_game_over(&self) -> bool {
        self.game_ended
    }

    /// Highest-ranked entry of a snapshot.
    pub fn winner(snapshot: &[LeaderboardEntry]) -> Option<LeaderboardEntry> {
        snapshot.first().cloned()
    }

    /// Start a new game: fresh problem, no scores.
    ///
    /// Joined players stay registered; their connections are still open.
    pub fn reset(&mut self) {
        self.current_problem = self.problems.next_problem();
        self.problem_solved = false;
        self.leaderboard.clear();
        self.question_count = 0;
        self.game_ended = false;
    }

    /// Current round phase.
    pub fn phase(&self) -> RoundPhase {
        if self.game_ended {
            RoundPhase::Ended
        } else if self.problem_solved {
            RoundPhase::Solved
        } else {
            RoundPhase::Open
        }
    }

    /// Active problem.
    pub fn current_problem(&self) -> &Problem {
        &self.current_problem
    }

    /// Correct answers accepted so far.
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    /// Correct answers needed to end the game.
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Joined connections.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Name a connection joined with.
    pub fn username(&self, connection: &ConnectionId) -> Option<&str> {
        self.players.get(connection).map(String::as_str)
    }

    /// Ordered leaderboard.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.snapshot()
    }
}
