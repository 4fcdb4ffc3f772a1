//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message shaped as
//! `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::game::leaderboard::LeaderboardEntry;
use crate::game::problem::Problem;
use crate::game::state::RejectReason;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join the game under a display name.
    JoinGame(JoinRequest),

    /// Answer the active problem.
    SubmitAnswer(AnswerSubmission),
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Display name. Not required to be unique.
    pub username: String,
}

/// Answer submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    /// Name to credit if the answer wins.
    pub username: String,
    /// Submitted value.
    pub answer: f64,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Active problem (on connect, and to everyone on round advance).
    NewProblem(ProblemInfo),

    /// Someone joined.
    PlayerJoined { username: String },

    /// A joined player disconnected.
    PlayerLeft { username: String },

    /// A round was won and the game continues.
    Winner(WinnerInfo),

    /// The final round was won.
    GameOver(GameOverInfo),

    /// The sender's answer was not accepted.
    AnswerRejected { reason: RejectReason },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Problem as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemInfo {
    /// Question text.
    pub question: String,
    /// Answer, unless the server hides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<i64>,
}

impl ProblemInfo {
    /// Wire form of a problem.
    pub fn from_problem(problem: &Problem, reveal_answer: bool) -> Self {
        Self {
            question: problem.question.clone(),
            answer: reveal_answer.then_some(problem.answer),
        }
    }
}

/// Round winner announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerInfo {
    /// Name credited with the round.
    pub username: String,
    /// Leaderboard after the round.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Rounds completed so far.
    pub question_count: u32,
}

/// End of game announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverInfo {
    /// Top of the final leaderboard, `null` if empty.
    pub winner: Option<LeaderboardEntry>,
    /// Final leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be parsed.
    InvalidInput,
    /// The room stopped.
    RoomClosed,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Error frame for an unparseable client message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code: ErrorCode::InvalidInput,
            message: message.into(),
        })
    }
}
