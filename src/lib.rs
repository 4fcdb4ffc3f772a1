//! # Quiz Blitz Server
//!
//! Real-time multiplayer arithmetic quiz. The server poses a problem, the
//! first correct answer wins the round, and the game ends after a fixed
//! number of rounds.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     QUIZ BLITZ SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG, room seeds      │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── problem.rs  - Problem generation                        │
//! │  ├── leaderboard.rs - Scores and ordered snapshots           │
//! │  └── state.rs    - Per-room state coordinator                │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - TCP/WebSocket server, configuration       │
//! │  ├── http.rs     - axum routes, liveness, CORS               │
//! │  ├── lobby.rs    - Room registry                             │
//! │  ├── room.rs     - Room task (event dispatcher)              │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Every room is a single task draining one command queue. Joins, answers,
//! disconnects and the delayed round advance are applied one at a time in
//! arrival order, which is what decides who answered first.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::DeterministicRng;
pub use game::problem::{generate, Problem, ProblemSource, RandomProblems};
pub use game::state::{ConnectionId, GameState, RejectReason, SubmitOutcome};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
