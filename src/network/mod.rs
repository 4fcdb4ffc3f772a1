//! Network Layer
//!
//! WebSocket server, room tasks and wire protocol. Game rules live in
//! `game/`; this layer only routes events to them and fans results out.

pub mod http;
pub mod lobby;
pub mod protocol;
pub mod room;
pub mod server;

pub use lobby::RoomManager;
pub use protocol::{
    AnswerSubmission, ClientMessage, ErrorCode, GameOverInfo, JoinRequest, ProblemInfo,
    ServerError, ServerMessage, WinnerInfo,
};
pub use room::{Room, RoomConfig, RoomError, RoomHandle, RoomStatus, DEFAULT_ROOM};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
