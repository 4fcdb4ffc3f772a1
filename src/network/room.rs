//! Game Room
//!
//! A room is one quiz game plus the clients watching it. Each room runs as a
//! single task that drains a command queue, so inbound events are handled
//! strictly one after another and first-come decides every race.
//!
//! The pause between a won round and the next problem is a separate timer
//! task that posts back into the same queue. Its handle is kept so a reset or
//! teardown cancels it.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::game::problem::ProblemSource;
use crate::game::state::{
    ConnectionId, GameState, RoundPhase, SubmitOutcome, DEFAULT_TOTAL_ROUNDS,
};
use crate::network::protocol::{GameOverInfo, ProblemInfo, ServerMessage, WinnerInfo};

/// Room name used when a client does not pick one.
pub const DEFAULT_ROOM: &str = "lobby";

/// Configuration shared by all rooms.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Correct answers that end a game.
    pub total_rounds: u32,
    /// Pause between a won round and the next problem.
    pub round_delay: Duration,
    /// Start a fresh game this long after game over. `None` keeps the
    /// finished game until the room is reset.
    pub restart_delay: Option<Duration>,
    /// Include the answer in `newProblem`.
    pub reveal_answers: bool,
    /// Tell submitters why an answer was rejected.
    pub rejection_feedback: bool,
    /// Capacity of the room's command queue.
    pub command_buffer: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            round_delay: Duration::from_secs(2),
            restart_delay: None,
            reveal_answers: true,
            rejection_feedback: false,
            command_buffer: 256,
        }
    }
}

/// Room errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    /// The room task has stopped.
    #[error("Room {0} is closed")]
    Closed(String),

    /// No room with that name.
    #[error("Room {0} not found")]
    NotFound(String),
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    /// Room name.
    pub room_id: String,
    /// Round phase.
    pub phase: RoundPhase,
    /// Correct answers so far.
    pub question_count: u32,
    /// Joined players.
    pub players: usize,
    /// Open connections, joined or not.
    pub clients: usize,
    /// A timer (next problem or restart) is pending.
    pub timer_pending: bool,
}

/// Commands processed by the room task.
#[derive(Debug)]
enum RoomCommand {
    /// A client connected. `attached` fires once the room has seen it.
    Connect {
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        attached: oneshot::Sender<()>,
    },
    /// `joinGame`.
    Join {
        connection: ConnectionId,
        username: String,
    },
    /// `submitAnswer`.
    Submit {
        connection: ConnectionId,
        username: String,
        answer: f64,
    },
    /// A client disconnected.
    Disconnect { connection: ConnectionId },
    /// A timer elapsed.
    TimerFired { timer_id: u64 },
    /// Start a new game now.
    Reset,
    /// Report status.
    Status { reply: oneshot::Sender<RoomStatus> },
    /// Stop the room.
    Shutdown,
    /// Stop the room only if no client is attached. Replies whether it stopped.
    ShutdownIfIdle { reply: oneshot::Sender<bool> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    NextProblem,
    Restart,
}

struct PendingTimer {
    id: u64,
    kind: TimerKind,
    handle: AbortHandle,
}

// =============================================================================
// ROOM
// =============================================================================

/// A running quiz game and its clients.
pub struct Room {
    id: String,
    config: RoomConfig,
    game: GameState,
    clients: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    pending: Option<PendingTimer>,
    next_timer_id: u64,
    /// Weak so the room stops once every handle is gone.
    commands: mpsc::WeakSender<RoomCommand>,
}

impl Room {
    /// Spawn a room task and return its handle.
    pub fn spawn(
        id: impl Into<String>,
        config: RoomConfig,
        problems: Box<dyn ProblemSource>,
    ) -> RoomHandle {
        let id = id.into();
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));

        let room = Room {
            id: id.clone(),
            game: GameState::new(problems, config.total_rounds),
            config,
            clients: BTreeMap::new(),
            pending: None,
            next_timer_id: 0,
            commands: tx.downgrade(),
        };

        tokio::spawn(room.run(rx));

        RoomHandle { id, sender: tx }
    }

    /// Process commands until shutdown or until every handle is dropped.
    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        info!(room = %self.id, problem = %self.game.current_problem().question, "Room started");

        while let Some(command) = commands.recv().await {
            if !self.handle(command) {
                break;
            }
        }

        self.cancel_timer();
        let farewell = ServerMessage::Shutdown {
            reason: format!("Room {} closed", self.id),
        };
        self.broadcast(farewell);
        info!(room = %self.id, "Room stopped");
    }

    /// Handle one command. Returns false when the room should stop.
    fn handle(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Connect { connection, sender, attached } => {
                self.on_connect(connection, sender);
                let _ = attached.send(());
            }
            RoomCommand::Join { connection, username } => self.on_join(connection, username),
            RoomCommand::Submit { connection, username, answer } => {
                self.on_submit(connection, &username, answer)
            }
            RoomCommand::Disconnect { connection } => self.on_disconnect(connection),
            RoomCommand::TimerFired { timer_id } => self.on_timer(timer_id),
            RoomCommand::Reset => self.reset(),
            RoomCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            RoomCommand::Shutdown => return false,
            RoomCommand::ShutdownIfIdle { reply } => {
                let idle = self.clients.is_empty();
                let _ = reply.send(idle);
                if idle {
                    debug!(room = %self.id, "Stopping idle room");
                    return false;
                }
            }
        }
        true
    }

    fn on_connect(&mut self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        let problem = self.problem_message();
        if sender.try_send(problem).is_err() {
            debug!(room = %self.id, %connection, "Client gone before first problem");
            return;
        }
        self.clients.insert(connection, sender);
        debug!(room = %self.id, %connection, clients = self.clients.len(), "Client connected");
    }

    fn on_join(&mut self, connection: ConnectionId, username: String) {
        self.game.register_player(connection, username.clone());
        info!(room = %self.id, %connection, %username, "Player joined");
        self.broadcast(ServerMessage::PlayerJoined { username });
    }

    fn on_submit(&mut self, connection: ConnectionId, username: &str, answer: f64) {
        match self.game.submit_answer(connection, username, answer) {
            SubmitOutcome::Rejected(reason) => {
                debug!(room = %self.id, %connection, ?reason, "Answer rejected");
                if self.config.rejection_feedback {
                    self.send_to(&connection, ServerMessage::AnswerRejected { reason });
                }
            }
            SubmitOutcome::Accepted(result) if result.is_final_round => {
                let winner = GameState::winner(&result.leaderboard);
                info!(
                    room = %self.id,
                    winner = winner.as_ref().map(|w| w.username.as_str()).unwrap_or("-"),
                    "Game over"
                );
                self.broadcast(ServerMessage::GameOver(GameOverInfo {
                    winner,
                    leaderboard: result.leaderboard,
                }));
                if let Some(delay) = self.config.restart_delay {
                    self.schedule(TimerKind::Restart, delay);
                }
            }
            SubmitOutcome::Accepted(result) => {
                info!(
                    room = %self.id,
                    username = %result.username,
                    round = result.rounds_completed,
                    "Round won"
                );
                self.broadcast(ServerMessage::Winner(WinnerInfo {
                    username: result.username,
                    leaderboard: result.leaderboard,
                    question_count: result.rounds_completed,
                }));
                self.schedule(TimerKind::NextProblem, self.config.round_delay);
            }
        }
    }

    fn on_disconnect(&mut self, connection: ConnectionId) {
        self.clients.remove(&connection);
        if let Some(username) = self.game.remove_player(&connection) {
            info!(room = %self.id, %connection, %username, "Player left");
            self.broadcast(ServerMessage::PlayerLeft { username });
        } else {
            debug!(room = %self.id, %connection, "Client disconnected without joining");
        }
    }

    fn on_timer(&mut self, timer_id: u64) {
        let kind = match self.pending.take() {
            Some(timer) if timer.id == timer_id => timer.kind,
            other => {
                // Cancelled or superseded
                self.pending = other;
                return;
            }
        };

        match kind {
            TimerKind::NextProblem => {
                if self.game.start_new_problem().is_some() {
                    debug!(room = %self.id, problem = %self.game.current_problem().question, "Next problem");
                    self.broadcast(self.problem_message());
                }
            }
            TimerKind::Restart => self.reset(),
        }
    }

    /// Start a new game and show everyone the first problem.
    fn reset(&mut self) {
        self.cancel_timer();
        self.game.reset();
        info!(room = %self.id, "New game");
        self.broadcast(self.problem_message());
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel_timer();

        let id = self.next_timer_id;
        self.next_timer_id += 1;

        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(RoomCommand::TimerFired { timer_id: id }).await;
            }
        });

        self.pending = Some(PendingTimer {
            id,
            kind,
            handle: task.abort_handle(),
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.handle.abort();
        }
    }

    fn problem_message(&self) -> ServerMessage {
        ServerMessage::NewProblem(ProblemInfo::from_problem(
            self.game.current_problem(),
            self.config.reveal_answers,
        ))
    }

    fn status(&self) -> RoomStatus {
        RoomStatus {
            room_id: self.id.clone(),
            phase: self.game.phase(),
            question_count: self.game.question_count(),
            players: self.game.player_count(),
            clients: self.clients.len(),
            timer_pending: self.pending.is_some(),
        }
    }

    /// Fire-and-forget to every connected client.
    fn broadcast(&self, message: ServerMessage) {
        for (connection, sender) in &self.clients {
            if let Err(e) = sender.try_send(message.clone()) {
                warn!(room = %self.id, %connection, "Dropping message: {}", e);
            }
        }
    }

    fn send_to(&self, connection: &ConnectionId, message: ServerMessage) {
        if let Some(sender) = self.clients.get(connection) {
            if let Err(e) = sender.try_send(message) {
                warn!(room = %self.id, %connection, "Dropping message: {}", e);
            }
        }
    }
}

// =============================================================================
// ROOM HANDLE
// =============================================================================

/// Cloneable handle for talking to a room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Room name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Both handles talk to the same room task.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// True once the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Closed(self.id.clone()))
    }

    /// Attach a client; it immediately receives the active problem.
    ///
    /// Resolves once the room has registered the client, so an error means
    /// the room stopped before seeing it.
    pub async fn connect(
        &self,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), RoomError> {
        let (attached, rx) = oneshot::channel();
        self.send(RoomCommand::Connect {
            connection,
            sender,
            attached,
        })
        .await?;
        rx.await.map_err(|_| RoomError::Closed(self.id.clone()))
    }

    /// Register a player name for a connection.
    pub async fn join(&self, connection: ConnectionId, username: impl Into<String>) -> Result<(), RoomError> {
        self.send(RoomCommand::Join {
            connection,
            username: username.into(),
        })
        .await
    }

    /// Submit an answer.
    pub async fn submit(
        &self,
        connection: ConnectionId,
        username: impl Into<String>,
        answer: f64,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Submit {
            connection,
            username: username.into(),
            answer,
        })
        .await
    }

    /// Detach a client.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnect { connection }).await
    }

    /// Start a new game, cancelling any pending timer.
    pub async fn reset(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Reset).await
    }

    /// Query the room's status.
    pub async fn status(&self) -> Result<RoomStatus, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Status { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed(self.id.clone()))
    }

    /// Stop the room.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    /// Stop the room if nobody is connected, deciding inside the room task
    /// so a client attaching concurrently is never cut off.
    pub async fn shutdown_if_idle(&self) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::ShutdownIfIdle { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed(self.id.clone()))
    }
}
