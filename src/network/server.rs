//! WebSocket Game Server
//!
//! Configuration, the axum listener and the per-connection WebSocket loop.
//! Routing lives in `http`; game rules live in the rooms.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::extract::ws::{Message, WebSocket};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::game::state::ConnectionId;
use crate::network::http;
use crate::network::lobby::RoomManager;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::room::{RoomConfig, RoomError, RoomHandle};

/// Port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 3001;

/// Body of the liveness response.
pub const DEFAULT_GREETING: &str = "Hello from the quiz server";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue per client.
    pub client_buffer: usize,
    /// Settings for every room.
    pub room: RoomConfig,
    /// Fixed seed for problem generation.
    pub seed: Option<u64>,
    /// Liveness response body.
    pub greeting: String,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            client_buffer: 64,
            room: RoomConfig::default(),
            seed: None,
            greeting: DEFAULT_GREETING.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    /// Environment variable.
    pub key: &'static str,
    /// Offending value.
    pub value: String,
    /// What was expected.
    pub reason: &'static str,
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source, falling back to defaults.
    ///
    /// Keys: `PORT`, `QUIZ_BIND_HOST`, `QUIZ_MAX_CONNECTIONS`,
    /// `QUIZ_TOTAL_ROUNDS`, `QUIZ_ROUND_DELAY_MS`, `QUIZ_RESTART_DELAY_MS`,
    /// `QUIZ_SEED`, `QUIZ_REVEAL_ANSWERS`, `QUIZ_REJECTION_FEEDBACK`,
    /// `QUIZ_GREETING`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let port: u16 = parse(&lookup, "PORT", "a port number")?.unwrap_or(DEFAULT_PORT);
        let host = match lookup("QUIZ_BIND_HOST") {
            Some(value) => value.parse().map_err(|_| ConfigError {
                key: "QUIZ_BIND_HOST",
                value,
                reason: "an IP address",
            })?,
            None => config.bind_addr.ip(),
        };
        config.bind_addr = SocketAddr::new(host, port);

        if let Some(max) = parse(&lookup, "QUIZ_MAX_CONNECTIONS", "a positive integer")? {
            config.max_connections = max;
        }

        if let Some(rounds) = parse::<u32>(&lookup, "QUIZ_TOTAL_ROUNDS", "a positive integer")? {
            if rounds == 0 {
                return Err(ConfigError {
                    key: "QUIZ_TOTAL_ROUNDS",
                    value: rounds.to_string(),
                    reason: "a positive integer",
                });
            }
            config.room.total_rounds = rounds;
        }

        if let Some(ms) = parse(&lookup, "QUIZ_ROUND_DELAY_MS", "milliseconds")? {
            config.room.round_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "QUIZ_RESTART_DELAY_MS", "milliseconds")? {
            config.room.restart_delay = Some(Duration::from_millis(ms));
        }

        config.seed = parse(&lookup, "QUIZ_SEED", "an unsigned 64-bit integer")?;

        if let Some(flag) = parse_flag(&lookup, "QUIZ_REVEAL_ANSWERS")? {
            config.room.reveal_answers = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "QUIZ_REJECTION_FEEDBACK")? {
            config.room.rejection_feedback = flag;
        }

        if let Some(greeting) = lookup("QUIZ_GREETING") {
            config.greeting = greeting;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    reason: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError { key, value, reason }),
        },
        None => Ok(None),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError {
                key,
                value,
                reason: "true or false",
            }),
        },
        None => Ok(None),
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind or serve.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Room error.
    #[error("Room error: {0}")]
    Room(#[from] RoomError),
}

/// Connected client state.
#[derive(Debug, Clone)]
struct ConnectedClient {
    addr: Option<SocketAddr>,
    room_id: String,
    connected_at: Instant,
}

/// State shared by every request handler.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) rooms: Arc<RoomManager>,
    clients: Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>,
    /// One permit per open WebSocket.
    pub(crate) slots: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

/// The game server.
pub struct GameServer {
    state: ServerState,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let rooms = RoomManager::new(config.room.clone(), config.seed);
        let slots = Semaphore::new(config.max_connections.min(Semaphore::MAX_PERMITS));

        Self {
            state: ServerState {
                config: Arc::new(config),
                rooms: Arc::new(rooms),
                clients: Arc::new(RwLock::new(BTreeMap::new())),
                slots: Arc::new(slots),
                shutdown_tx,
            },
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Quiz server v{} listening on {}",
            self.state.config.version,
            listener.local_addr()?
        );

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(self.state.rooms.clone()));
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received");
            })
            .await;

        cleanup_handle.abort();
        self.state.rooms.shutdown_all().await;

        result.map_err(GameServerError::from)
    }

    /// HTTP and WebSocket routes, for serving on a custom listener.
    pub fn router(&self) -> Router {
        http::router(self.state.clone())
    }

    /// Periodically stop rooms nobody is in.
    async fn run_cleanup_loop(rooms: Arc<RoomManager>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            rooms.cleanup().await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.state.rooms.room_count().await
    }

    /// Room registry.
    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.state.rooms
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Run an upgraded WebSocket until the client leaves or the server stops.
pub(crate) async fn serve_websocket(
    state: ServerState,
    socket: WebSocket,
    addr: Option<SocketAddr>,
    room_id: String,
) -> Result<(), GameServerError> {
    let connection = ConnectionId::new_v4();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(state.config.client_buffer.max(1));

    // Spawn message sender task
    let mut sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let room = match attach(&state.rooms, &room_id, connection, &msg_tx).await {
        Ok(room) => room,
        Err(e) => {
            sender_task.abort();
            return Err(e.into());
        }
    };

    state.clients.write().await.insert(connection, ConnectedClient {
        addr,
        room_id: room_id.clone(),
        connected_at: Instant::now(),
    });
    info!(%connection, room = %room_id, "Client {:?} connected", addr);

    // Handle incoming messages
    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg = match ClientMessage::from_json(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!(%connection, "Invalid message: {}", e);
                                let _ = msg_tx.try_send(ServerMessage::invalid_input(
                                    format!("Invalid message format: {}", e),
                                ));
                                continue;
                            }
                        };

                        if let Err(e) = dispatch(&room, connection, client_msg).await {
                            warn!(%connection, "{}", e);
                            let _ = msg_tx.try_send(ServerMessage::Error(ServerError {
                                code: ErrorCode::RoomClosed,
                                message: e.to_string(),
                            }));
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(%connection, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%connection, "Client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(%connection, "WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => {
                let _ = msg_tx.try_send(ServerMessage::Shutdown {
                    reason: "Server shutting down".to_string(),
                });
                break;
            }
        }
    }

    // Cleanup
    let _ = room.disconnect(connection).await;
    drop(msg_tx);
    if tokio::time::timeout(Duration::from_secs(1), &mut sender_task).await.is_err() {
        sender_task.abort();
    }

    if let Some(client) = state.clients.write().await.remove(&connection) {
        info!(
            %connection,
            room = %client.room_id,
            "Client {:?} cleaned up after {:?}",
            client.addr,
            client.connected_at.elapsed()
        );
    }

    Ok(())
}

/// Attach a connection to its room, recreating the room once if it was
/// torn down between lookup and connect.
async fn attach(
    rooms: &RoomManager,
    room_id: &str,
    connection: ConnectionId,
    sender: &mpsc::Sender<ServerMessage>,
) -> Result<RoomHandle, RoomError> {
    let room = rooms.get_or_create(room_id).await;
    match room.connect(connection, sender.clone()).await {
        Ok(()) => Ok(room),
        Err(_) => {
            let room = rooms.get_or_create(room_id).await;
            room.connect(connection, sender.clone()).await?;
            Ok(room)
        }
    }
}

/// Forward a client message to its room.
async fn dispatch(room: &RoomHandle, connection: ConnectionId, msg: ClientMessage) -> Result<(), RoomError> {
    match msg {
        ClientMessage::JoinGame(req) => room.join(connection, req.username).await,
        ClientMessage::SubmitAnswer(sub) => room.submit(connection, sub.username, sub.answer).await,
    }
}
