//! End-to-end tests against a running server over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use quiz_blitz::network::room::RoomConfig;
use quiz_blitz::{GameServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(room: RoomConfig) -> (Arc<GameServer>, SocketAddr) {
    start_with(ServerConfig {
        room,
        ..Default::default()
    })
    .await
}

async fn start_with(config: ServerConfig) -> (Arc<GameServer>, SocketAddr) {
    let config = ServerConfig {
        seed: Some(1234),
        greeting: "Hello quiz".to_string(),
        ..config
    };
    let server = Arc::new(GameServer::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });

    (server, addr)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn fast_rooms(total_rounds: u32) -> RoomConfig {
    RoomConfig {
        total_rounds,
        round_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_game_over_websocket() {
    let (server, addr) = start_server(fast_rooms(2)).await;
    let mut alice = connect(addr, "/").await;

    let first = recv(&mut alice).await;
    assert_eq!(first["event"], "newProblem");
    let answer = first["data"]["answer"].as_i64().unwrap();

    send(&mut alice, json!({"event": "joinGame", "data": {"username": "alice"}})).await;
    assert_eq!(
        recv(&mut alice).await,
        json!({"event": "playerJoined", "data": {"username": "alice"}})
    );

    // A wrong answer is ignored silently
    send(&mut alice, json!({"event": "submitAnswer", "data": {"username": "alice", "answer": answer + 1}})).await;
    send(&mut alice, json!({"event": "submitAnswer", "data": {"username": "alice", "answer": answer}})).await;
    assert_eq!(
        recv(&mut alice).await,
        json!({
            "event": "winner",
            "data": {
                "username": "alice",
                "leaderboard": [{"username": "alice", "score": 1}],
                "questionCount": 1
            }
        })
    );

    let second = recv(&mut alice).await;
    assert_eq!(second["event"], "newProblem");
    let answer = second["data"]["answer"].as_i64().unwrap();

    send(&mut alice, json!({"event": "submitAnswer", "data": {"username": "alice", "answer": answer}})).await;
    assert_eq!(
        recv(&mut alice).await,
        json!({
            "event": "gameOver",
            "data": {
                "winner": {"username": "alice", "score": 2},
                "leaderboard": [{"username": "alice", "score": 2}]
            }
        })
    );

    assert_eq!(server.connection_count().await, 1);
    server.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (server, addr) = start_server(fast_rooms(10)).await;
    let mut ws = connect(addr, "/").await;
    recv(&mut ws).await;

    ws.send(Message::Text("{\"event\":\"joinGame\"}".to_string())).await.unwrap();
    let error = recv(&mut ws).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "invalid_input");

    send(&mut ws, json!({"event": "joinGame", "data": {"username": "bob"}})).await;
    assert_eq!(recv(&mut ws).await["event"], "playerJoined");

    server.shutdown();
}

#[tokio::test]
async fn test_rooms_are_independent() {
    let (server, addr) = start_server(fast_rooms(10)).await;
    let mut lobby = connect(addr, "/").await;
    let mut finals = connect(addr, "/room/finals").await;
    recv(&mut lobby).await;
    recv(&mut finals).await;

    send(&mut finals, json!({"event": "joinGame", "data": {"username": "carol"}})).await;
    assert_eq!(recv(&mut finals).await["event"], "playerJoined");

    // The lobby client hears nothing about the other room
    send(&mut lobby, json!({"event": "joinGame", "data": {"username": "dave"}})).await;
    assert_eq!(
        recv(&mut lobby).await,
        json!({"event": "playerJoined", "data": {"username": "dave"}})
    );

    assert_eq!(server.room_count().await, 2);
    server.shutdown();
}

#[tokio::test]
async fn test_player_left_reaches_others() {
    let (server, addr) = start_server(fast_rooms(10)).await;
    let mut alice = connect(addr, "/").await;
    let mut bob = connect(addr, "/").await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    send(&mut alice, json!({"event": "joinGame", "data": {"username": "alice"}})).await;
    recv(&mut alice).await;
    recv(&mut bob).await;

    alice.close(None).await.unwrap();
    assert_eq!(
        recv(&mut bob).await,
        json!({"event": "playerLeft", "data": {"username": "alice"}})
    );

    server.shutdown();
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let (server, addr) = start_server(fast_rooms(10)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nOrigin: http://example.com\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.to_ascii_lowercase().contains("access-control-allow-origin: *"));
    assert!(response.ends_with("Hello quiz"));

    server.shutdown();
}

#[tokio::test]
async fn test_unknown_websocket_path_is_refused() {
    let (server, addr) = start_server(fast_rooms(10)).await;
    let result = connect_async(format!("ws://{}/nowhere", addr)).await;
    assert!(result.is_err());
    server.shutdown();
}

#[tokio::test]
async fn test_connection_limit_holds_under_concurrent_connects() {
    let (server, addr) = start_with(ServerConfig {
        max_connections: 1,
        ..Default::default()
    })
    .await;

    let attempts = (0..5).map(|_| connect_async(format!("ws://{}/", addr)));
    let results = futures_util::future::join_all(attempts).await;
    let mut open: Vec<Client> = results.into_iter().filter_map(|r| r.ok().map(|(ws, _)| ws)).collect();
    assert_eq!(open.len(), 1);

    recv(&mut open[0]).await;
    while server.connection_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.connection_count().await, 1);

    // The slot frees up once the client leaves
    let mut only = open.remove(0);
    only.close(None).await.unwrap();
    while server.connection_count().await > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut next = loop {
        if let Ok((ws, _)) = connect_async(format!("ws://{}/", addr)).await {
            break ws;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(recv(&mut next).await["event"], "newProblem");

    server.shutdown();
}
