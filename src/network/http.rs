//! HTTP Routes
//!
//! Everything on the game port goes through one axum router. `/` answers
//! plain GETs with the greeting and upgrades WebSocket requests into the
//! default room; `/room/:name` upgrades into a named room. Every response
//! carries permissive CORS headers.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::network::room::DEFAULT_ROOM;
use crate::network::server::{serve_websocket, GameServerError, ServerState};

/// Longest room name accepted in a path.
pub const MAX_ROOM_NAME: usize = 64;

/// Router for the game port.
pub(crate) fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/room/:name", get(named_room))
        .layer(cors_layer())
        .with_state(state)
}

/// Any origin, `GET`/`POST`, `Content-Type` and `Authorization` headers.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Room names are 1 to 64 characters of `[A-Za-z0-9_-]`.
pub fn valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_NAME
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn root(
    State(state): State<ServerState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => upgrade(state, ws, peer, DEFAULT_ROOM.to_string()),
        None => state.config.greeting.clone().into_response(),
    }
}

async fn named_room(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: WebSocketUpgrade,
) -> Response {
    if !valid_room_name(&name) {
        return StatusCode::NOT_FOUND.into_response();
    }
    upgrade(state, ws, peer, name)
}

/// Reserve a connection slot, then hand the socket to the room.
///
/// The permit lives as long as the socket task, so concurrent handshakes
/// cannot overshoot `max_connections`.
fn upgrade(
    state: ServerState,
    ws: WebSocketUpgrade,
    peer: Option<ConnectInfo<SocketAddr>>,
    room: String,
) -> Response {
    let addr = peer.map(|ConnectInfo(addr)| addr);

    let permit = match state.slots.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("{}, rejecting {:?}", GameServerError::ConnectionLimitReached, addr);
            return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = serve_websocket(state, socket, addr, room).await {
            error!("Connection {:?} failed: {}", addr, e);
        }
        drop(permit);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::server::{GameServer, ServerConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let config = ServerConfig {
            greeting: "Hello".to_string(),
            ..Default::default()
        };
        GameServer::new(config).router()
    }

    #[test]
    fn test_valid_room_name() {
        assert!(valid_room_name("abc-1_2"));
        assert!(valid_room_name(&"x".repeat(64)));
        assert!(!valid_room_name(""));
        assert!(!valid_room_name("a b"));
        assert!(!valid_room_name("a/b"));
        assert!(!valid_room_name(&"x".repeat(65)));
    }

    #[tokio::test]
    async fn test_plain_get_is_greeting_with_cors() {
        let response = app()
            .oneshot(
                Request::get("/")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Hello");
    }

    #[tokio::test]
    async fn test_preflight() {
        let response = app()
            .oneshot(
                Request::options("/")
                    .header(header::ORIGIN, "http://example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("GET") && methods.contains("POST"));
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("content-type") && allowed.contains("authorization"));
    }

    #[tokio::test]
    async fn test_unknown_path_and_method() {
        let missing = app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let delete = app()
            .oneshot(Request::delete("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_room_path_without_upgrade_is_refused() {
        let response = app()
            .oneshot(Request::get("/room/finals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
