//! Integration tests for the real-time channel: attach handshake, routing,
//! and broadcast fan-out over real WebSocket connections.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use rookery::prelude::*;
use rookery::protocol::{Created, GameState, MoveResult};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a server on a random port. Returns the WebSocket address and the
/// HTTP router sharing its sessions.
async fn start_server() -> (String, axum::Router) {
    let server = RookeryServer::builder()
        .bind("127.0.0.1:0")
        .build(ChessRules, MemoryStore::new(), MemoryAuditLog::new())
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let router = server.router();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, router)
}

async fn create_session(router: &axum::Router, body: serde_json::Value) -> Created {
    let request = Request::post("/games")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    match serde_json::from_slice(&bytes).unwrap() {
        ServerMessage::Created(created) => created,
        other => panic!("expected created, got {other:?}"),
    }
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, msg: serde_json::Value) {
    ws.send(Message::Text(msg.to_string().into()))
        .await
        .expect("send");
}

async fn next_message(ws: &mut ClientWs) -> ServerMessage {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("server should answer in time")
        .expect("stream open")
        .expect("frame");
    serde_json::from_slice(&msg.into_data()).expect("decode server message")
}

/// Reads until a message matches `pick`, skipping broadcasts that may be
/// interleaved ahead of it.
async fn next_matching<T>(
    ws: &mut ClientWs,
    mut pick: impl FnMut(ServerMessage) -> Option<T>,
) -> T {
    for _ in 0..8 {
        if let Some(found) = pick(next_message(ws).await) {
            return found;
        }
    }
    panic!("expected message never arrived");
}

async fn next_state(ws: &mut ClientWs) -> GameState {
    next_matching(ws, |msg| match msg {
        ServerMessage::GameState(state) => Some(state),
        _ => None,
    })
    .await
}

async fn next_move_result(ws: &mut ClientWs) -> MoveResult {
    next_matching(ws, |msg| match msg {
        ServerMessage::MoveResult(result) => Some(result),
        _ => None,
    })
    .await
}

async fn attach(ws: &mut ClientWs, session_id: &SessionId, token: Option<&str>) -> GameState {
    let mut msg = serde_json::json!({ "type": "attach", "sessionId": session_id.as_str() });
    if let Some(token) = token {
        msg["token"] = token.into();
    }
    send(ws, msg).await;
    next_state(ws).await
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_attach_returns_game_state() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;

    let mut ws = connect(&addr).await;
    let state = attach(&mut ws, &created.session_id, Some(&created.token)).await;

    assert_eq!(state.session_id, created.session_id);
    assert_eq!(state.status, GameStatus::Active);
    assert_eq!(state.side_to_move, Side::White);
    assert!(state.move_log.is_empty());
}

#[tokio::test]
async fn test_first_message_not_attach_is_rejected() {
    let (addr, _router) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, serde_json::json!({ "type": "get_state" })).await;

    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 400),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_attach_unknown_session_returns_404() {
    let (addr, _router) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        serde_json::json!({ "type": "attach", "sessionId": "missing" }),
    )
    .await;

    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 404),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_attach_invalid_session_id_returns_400() {
    let (addr, _router) = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        serde_json::json!({ "type": "attach", "sessionId": "not a valid id!" }),
    )
    .await;

    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 400),
        other => panic!("expected error, got {other:?}"),
    }
}

// =========================================================================
// Message routing
// =========================================================================

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 400),
        other => panic!("expected error, got {other:?}"),
    }

    send(&mut ws, serde_json::json!({ "type": "get_state" })).await;
    let state = next_state(&mut ws).await;
    assert_eq!(state.session_id, created.session_id);
}

#[tokio::test]
async fn test_second_attach_is_rejected() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    send(
        &mut ws,
        serde_json::json!({ "type": "attach", "sessionId": created.session_id.as_str() }),
    )
    .await;
    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 400),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_move_then_engine_reply_over_websocket() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    send(
        &mut ws,
        serde_json::json!({ "type": "move", "from": "e2", "to": "e4" }),
    )
    .await;
    let result = next_move_result(&mut ws).await;
    assert!(result.success);
    assert_eq!(result.move_number, 1);
    assert_eq!(result.human_move.as_deref(), Some("e4"));
    assert_eq!(result.side_to_move, Side::Black);

    send(
        &mut ws,
        serde_json::json!({ "type": "ai_move", "move": "e7e5", "thinkingTimeMs": 12 }),
    )
    .await;
    let result = next_move_result(&mut ws).await;
    assert_eq!(result.move_number, 2);
    assert_eq!(result.side_to_move, Side::White);
}

#[tokio::test]
async fn test_illegal_move_returns_400_error() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    send(
        &mut ws,
        serde_json::json!({ "type": "move", "from": "e2", "to": "e5" }),
    )
    .await;
    match next_message(&mut ws).await {
        ServerMessage::Error(err) => assert_eq!(err.code, 400),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_then_move_is_broadcast_to_opponent() {
    let (addr, router) = start_server().await;
    let created = create_session(&router, serde_json::json!({ "mode": "two_player" })).await;

    let mut white = connect(&addr).await;
    let state = attach(&mut white, &created.session_id, Some(&created.token)).await;
    assert_eq!(state.waiting_for_opponent, Some(true));

    let mut black = connect(&addr).await;
    attach(&mut black, &created.session_id, None).await;
    send(&mut black, serde_json::json!({ "type": "join" })).await;
    let joined = next_matching(&mut black, |msg| match msg {
        ServerMessage::Joined(joined) => Some(joined),
        _ => None,
    })
    .await;
    assert_eq!(joined.side, Side::Black);
    assert_ne!(joined.token, created.token);

    // White learns about the opponent.
    let state = next_state(&mut white).await;
    assert_eq!(state.waiting_for_opponent, Some(false));

    send(
        &mut white,
        serde_json::json!({ "type": "move", "from": "d2", "to": "d4" }),
    )
    .await;
    let mine = next_move_result(&mut white).await;
    let theirs = next_move_result(&mut black).await;
    assert_eq!(mine, theirs);
    assert_eq!(theirs.human_move.as_deref(), Some("d4"));

    // Black replies using the token remembered from `join`.
    send(
        &mut black,
        serde_json::json!({ "type": "move", "from": "d7", "to": "d5" }),
    )
    .await;
    let result = next_move_result(&mut black).await;
    assert_eq!(result.move_number, 2);
    assert_eq!(next_move_result(&mut white).await, result);
}

#[tokio::test]
async fn test_wrong_side_move_returns_403() {
    let (addr, router) = start_server().await;
    let created = create_session(&router, serde_json::json!({ "mode": "two_player" })).await;

    let mut white = connect(&addr).await;
    attach(&mut white, &created.session_id, Some(&created.token)).await;
    let mut black = connect(&addr).await;
    attach(&mut black, &created.session_id, None).await;
    send(&mut black, serde_json::json!({ "type": "join" })).await;
    next_matching(&mut black, |msg| match msg {
        ServerMessage::Joined(joined) => Some(joined),
        _ => None,
    })
    .await;

    send(
        &mut black,
        serde_json::json!({ "type": "move", "from": "e7", "to": "e5" }),
    )
    .await;
    let err = next_matching(&mut black, |msg| match msg {
        ServerMessage::Error(err) => Some(err),
        _ => None,
    })
    .await;
    assert_eq!(err.code, 403);
}

#[tokio::test]
async fn test_http_move_is_broadcast_to_attached_connection() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    let request = Request::post(format!("/games/{}/move", created.session_id))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "from": "g1", "to": "f3" }).to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let pushed = next_move_result(&mut ws).await;
    assert_eq!(pushed.human_move.as_deref(), Some("Nf3"));
}

#[tokio::test]
async fn test_resign_over_websocket_ends_game() {
    let (addr, router) = start_server().await;
    let created = create_session(
        &router,
        serde_json::json!({ "mode": "single_player_vs_engine", "creatorSide": "black" }),
    )
    .await;
    let mut ws = connect(&addr).await;
    attach(&mut ws, &created.session_id, Some(&created.token)).await;

    send(&mut ws, serde_json::json!({ "type": "resign" })).await;
    let state = next_state(&mut ws).await;
    assert_eq!(state.status, GameStatus::Resigned);
    assert_eq!(state.outcome.and_then(|o| o.winner()), Some(Side::White));
}
