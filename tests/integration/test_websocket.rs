//! Integration tests for the HTTP API and the WebSocket event stream.
//!
//! Each test serves the real router on a free local port, drives the session
//! over HTTP with `reqwest`, and observes events with `tokio-tungstenite`.

mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use common::spawn_default_session;
use futures::{SinkExt, StreamExt};
use interview_engine::{
    create_router, AppState, ConfidenceFeed, SessionEvent, SessionSnapshot, SessionStatus,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    base_url: String,
    ws_url: String,
    state: AppState,
    _handle: tokio::task::JoinHandle<()>,
}

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

async fn spawn_test_server() -> TestServer {
    let (_backend, session) = spawn_default_session();
    let confidence = Arc::new(ConfidenceFeed::default().with_events(session.events().clone()));
    let state = AppState::new(session, confidence);

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    let router = create_router(state.clone());

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        state,
        _handle: handle,
    }
}

async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Receives events until one named `name` arrives, skipping ticks and others.
async fn receive_named(client: &mut WsClient, name: &str) -> SessionEvent {
    loop {
        let event = receive_event(client).await;
        if event.event_name() == name {
            return event;
        }
    }
}

async fn configure_and_start(server: &TestServer) -> SessionSnapshot {
    let http = reqwest::Client::new();
    let response = http
        .post(format!("{}/api/session/configure", server.base_url))
        .json(&serde_json::json!({
            "difficulty": "intermediate",
            "domain": "Operating Systems",
            "durationMinutes": 10
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let response = http
        .post(format!("{}/api/session/start", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_snapshot() {
    let server = spawn_test_server().await;

    let mut client = connect_client(&server.ws_url).await;
    let event = receive_event(&mut client).await;

    let SessionEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert_eq!(payload.session.status, SessionStatus::Unconfigured);
    assert!(payload.session.history.is_empty());
}

#[tokio::test]
async fn test_late_client_sees_current_question() {
    let server = spawn_test_server().await;
    let started = configure_and_start(&server).await;

    let mut client = connect_client(&server.ws_url).await;
    let SessionEvent::Connected(payload) = receive_event(&mut client).await else {
        panic!("Expected Connected event");
    };

    assert_eq!(payload.session.status, SessionStatus::Active);
    assert_eq!(payload.session.current_question, started.current_question);
}

// ============================================================================
// Session events
// ============================================================================

#[tokio::test]
async fn test_start_broadcasts_status_and_question() {
    let server = spawn_test_server().await;
    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await;

    configure_and_start(&server).await;

    let SessionEvent::StatusChanged(first) = receive_named(&mut client, "status_changed").await
    else {
        panic!("Expected StatusChanged");
    };
    assert_eq!(first.from, SessionStatus::Unconfigured);
    assert_eq!(first.to, SessionStatus::Starting);

    let SessionEvent::StatusChanged(second) = receive_named(&mut client, "status_changed").await
    else {
        panic!("Expected StatusChanged");
    };
    assert_eq!(second.to, SessionStatus::Active);

    let SessionEvent::Question(question) = receive_named(&mut client, "question").await else {
        panic!("Expected Question");
    };
    assert_eq!(question.number, 1);
    assert_eq!(question.question, "Question 1?");
}

#[tokio::test]
async fn test_turn_events_broadcast_to_all_clients() {
    let server = spawn_test_server().await;
    configure_and_start(&server).await;

    let mut client1 = connect_client(&server.ws_url).await;
    let mut client2 = connect_client(&server.ws_url).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    let http = reqwest::Client::new();
    http.put(format!("{}/api/session/answer", server.base_url))
        .json(&serde_json::json!({ "answer": "Paging maps virtual to physical" }))
        .send()
        .await
        .unwrap();
    let snapshot: SessionSnapshot = http
        .post(format!("{}/api/session/submit", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.history.len(), 1);

    for client in [&mut client1, &mut client2] {
        let SessionEvent::TurnCompleted(turn) = receive_named(client, "turn_completed").await
        else {
            panic!("Expected TurnCompleted");
        };
        assert_eq!(turn.turn_number, 1);
        assert_eq!(turn.turn.answer, "Paging maps virtual to physical");
        assert_eq!(turn.turn.score, 7);

        let SessionEvent::Question(question) = receive_named(client, "question").await else {
            panic!("Expected Question");
        };
        assert_eq!(question.number, 2);
    }
}

#[tokio::test]
async fn test_end_broadcasts_session_ended() {
    let server = spawn_test_server().await;
    configure_and_start(&server).await;

    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/session/end", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let SessionEvent::SessionEnded(ended) = receive_named(&mut client, "session_ended").await
    else {
        panic!("Expected SessionEnded");
    };
    assert_eq!(ended.turns, 0);
    assert!(ended.average_score.is_none());
    assert_eq!(server.state.session.snapshot().status, SessionStatus::Ended);
}

#[tokio::test]
async fn test_countdown_ticks_are_streamed() {
    let server = spawn_test_server().await;
    configure_and_start(&server).await;

    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await;

    let SessionEvent::Tick(tick) = receive_named(&mut client, "tick").await else {
        panic!("Expected Tick");
    };
    assert!(tick.remaining_seconds < 600);
}

// ============================================================================
// Confidence
// ============================================================================

#[tokio::test]
async fn test_confidence_capture_is_streamed() {
    let server = spawn_test_server().await;
    let mut client = connect_client(&server.ws_url).await;
    receive_event(&mut client).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/confidence/capture", server.base_url))
        .json(&serde_json::json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let SessionEvent::Confidence(sample) = receive_named(&mut client, "confidence").await else {
        panic!("Expected Confidence");
    };
    assert_eq!(sample.value, 0);
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn test_http_errors_map_to_status_codes() {
    let server = spawn_test_server().await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/api/session/submit", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    let response = http
        .post(format!("{}/api/session/start", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("difficulty level"));
}
