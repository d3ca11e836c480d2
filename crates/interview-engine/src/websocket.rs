//! WebSocket event types and broadcasting for live session observation.
//!
//! Everything a front-end needs to render an interview arrives as a
//! [`SessionEvent`] on the `/ws` stream. Events are broadcast to all connected
//! clients; a client that connects late receives a `connected` event carrying
//! the current [`SessionSnapshot`] and then follows along.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes the current snapshot
//! - `status_changed` - The session moved between lifecycle states
//! - `question` - A new question is on screen
//! - `turn_completed` - An answer was evaluated and recorded
//! - `tick` - One second of the countdown elapsed
//! - `confidence` - A new confidence sample was accepted
//! - `retry` - A backend call failed transiently and will be retried
//! - `error` - A transition failed; carries the banner message
//! - `session_ended` - The interview is over
//!
//! # Example
//!
//! ```no_run
//! use interview_engine::websocket::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::tick(59));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::confidence::ConfidenceSample;
use crate::generation::RetryAttempt;
use crate::session::{SessionSnapshot, SessionStatus, Turn};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The session as it is right now.
    pub session: SessionSnapshot,
}

/// Payload for the `status_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedPayload {
    /// Status before the transition.
    pub from: SessionStatus,
    /// Status after the transition.
    pub to: SessionStatus,
}

/// Payload for the `question` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPayload {
    /// 1-based question number.
    pub number: usize,
    /// The question text.
    pub question: String,
}

/// Payload for the `turn_completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCompletedPayload {
    /// 1-based position of the turn in the history.
    pub turn_number: usize,
    /// The recorded turn.
    pub turn: Turn,
}

/// Payload for the `tick` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// Seconds left on the countdown.
    pub remaining_seconds: u32,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

/// Payload for the `session_ended` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    /// Number of completed turns.
    pub turns: usize,
    /// Mean score, if any turn was completed.
    pub average_score: Option<f64>,
    /// When the session ended.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for session observation.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent on every lifecycle transition.
    StatusChanged(StatusChangedPayload),
    /// Sent when a new question is shown.
    Question(QuestionPayload),
    /// Sent when a turn is recorded.
    TurnCompleted(TurnCompletedPayload),
    /// Sent once per countdown second.
    Tick(TickPayload),
    /// Sent when a confidence sample is accepted.
    Confidence(ConfidenceSample),
    /// Sent before each backend retry.
    Retry(RetryAttempt),
    /// Sent when an operation fails.
    Error(ErrorPayload),
    /// Sent when the interview ends.
    SessionEnded(SessionEndedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(session: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates a `StatusChanged` event.
    #[must_use]
    pub const fn status_changed(from: SessionStatus, to: SessionStatus) -> Self {
        Self::StatusChanged(StatusChangedPayload { from, to })
    }

    /// Creates a `Question` event.
    #[must_use]
    pub fn question(number: usize, question: impl Into<String>) -> Self {
        Self::Question(QuestionPayload {
            number,
            question: question.into(),
        })
    }

    /// Creates a `TurnCompleted` event.
    #[must_use]
    pub const fn turn_completed(turn_number: usize, turn: Turn) -> Self {
        Self::TurnCompleted(TurnCompletedPayload { turn_number, turn })
    }

    /// Creates a `Tick` event.
    #[must_use]
    pub const fn tick(remaining_seconds: u32) -> Self {
        Self::Tick(TickPayload { remaining_seconds })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Creates a `SessionEnded` event summarizing the snapshot.
    #[must_use]
    pub fn session_ended(snapshot: &SessionSnapshot) -> Self {
        Self::SessionEnded(SessionEndedPayload {
            turns: snapshot.history.len(),
            average_score: snapshot.average_score,
            timestamp: snapshot.ended_at.unwrap_or_else(Utc::now),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::StatusChanged(_) => "status_changed",
            Self::Question(_) => "question",
            Self::TurnCompleted(_) => "turn_completed",
            Self::Tick(_) => "tick",
            Self::Confidence(_) => "confidence",
            Self::Retry(_) => "retry",
            Self::Error(_) => "error",
            Self::SessionEnded(_) => "session_ended",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all subscribers.
///
/// Uses a tokio broadcast channel; events are not kept for clients that
/// connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives `Lagged` and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will see it.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Shared state for WebSocket handlers.
#[derive(Debug, Clone)]
pub struct WsState {
    /// Source of events forwarded to clients.
    pub broadcaster: EventBroadcaster,
    /// Latest session snapshot, sent on connect.
    pub snapshot: watch::Receiver<SessionSnapshot>,
    /// Interval between heartbeat pings.
    pub heartbeat: Duration,
}

impl WsState {
    /// Creates a `WsState` with the default heartbeat.
    #[must_use]
    pub const fn new(
        broadcaster: EventBroadcaster,
        snapshot: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self {
            broadcaster,
            snapshot,
            heartbeat: HEARTBEAT_INTERVAL,
        }
    }
}

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serves one client until it leaves or stops answering pings.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe first so nothing published after the snapshot is missed.
    let mut event_receiver = state.broadcaster.subscribe();
    let current = state.snapshot.borrow().clone();

    let connected_json = match serde_json::to_string(&SessionEvent::connected(current)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent session snapshot");

    let mut heartbeat = interval_at(Instant::now() + state.heartbeat, state.heartbeat);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        // Control happens over HTTP.
                        debug!("Ignoring data message from client");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!(event = event.event_name(), "Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
