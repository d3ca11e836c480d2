//! HTTP API for the interview session.
//!
//! A thin command surface over [`SessionHandle`]. Every mutating endpoint
//! returns the session snapshot after the command has settled, so a client
//! never needs to poll between a request and the state it caused.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Current session snapshot
//! - `POST /api/session/configure` - Set difficulty, domain and duration
//! - `POST /api/session/start` - Start and wait for the first question
//! - `PUT /api/session/answer` - Replace the unsubmitted answer
//! - `POST /api/session/submit` - Submit and wait for the next question
//! - `POST /api/session/end` - End the interview
//! - `GET /api/confidence` - Latest confidence sample
//! - `POST /api/confidence/capture` - Score a landmark frame (`null` = no face)
//! - `GET /ws` - Event stream (see [`crate::websocket`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use interview_engine::{
//!     create_router, AppState, ConfidenceFeed, GeminiBackend, Config, MemoryStore,
//!     ResilientClient, SessionActor, UserId,
//! };
//!
//! # async fn example() -> interview_engine::Result<()> {
//! let config = Config::default();
//! let client = ResilientClient::new(Arc::new(GeminiBackend::from_config(&config)?));
//! let session = SessionActor::new(client, Arc::new(MemoryStore::new()), UserId::default()).spawn();
//! let confidence = Arc::new(ConfidenceFeed::default().with_events(session.events().clone()));
//!
//! let router = create_router(AppState::new(session, confidence));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::actor::SessionHandle;
use crate::config::InterviewConfig;
use crate::confidence::{ConfidenceBand, ConfidenceFeed, ConfidenceSample, LandmarkFrame};
use crate::error::EngineError;
use crate::session::SessionSnapshot;
use crate::websocket::{ws_handler, WsState};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `PUT /api/session/answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// The new answer text. Replaces whatever was there.
    pub answer: String,
}

/// Response body for `PUT /api/session/answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// `false` when the session was not accepting answers.
    pub accepted: bool,
}

/// Response body for `POST /api/confidence/capture`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResponse {
    /// Whether the frame produced a new sample.
    pub accepted: bool,
    /// The latest sample after this frame.
    pub sample: ConfidenceSample,
    /// Coaching band of the latest sample.
    pub band: ConfidenceBand,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the running interview.
    pub session: SessionHandle,
    /// Confidence pipeline fed by the capture endpoint.
    pub confidence: Arc<ConfidenceFeed>,
}

impl AppState {
    /// Creates the state from a session and a confidence feed.
    #[must_use]
    pub const fn new(session: SessionHandle, confidence: Arc<ConfidenceFeed>) -> Self {
        Self {
            session,
            confidence,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

#[derive(Debug)]
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            EngineError::Generation { .. }
            | EngineError::GenerationExhausted { .. }
            | EngineError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self.0, "Request failed");

        let body = Json(ErrorResponse {
            error: self.0.user_message(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with the API routes under `/api` and the event
/// stream at `/ws`.
pub fn create_router(state: AppState) -> Router {
    // Development CORS: any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_state = Arc::new(WsState::new(
        state.session.events().clone(),
        state.session.watch(),
    ));

    let api_routes = Router::new()
        .route("/session", get(handle_snapshot))
        .route("/session/configure", post(handle_configure))
        .route("/session/start", post(handle_start))
        .route("/session/answer", put(handle_answer))
        .route("/session/submit", post(handle_submit))
        .route("/session/end", post(handle_end))
        .route("/confidence", get(handle_confidence))
        .route("/confidence/capture", post(handle_capture));

    Router::new()
        .nest("/api", api_routes)
        .with_state(Arc::new(state))
        .merge(
            Router::new()
                .route("/ws", get(ws_handler))
                .with_state(ws_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_snapshot(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

async fn handle_configure(
    State(state): State<Arc<AppState>>,
    Json(config): Json<InterviewConfig>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    info!(
        difficulty = %config.difficulty,
        domain = %config.domain,
        duration_minutes = config.duration_minutes,
        "Configure request received"
    );
    Ok(Json(state.session.configure(config).await?))
}

/// Handler for `POST /api/session/start`.
///
/// Blocks until the first question arrives or generation gives up.
async fn handle_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    info!("Start request received");
    Ok(Json(state.session.start().await?))
}

async fn handle_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let accepted = state.session.set_answer(request.answer).await?;
    Ok(Json(AnswerResponse { accepted }))
}

/// Handler for `POST /api/session/submit`.
///
/// Blocks until the answer is evaluated and the follow-up question has
/// arrived. A submit during an ongoing evaluation returns immediately.
async fn handle_submit(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    info!("Submit request received");
    Ok(Json(state.session.submit_answer().await?))
}

async fn handle_end(State(state): State<Arc<AppState>>) -> Result<Json<SessionSnapshot>, ApiError> {
    info!("End request received");
    Ok(Json(state.session.end().await?))
}

async fn handle_confidence(State(state): State<Arc<AppState>>) -> Json<ConfidenceSample> {
    Json(state.confidence.latest())
}

async fn handle_capture(
    State(state): State<Arc<AppState>>,
    Json(frame): Json<Option<LandmarkFrame>>,
) -> Json<FrameResponse> {
    let accepted = state.confidence.submit(frame.as_ref()).is_some();
    let sample = state.confidence.latest();
    Json(FrameResponse {
        accepted,
        sample,
        band: sample.band(),
    })
}

// ============================================================================
// Tests
// ============================================================================
