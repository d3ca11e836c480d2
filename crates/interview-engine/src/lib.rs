//! Adaptive interview engine.
//!
//! Runs a timed, AI-driven technical interview: asks a question, evaluates the
//! candidate's answer, and adapts the next question to everything said so
//! far. Alongside the conversation it scores facial landmarks into a live
//! confidence signal and persists a record of every turn.

pub mod actor;
pub mod api;
pub mod confidence;
pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod session;
pub mod store;
pub mod voice;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use actor::{SessionActor, SessionHandle, TICK_PERIOD};
pub use api::{create_router, AnswerRequest, AnswerResponse, AppState, ErrorResponse, FrameResponse};
pub use confidence::{
    score_frame, ConfidenceBand, ConfidenceFeed, ConfidencePipeline, ConfidenceSample, ConfidenceSampler,
    FrameSource, Landmark, LandmarkFrame,
};
pub use config::{Config, ConfidenceConfig, Difficulty, InterviewConfig, RetryConfig};
pub use context::{build_context, evaluation_prompt, parse_score, question_prompt};
pub use error::{BackendErrorKind, EngineError, Result};
pub use generation::{
    BackendError, GeminiBackend, GenerativeBackend, ResilientClient, RetryAttempt, RetryPolicy,
};
pub use session::{InterviewSession, SessionSnapshot, SessionStatus, Turn};
pub use store::{InterviewRecord, InterviewStore, JsonFileStore, MemoryStore, UserId};
pub use voice::{forward_transcripts, TranscriptSource};
pub use websocket::{EventBroadcaster, SessionEvent, WsState};
