//! Error types for the interview engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, session validation, generative backend
//! calls, persistence writes and landmark detection.

use std::path::PathBuf;

/// A specialized `Result` type for interview engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while running an interview session.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your interview.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration, setup or answer input was rejected.
    ///
    /// Local to the caller and never retried.
    #[error("Invalid input: {message}\n\nSuggestion: {suggestion}")]
    Validation {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Generative Backend Errors
    // ========================================================================
    /// A single backend call failed with a non-retryable error.
    #[error("Failed to generate content ({kind}): {message}")]
    Generation {
        /// Classification of the backend failure.
        kind: BackendErrorKind,
        /// Detailed error message from the backend.
        message: String,
    },

    /// The retry budget was spent on transient backend failures.
    #[error("Failed to generate content after {attempts} attempts: {last_error}\n\nSuggestion: The model service is overloaded. Please try again later")]
    GenerationExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last transient failure.
        last_error: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// Writing the interview record failed.
    ///
    /// Logged by the session; never rolls back in-memory state.
    #[error("Failed to persist interview record: {message}")]
    Persistence {
        /// Description of the write failure.
        message: String,
    },

    /// A single landmark detection failed.
    #[error("Landmark detection failed: {message}")]
    Detection {
        /// Description of the detection failure.
        message: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// The session actor has shut down.
    #[error("Interview session is no longer running")]
    SessionClosed,

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of generative backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// The service is temporarily overloaded (HTTP 503).
    Unavailable,
    /// Rate limit exceeded.
    RateLimited,
    /// Authentication failure (invalid API key).
    Authentication,
    /// Other server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The response could not be interpreted.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Authentication => write!(f, "authentication"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl BackendErrorKind {
    /// Returns `true` if a call failing with this kind may be retried.
    ///
    /// Only temporary unavailability qualifies.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl EngineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error with the given message and suggestion.
    #[must_use]
    pub fn validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Generation` error.
    #[must_use]
    pub fn generation(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `GenerationExhausted` error.
    #[must_use]
    pub fn exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::GenerationExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Creates a new `Persistence` error.
    #[must_use]
    pub fn persistence(message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: message.to_string(),
        }
    }

    /// Creates a new `Detection` error.
    #[must_use]
    pub fn detection(message: impl std::fmt::Display) -> Self {
        Self::Detection {
            message: message.to_string(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Generation { kind, .. } if kind.is_transient())
    }

    /// Returns `true` if this error ends the interview for good.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::Generation {
                    kind: BackendErrorKind::Authentication,
                    ..
                }
                | Self::SessionClosed
        )
    }

    /// Returns the message shown in the session's error banner.
    ///
    /// Exhausted retries and single failures read differently so the candidate
    /// knows whether waiting will help.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::GenerationExhausted { attempts, .. } => format!(
                "The interviewer is unavailable after {attempts} attempts. Please try again later."
            ),
            Self::Generation { .. } => {
                "The interviewer could not respond. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
