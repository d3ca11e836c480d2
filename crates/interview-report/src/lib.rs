//! Interview transcript export.
//!
//! Turns a finished (or abandoned) session into a [`Transcript`]: the
//! configuration, every question/answer/feedback turn in order, and a score
//! summary. Transcripts serialize to JSON for programmatic access or render
//! to Markdown for the candidate.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use interview_engine::{InterviewSession, Turn};
//! use interview_report::{MarkdownGenerator, Transcript};
//!
//! let mut snapshot = InterviewSession::new().snapshot();
//! snapshot.history.push(Turn::new(
//!     "What does a mutex guarantee?",
//!     "Mutual exclusion",
//!     "Correct and concise. 8/10",
//! ));
//!
//! let transcript = Transcript::from_snapshot(&snapshot);
//! assert_eq!(transcript.summary.turns, 1);
//!
//! let markdown = MarkdownGenerator::new(&transcript).generate();
//! assert!(markdown.contains("What does a mutex guarantee?"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use interview_engine::{InterviewConfig, SessionSnapshot, SessionStatus, Turn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during transcript export.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the transcript to JSON.
    #[error("failed to serialize transcript: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write transcript files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Score Bands
// ============================================================================

/// Coarse rating derived from the average turn score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    /// Average of 8 or more.
    Excellent,
    /// Average of 6 up to 8.
    Good,
    /// Average of 4 up to 6.
    Fair,
    /// Average below 4.
    NeedsWork,
    /// No turns were completed.
    #[default]
    Unrated,
}

impl ScoreBand {
    /// Classifies an average score on the 0..=10 scale.
    #[must_use]
    pub fn from_average(average: Option<f64>) -> Self {
        match average {
            None => Self::Unrated,
            Some(avg) if avg >= 8.0 => Self::Excellent,
            Some(avg) if avg >= 6.0 => Self::Good,
            Some(avg) if avg >= 4.0 => Self::Fair,
            Some(_) => Self::NeedsWork,
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::NeedsWork => "Needs work",
            Self::Unrated => "Unrated",
        }
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// Aggregate scores of a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    /// Number of completed turns.
    pub turns: usize,
    /// Mean score, absent when no turn was completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Highest turn score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<u8>,
    /// Lowest turn score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst: Option<u8>,
    /// Rating band of the average.
    pub band: ScoreBand,
}

impl ScoreSummary {
    /// Summarizes the scores of `turns`.
    #[must_use]
    pub fn from_turns(turns: &[Turn]) -> Self {
        let scores: Vec<u8> = turns.iter().map(|turn| turn.score).collect();
        let average = if scores.is_empty() {
            None
        } else {
            let total: u32 = scores.iter().map(|&s| u32::from(s)).sum();
            #[allow(clippy::cast_precision_loss)]
            Some(f64::from(total) / scores.len() as f64)
        };

        Self {
            turns: scores.len(),
            average,
            best: scores.iter().copied().max(),
            worst: scores.iter().copied().min(),
            band: ScoreBand::from_average(average),
        }
    }
}

/// Exportable record of one interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Session the transcript was taken from.
    pub session_id: Uuid,
    /// Lifecycle status at export time.
    pub status: SessionStatus,
    /// Interview configuration, absent if the session was never configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<InterviewConfig>,
    /// When the first question arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the interview ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Completed turns in the order they happened.
    pub turns: Vec<Turn>,
    /// Score aggregates.
    pub summary: ScoreSummary,
    /// When the transcript was produced.
    pub generated_at: DateTime<Utc>,
}

impl Transcript {
    /// Builds a transcript from a session snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            status: snapshot.status,
            config: snapshot.config.clone(),
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
            turns: snapshot.history.clone(),
            summary: ScoreSummary::from_turns(&snapshot.history),
            generated_at: Utc::now(),
        }
    }

    /// Wall-clock seconds between start and end, if both are known.
    #[must_use]
    pub fn elapsed_seconds(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.ended_at?);
        u64::try_from((end - start).num_seconds()).ok()
    }

    /// Suggested file stem for exports: `interview-<session id>`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("interview-{}", self.session_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
