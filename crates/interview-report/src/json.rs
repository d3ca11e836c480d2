//! JSON transcript export.
//!
//! # Example
//!
//! ```rust
//! use interview_engine::InterviewSession;
//! use interview_report::{json::JsonGenerator, Transcript};
//!
//! let transcript = Transcript::from_snapshot(&InterviewSession::new().snapshot());
//! let generator = JsonGenerator::new(&transcript);
//!
//! let compact = generator.generate().unwrap();
//! let pretty = generator.generate_pretty().unwrap();
//! assert!(pretty.len() > compact.len());
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Result, Transcript};

/// Serializes a [`Transcript`] to JSON.
pub struct JsonGenerator<'a> {
    transcript: &'a Transcript,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator for `transcript`.
    #[must_use]
    pub const fn new(transcript: &'a Transcript) -> Self {
        Self { transcript }
    }

    /// Generates single-line JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if serialization fails.
    pub fn generate(&self) -> Result<String> {
        Ok(serde_json::to_string(self.transcript)?)
    }

    /// Generates indented JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self.transcript)?)
    }

    /// Writes the transcript to `path`, with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Io` if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use interview_engine::{Difficulty, InterviewConfig, InterviewSession, SessionStatus, Turn};

    use super::*;
    use crate::{ReportError, ScoreBand};

    fn sample_transcript() -> Transcript {
        let mut snapshot = InterviewSession::new().snapshot();
        snapshot.status = SessionStatus::Ended;
        snapshot.config = Some(InterviewConfig::new(Difficulty::Beginner, "Web Development", 15));
        snapshot.history = vec![
            Turn::new("What is CSS?", "Styling language", "Good start. 7/10"),
            Turn::new("What is the box model?", "Margin, border, padding", "Solid. 8/10"),
        ];
        Transcript::from_snapshot(&snapshot)
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("{}-{name}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_generate_compact_json() {
        let transcript = sample_transcript();
        let json = JsonGenerator::new(&transcript).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""status":"ended""#));
        assert!(json.contains(r#""domain":"Web Development""#));
    }

    #[test]
    fn test_json_contains_turn_and_summary_fields() {
        let transcript = sample_transcript();
        let json = JsonGenerator::new(&transcript).generate_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["turns"][0]["question"], "What is CSS?");
        assert_eq!(value["turns"][1]["score"], 8);
        assert_eq!(value["summary"]["turns"], 2);
        assert_eq!(value["summary"]["average"], 7.5);
        assert_eq!(value["summary"]["band"], "good");
        assert_eq!(value["config"]["durationMinutes"], 15);
        assert!(value.get("generatedAt").is_some());
    }

    #[test]
    fn test_json_roundtrip_preserves_turns() {
        let transcript = sample_transcript();
        let json = JsonGenerator::new(&transcript).generate().unwrap();
        let parsed: Transcript = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.turns, transcript.turns);
        assert_eq!(parsed.summary.band, ScoreBand::Good);
    }

    #[test]
    fn test_unconfigured_transcript_omits_config() {
        let transcript = Transcript::from_snapshot(&InterviewSession::new().snapshot());
        let json = JsonGenerator::new(&transcript).generate().unwrap();

        assert!(!json.contains("config"));
        assert!(json.contains(r#""band":"unrated""#));
    }

    #[test]
    fn test_write_to_file() {
        let transcript = sample_transcript();
        let path = temp_path("transcript.json");

        JsonGenerator::new(&transcript)
            .write_to_file(&path, true)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("}\n"));
        assert!(contents.contains("\n  \"sessionId\""));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_to_file_invalid_path() {
        let transcript = sample_transcript();
        let path = temp_path("missing-dir").join("transcript.json");

        let err = JsonGenerator::new(&transcript)
            .write_to_file(&path, false)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
