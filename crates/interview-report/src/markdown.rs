//! Markdown transcript export.
//!
//! The document has a summary table, one section per turn (question, answer,
//! feedback, score) in the order they happened, and a footer.
//!
//! # Example
//!
//! ```rust
//! use interview_engine::InterviewSession;
//! use interview_report::{MarkdownGenerator, Transcript};
//!
//! let transcript = Transcript::from_snapshot(&InterviewSession::new().snapshot());
//! let markdown = MarkdownGenerator::new(&transcript).generate();
//! assert!(markdown.starts_with("# Interview Transcript"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};
use interview_engine::Turn;

use crate::Transcript;

/// Renders a [`Transcript`] as Markdown.
pub struct MarkdownGenerator<'a> {
    transcript: &'a Transcript,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a generator for `transcript`.
    #[must_use]
    pub const fn new(transcript: &'a Transcript) -> Self {
        Self { transcript }
    }

    /// Generates the complete document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_turns(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        match &self.transcript.config {
            Some(config) => {
                let _ = writeln!(
                    output,
                    "# Interview Transcript: {}\n",
                    escape_markdown(&config.domain)
                );
            }
            None => {
                let _ = writeln!(output, "# Interview Transcript\n");
            }
        }
    }

    fn write_summary(&self, output: &mut String) {
        let transcript = self.transcript;
        let summary = &transcript.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", transcript.status);

        if let Some(config) = &transcript.config {
            let _ = writeln!(output, "| Difficulty | {} |", config.difficulty);
            let _ = writeln!(
                output,
                "| Duration | {} min |",
                config.duration_minutes
            );
        }
        if let Some(started) = &transcript.started_at {
            let _ = writeln!(output, "| Started | {} |", format_timestamp(started));
        }
        if let Some(elapsed) = transcript.elapsed_seconds() {
            let _ = writeln!(output, "| Time Taken | {} |", format_duration(elapsed));
        }

        let _ = writeln!(output, "| Questions Answered | {} |", summary.turns);
        let _ = writeln!(
            output,
            "| Average Score | {} |",
            summary
                .average
                .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}/10"))
        );
        if let (Some(best), Some(worst)) = (summary.best, summary.worst) {
            let _ = writeln!(output, "| Best / Worst | {best}/10 / {worst}/10 |");
        }
        let _ = writeln!(output, "| Rating | {} |", summary.band);
        let _ = writeln!(output);
    }

    fn write_turns(&self, output: &mut String) {
        let _ = writeln!(output, "## Questions\n");

        if self.transcript.turns.is_empty() {
            let _ = writeln!(output, "*No questions were answered.*\n");
            return;
        }

        for (index, turn) in self.transcript.turns.iter().enumerate() {
            Self::write_turn(output, index + 1, turn);
        }
    }

    fn write_turn(output: &mut String, number: usize, turn: &Turn) {
        let _ = writeln!(output, "### Question {number} ({}/10)\n", turn.score);
        let _ = writeln!(output, "{}\n", escape_markdown(&turn.question));

        let _ = writeln!(output, "**Answer**\n");
        let _ = writeln!(output, "{}\n", blockquote(&turn.answer));

        let _ = writeln!(output, "**Feedback**\n");
        let _ = writeln!(output, "{}\n", escape_markdown(&turn.feedback));
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Generated {} for session `{}`*",
            format_timestamp(&self.transcript.generated_at),
            self.transcript.session_id
        );
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Formats seconds as `1h 2m 3s`, dropping leading zero units.
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters that Markdown would otherwise interpret.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            _ => result.push(ch),
        }
    }

    result
}

/// Quotes every line of the candidate's answer.
fn blockquote(text: &str) -> String {
    if text.trim().is_empty() {
        return "> *(no answer)*".to_string();
    }
    text.lines()
        .map(|line| format!("> {}", escape_markdown(line)))
        .collect::<Vec<_>>()
        .join("\n")
}
