//! Conversation context and prompt construction.
//!
//! Every prompt sent to the generative backend carries the full interview
//! history so far, serialized by [`build_context`]. Nothing is truncated or
//! summarized; the model's input limit is the only bound.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Difficulty;
use crate::session::Turn;

/// Score used when feedback carries no recognizable `N/10` token.
pub const DEFAULT_SCORE: u8 = 5;

/// Highest score a turn can receive.
pub const MAX_SCORE: u8 = 10;

#[allow(clippy::expect_used)]
static SCORE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)/10\b").expect("score pattern is valid"));

/// Serializes the history into prompt context.
///
/// Each turn becomes a `Q:` / `A:` / `Feedback:` block; blocks are joined by a
/// single blank line in chronological order. An empty history yields an empty
/// string.
///
/// # Examples
///
/// ```
/// use interview_engine::{build_context, Turn};
///
/// assert_eq!(build_context(&[]), "");
///
/// let turn = Turn::new("What is Rust?", "A language", "Good. 7/10");
/// assert_eq!(build_context(&[turn]), "Q: What is Rust?\nA: A language\nFeedback: Good. 7/10");
/// ```
#[must_use]
pub fn build_context(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| {
            format!(
                "Q: {}\nA: {}\nFeedback: {}",
                turn.question, turn.answer, turn.feedback
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the prompt asking for the next interview question.
#[must_use]
pub fn question_prompt(difficulty: Difficulty, domain: &str, context: &str) -> String {
    let mut prompt = format!(
        "You are conducting a {} level technical interview about {domain}.\n",
        difficulty.as_str()
    );
    if !context.is_empty() {
        prompt.push_str("Based on the previous discussion:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nAsk exactly one relevant follow-up question that builds naturally on the conversation.\n\
         The question should be direct and professional.\n\n\
         Reply with the question only, without any additional formatting or text.",
    );
    prompt
}

/// Builds the prompt asking for feedback on an answer.
///
/// The request asks for an explicit score out of ten, which
/// [`parse_score`] later extracts.
#[must_use]
pub fn evaluation_prompt(question: &str, answer: &str, context: &str) -> String {
    let mut prompt = String::from(
        "You are an expert technical interviewer. Evaluate the candidate's answer \
         professionally and give constructive feedback.\n",
    );
    if !context.is_empty() {
        prompt.push_str("Previous context of the interview:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt.push_str(&format!("\nQuestion: {question}\nAnswer: {answer}\n\n"));
    prompt.push_str(
        "Respond in a conversational yet professional tone. Include:\n\
         1. A brief evaluation of the answer\n\
         2. What was good about it\n\
         3. What could be improved\n\
         4. A score out of 10, written as N/10\n\n\
         Keep the response natural, as if you were speaking directly to the candidate.",
    );
    prompt
}

/// Extracts the score from evaluation feedback.
///
/// Returns the first `N/10` token whose value lies in `0..=10`, or
/// [`DEFAULT_SCORE`] when there is none.
///
/// # Examples
///
/// ```
/// use interview_engine::parse_score;
///
/// assert_eq!(parse_score("Solid answer. Score: 7/10."), 7);
/// assert_eq!(parse_score("No score here"), 5);
/// ```
#[must_use]
pub fn parse_score(feedback: &str) -> u8 {
    SCORE_PATTERN
        .captures_iter(feedback)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
        .find(|score| *score <= MAX_SCORE)
        .unwrap_or(DEFAULT_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str, answer: &str, feedback: &str) -> Turn {
        Turn::new(question, answer, feedback)
    }

    #[test]
    fn test_build_context_empty_history() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_build_context_two_turns_in_order() {
        let history = vec![
            turn("Q1?", "A1", "Fine. 6/10"),
            turn("Q2?", "A2", "Great. 9/10"),
        ];

        assert_eq!(
            build_context(&history),
            "Q: Q1?\nA: A1\nFeedback: Fine. 6/10\n\nQ: Q2?\nA: A2\nFeedback: Great. 9/10"
        );
    }

    #[test]
    fn test_question_prompt_without_context() {
        let prompt = question_prompt(Difficulty::Advanced, "Distributed Systems", "");
        assert!(prompt.contains("advanced level technical interview about Distributed Systems"));
        assert!(!prompt.contains("previous discussion"));
        assert!(prompt.contains("question only"));
    }

    #[test]
    fn test_question_prompt_includes_context() {
        let context = build_context(&[turn("What is a B-tree?", "A tree", "Vague. 4/10")]);
        let prompt = question_prompt(Difficulty::Beginner, "Databases", &context);
        assert!(prompt.contains("beginner level"));
        assert!(prompt.contains("Based on the previous discussion"));
        assert!(prompt.contains("Q: What is a B-tree?"));
    }

    #[test]
    fn test_evaluation_prompt_contents() {
        let prompt = evaluation_prompt("Explain TCP", "Reliable stream protocol", "");
        assert!(prompt.contains("Question: Explain TCP"));
        assert!(prompt.contains("Answer: Reliable stream protocol"));
        assert!(prompt.contains("score out of 10"));
        assert!(!prompt.contains("Previous context"));

        let prompt = evaluation_prompt("Q", "A", "Q: earlier\nA: x\nFeedback: y");
        assert!(prompt.contains("Previous context of the interview"));
        assert!(prompt.contains("Q: earlier"));
    }

    #[test]
    fn test_parse_score_finds_token() {
        assert_eq!(parse_score("Nice work overall, I'd give it 7/10."), 7);
        assert_eq!(parse_score("10/10 would hire"), 10);
        assert_eq!(parse_score("Score: 0/10"), 0);
    }

    #[test]
    fn test_parse_score_defaults_without_token() {
        assert_eq!(parse_score("Good answer, well structured."), DEFAULT_SCORE);
        assert_eq!(parse_score(""), DEFAULT_SCORE);
    }

    #[test]
    fn test_parse_score_skips_out_of_range_values() {
        assert_eq!(parse_score("Out of 15/10 possible... realistically 8/10"), 8);
        assert_eq!(parse_score("999/10"), DEFAULT_SCORE);
    }

    #[test]
    fn test_parse_score_requires_word_boundary() {
        // "x7/10" has no boundary before the digit.
        assert_eq!(parse_score("ratio x7/10"), DEFAULT_SCORE);
        assert_eq!(parse_score("7/100 points"), DEFAULT_SCORE);
    }
}
