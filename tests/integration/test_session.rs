//! End-to-end tests of the interview lifecycle through a `SessionHandle`.
//!
//! The generative backend is scripted, so every run is deterministic. Timer
//! and backoff tests run on paused tokio time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{spawn_default_session, spawn_session, ScriptedBackend, EVALUATION_PREFIX};
use interview_engine::{
    BackendError, BackendErrorKind, Difficulty, EngineError, InterviewConfig, InterviewStore,
    JsonFileStore, MemoryStore, SessionEvent, SessionStatus,
};
use interview_report::{json::JsonGenerator, MarkdownGenerator, ScoreBand, Transcript};

fn web_dev(minutes: u32) -> InterviewConfig {
    InterviewConfig::new(Difficulty::Beginner, "Web Development", minutes)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Configures, answers two questions, ends, and checks the persisted record
/// and the exported transcript.
#[tokio::test]
async fn test_full_interview_persists_and_exports() {
    let dir = std::env::temp_dir().join(format!("interview-it-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(JsonFileStore::new(dir.join("records")));
    let session = spawn_session(ScriptedBackend::new(), store.clone());

    session.configure(web_dev(15)).await.unwrap();
    let started = session.start().await.unwrap();
    assert_eq!(started.status, SessionStatus::Active);
    assert_eq!(started.remaining_seconds, 900);
    assert_eq!(started.current_question, "Question 1?");

    for answer in ["HTML structures content", "CSS styles it"] {
        assert!(session.set_answer(answer).await.unwrap());
        let snapshot = session.submit_answer().await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Active);
    }

    let ended = session.end().await.unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.history.len(), 2);
    assert_eq!(ended.average_score, Some(7.0));

    let record = store
        .load_interview(ended.session_id)
        .await
        .unwrap()
        .expect("record written");
    assert_eq!(record.user_id.as_str(), "integration-user");
    assert_eq!(record.domain, "Web Development");
    assert_eq!(record.duration_minutes, 15);
    assert_eq!(record.score, Some(7));
    assert_eq!(record.feedback, ended.history);

    let transcript = Transcript::from_snapshot(&ended);
    assert_eq!(transcript.summary.band, ScoreBand::Good);

    let markdown = MarkdownGenerator::new(&transcript).generate();
    let first = markdown.find("Question 1?").unwrap();
    let second = markdown.find("Question 2?").unwrap();
    assert!(first < second);

    let json_path = dir.join("transcript.json");
    JsonGenerator::new(&transcript)
        .write_to_file(&json_path, true)
        .unwrap();
    let parsed: Transcript =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.turns, ended.history);

    std::fs::remove_dir_all(&dir).unwrap();
}

/// Every follow-up question prompt carries the complete prior conversation.
#[tokio::test]
async fn test_follow_up_prompts_accumulate_context() {
    let (backend, session) = spawn_default_session();
    session.configure(web_dev(10)).await.unwrap();
    session.start().await.unwrap();

    session.set_answer("first answer").await.unwrap();
    session.submit_answer().await.unwrap();
    session.set_answer("second answer").await.unwrap();
    session.submit_answer().await.unwrap();

    let prompts = backend.prompts();
    // first question, then (evaluation, follow-up) per answer
    assert_eq!(prompts.len(), 5);
    assert!(prompts[1].starts_with(EVALUATION_PREFIX));
    assert!(prompts[1].contains("first answer"));

    let first_block =
        "Q: Question 1?\nA: first answer\nFeedback: Good answer with room to go deeper. 7/10";
    let second_block =
        "Q: Question 2?\nA: second answer\nFeedback: Good answer with room to go deeper. 7/10";
    assert!(prompts[2].contains(first_block));
    assert!(!prompts[2].contains("second answer"));
    assert!(prompts[4].contains(&format!("{first_block}\n\n{second_block}")));
}

/// Submitting an empty answer is rejected locally without a backend call.
#[tokio::test]
async fn test_empty_answer_rejected_without_backend_call() {
    let (backend, session) = spawn_default_session();
    session.configure(web_dev(5)).await.unwrap();
    session.start().await.unwrap();

    session.set_answer("   ").await.unwrap();
    let err = session.submit_answer().await.unwrap_err();

    assert!(matches!(err, EngineError::Validation { .. }));
    assert_eq!(backend.prompts().len(), 1);
    assert_eq!(session.snapshot().status, SessionStatus::Active);
}

// ============================================================================
// Failures
// ============================================================================

/// A non-transient evaluation failure is not retried, keeps the answer, and
/// can be recovered from by submitting again.
#[tokio::test]
async fn test_terminal_evaluation_failure_keeps_answer() {
    let (backend, session) = spawn_default_session();
    session.configure(web_dev(5)).await.unwrap();
    session.start().await.unwrap();
    session.set_answer("my answer").await.unwrap();

    backend.fail_next([BackendError::new(BackendErrorKind::Server, "500 internal")]);
    let err = session.submit_answer().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Generation {
            kind: BackendErrorKind::Server,
            ..
        }
    ));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.answer, "my answer");
    assert!(snapshot.history.is_empty());
    assert!(snapshot.last_error.is_some());
    // first question + one failed evaluation
    assert_eq!(backend.prompts().len(), 2);

    let recovered = session.submit_answer().await.unwrap();
    assert_eq!(recovered.history.len(), 1);
    assert!(recovered.last_error.is_none());
}

/// Two transient failures are absorbed by the retry schedule and announced
/// as `retry` events.
#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_on_start() {
    let backend = ScriptedBackend::failing_first([
        BackendError::unavailable("503 overloaded"),
        BackendError::unavailable("503 overloaded"),
    ]);
    let session = spawn_session(backend.clone(), Arc::new(MemoryStore::new()));
    let mut events = session.subscribe();
    session.configure(web_dev(5)).await.unwrap();

    let started = tokio::time::Instant::now();
    let snapshot = session.start().await.unwrap();

    assert_eq!(snapshot.current_question, "Question 1?");
    assert_eq!(backend.prompts().len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(3000));

    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Retry(retry) = event {
            delays.push(retry.delay_ms);
        }
    }
    assert_eq!(delays, vec![1000, 2000]);
}

/// An exhausted start leaves the session configured but not started.
#[tokio::test(start_paused = true)]
async fn test_exhausted_start_can_be_retried() {
    let backend = ScriptedBackend::failing_first(
        std::iter::repeat_with(|| BackendError::unavailable("503 overloaded")).take(3),
    );
    let session = spawn_session(backend, Arc::new(MemoryStore::new()));
    session.configure(web_dev(5)).await.unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, EngineError::GenerationExhausted { attempts: 3, .. }));
    assert_eq!(session.snapshot().status, SessionStatus::Unconfigured);

    let snapshot = session.start().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Active);
}

// ============================================================================
// Countdown
// ============================================================================

/// Time running out with a typed answer records exactly that answer and ends.
#[tokio::test(start_paused = true)]
async fn test_countdown_evaluates_pending_answer() {
    let (_backend, session) = spawn_default_session();
    session.configure(web_dev(2)).await.unwrap();
    session.start().await.unwrap();

    session.set_answer("answered in time").await.unwrap();
    session.submit_answer().await.unwrap();
    session.set_answer("typed but not submitted").await.unwrap();

    let ended = session.wait_until_ended().await.unwrap();

    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.remaining_seconds, 0);
    let answers: Vec<_> = ended.history.iter().map(|t| t.answer.as_str()).collect();
    assert_eq!(answers, ["answered in time", "typed but not submitted"]);
}

/// Once ended, nothing changes the history.
#[tokio::test(start_paused = true)]
async fn test_ended_session_is_terminal() {
    let (_backend, session) = spawn_default_session();
    session.configure(web_dev(1)).await.unwrap();
    session.start().await.unwrap();

    let ended = session.wait_until_ended().await.unwrap();
    assert!(ended.history.is_empty());

    assert!(!session.set_answer("late").await.unwrap());
    assert!(session.submit_answer().await.is_err());
    let again = session.end().await.unwrap();
    assert_eq!(again.status, SessionStatus::Ended);
    assert!(again.history.is_empty());
}
