//! Stub collaborators shared by unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::generation::{BackendError, GenerativeBackend};
use crate::session::Turn;
use crate::store::{InterviewRecord, InterviewStore};

/// Answers question prompts with numbered questions and evaluation prompts
/// with a fixed 7/10 feedback.
#[derive(Debug, Default)]
pub struct StubBackend {
    delay: Duration,
    always_fail: bool,
    fail_evaluations: bool,
    calls: AtomicU32,
    questions: AtomicU32,
}

impl StubBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Every call fails with a transient 503.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            always_fail: true,
            ..Self::default()
        })
    }

    /// Questions succeed but every evaluation fails with a transient 503.
    pub fn failing_evaluations() -> Arc<Self> {
        Arc::new(Self {
            fail_evaluations: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for StubBackend {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.always_fail {
            return Err(BackendError::unavailable("503 model overloaded"));
        }
        if prompt.starts_with("You are an expert technical interviewer") {
            if self.fail_evaluations {
                return Err(BackendError::unavailable("503 model overloaded"));
            }
            return Ok("Clear and accurate. 7/10".to_string());
        }
        let n = self.questions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Question {n}?"))
    }
}

/// Rejects every write.
#[derive(Debug)]
pub struct FailingStore;

#[async_trait]
impl InterviewStore for FailingStore {
    async fn create_interview(&self, _record: InterviewRecord) -> Result<()> {
        Err(EngineError::persistence("disk full"))
    }

    async fn update_interview(&self, _session_id: Uuid, _score: u8, _history: &[Turn]) -> Result<()> {
        Err(EngineError::persistence("disk full"))
    }

    async fn load_interview(&self, _session_id: Uuid) -> Result<Option<InterviewRecord>> {
        Ok(None)
    }
}
