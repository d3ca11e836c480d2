//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use interview_engine::{
    BackendError, GenerativeBackend, InterviewStore, MemoryStore, ResilientClient, SessionActor,
    SessionHandle, UserId,
};

/// Prefix of every evaluation prompt.
pub const EVALUATION_PREFIX: &str = "You are an expert technical interviewer";

/// Deterministic backend: numbered questions, fixed `7/10` feedback, and an
/// optional queue of failures served before any success.
#[derive(Default)]
pub struct ScriptedBackend {
    failures: Mutex<VecDeque<BackendError>>,
    prompts: Mutex<Vec<String>>,
    questions: Mutex<u32>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_first(failures: impl IntoIterator<Item = BackendError>) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Queues failures for the next calls.
    pub fn fail_next(&self, failures: impl IntoIterator<Item = BackendError>) {
        self.failures.lock().unwrap().extend(failures);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        if prompt.starts_with(EVALUATION_PREFIX) {
            return Ok("Good answer with room to go deeper. 7/10".to_string());
        }

        let mut questions = self.questions.lock().unwrap();
        *questions += 1;
        Ok(format!("Question {}?", *questions))
    }
}

/// Spawns a session actor over `backend` and `store`.
pub fn spawn_session(backend: Arc<ScriptedBackend>, store: Arc<dyn InterviewStore>) -> SessionHandle {
    SessionActor::new(
        ResilientClient::new(backend),
        store,
        UserId::new("integration-user"),
    )
    .spawn()
}

/// Spawns a session with a fresh backend and in-memory store.
pub fn spawn_default_session() -> (Arc<ScriptedBackend>, SessionHandle) {
    let backend = ScriptedBackend::new();
    let session = spawn_session(backend.clone(), Arc::new(MemoryStore::new()));
    (backend, session)
}
