//! Interview record persistence.
//!
//! The session writes one [`InterviewRecord`] per interview: created when the
//! first question arrives, then overwritten with the latest score and the
//! complete history after every turn. Updates replace the whole history, so
//! repeating one is harmless.
//!
//! Write failures never roll back the live session; the actor logs them and
//! carries on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::{Difficulty, InterviewConfig};
use crate::error::{EngineError, Result};
use crate::session::Turn;

/// Identity of the candidate, supplied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps an externally authenticated user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new("anonymous")
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable record of one interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    /// Session the record belongs to.
    pub session_id: Uuid,
    /// Candidate who took the interview.
    pub user_id: UserId,
    /// Configured difficulty.
    pub difficulty: Difficulty,
    /// Configured duration in minutes.
    pub duration_minutes: u32,
    /// Configured domain.
    pub domain: String,
    /// Score of the most recent turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    /// Every completed turn, in order.
    #[serde(default)]
    pub feedback: Vec<Turn>,
    /// When the interview started.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl InterviewRecord {
    /// Creates an empty record for a freshly started session.
    #[must_use]
    pub fn new(session_id: Uuid, user_id: UserId, config: &InterviewConfig) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            difficulty: config.difficulty,
            duration_minutes: config.duration_minutes,
            domain: config.domain.clone(),
            score: None,
            feedback: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_update(&mut self, score: u8, history: &[Turn]) {
        self.score = Some(score);
        self.feedback = history.to_vec();
        self.updated_at = Utc::now();
    }
}

/// Where interview records are written.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Creates the record for a new interview.
    async fn create_interview(&self, record: InterviewRecord) -> Result<()>;

    /// Overwrites score and history of an existing record.
    async fn update_interview(&self, session_id: Uuid, score: u8, history: &[Turn]) -> Result<()>;

    /// Loads a record, if it exists.
    async fn load_interview(&self, session_id: Uuid) -> Result<Option<InterviewRecord>>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Keeps records in memory. Used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, InterviewRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn create_interview(&self, record: InterviewRecord) -> Result<()> {
        self.records.write().await.insert(record.session_id, record);
        Ok(())
    }

    async fn update_interview(&self, session_id: Uuid, score: u8, history: &[Turn]) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&session_id)
            .ok_or_else(|| EngineError::persistence(format!("no interview record {session_id}")))?;
        record.apply_update(score, history);
        Ok(())
    }

    async fn load_interview(&self, session_id: Uuid) -> Result<Option<InterviewRecord>> {
        Ok(self.records.read().await.get(&session_id).cloned())
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Writes one pretty-printed JSON document per interview into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path of a record.
    #[must_use]
    pub fn record_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    async fn write(&self, record: &InterviewRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::persistence(format!("{}: {e}", self.dir.display())))?;

        let path = self.record_path(record.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::persistence(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::persistence(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), turns = record.feedback.len(), "Wrote interview record");
        Ok(())
    }
}

#[async_trait]
impl InterviewStore for JsonFileStore {
    async fn create_interview(&self, record: InterviewRecord) -> Result<()> {
        self.write(&record).await
    }

    async fn update_interview(&self, session_id: Uuid, score: u8, history: &[Turn]) -> Result<()> {
        let mut record = self
            .load_interview(session_id)
            .await?
            .ok_or_else(|| EngineError::persistence(format!("no interview record {session_id}")))?;
        record.apply_update(score, history);
        self.write(&record).await
    }

    async fn load_interview(&self, session_id: Uuid) -> Result<Option<InterviewRecord>> {
        let path = self.record_path(session_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::persistence(format!("{}: {e}", path.display()))),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
