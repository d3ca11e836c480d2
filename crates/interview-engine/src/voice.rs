//! Voice input.
//!
//! Speech recognition lives outside the engine. Whatever produces
//! transcripts implements [`TranscriptSource`]; [`forward_transcripts`] feeds
//! each one into the session as the new answer. A transcript replaces the
//! answer buffer, it is never appended.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::actor::SessionHandle;
use crate::error::EngineError;

/// Produces transcribed speech.
#[async_trait]
pub trait TranscriptSource: Send {
    /// Waits for the next transcript. `None` once the source is exhausted.
    async fn next_transcript(&mut self) -> Option<String>;
}

#[async_trait]
impl TranscriptSource for mpsc::Receiver<String> {
    async fn next_transcript(&mut self) -> Option<String> {
        self.recv().await
    }
}

/// Pumps transcripts into the session until the source ends or the session
/// shuts down.
///
/// Returns how many transcripts were applied. Transcripts arriving while the
/// session is not `Active` are ignored.
pub async fn forward_transcripts<S>(mut source: S, session: SessionHandle) -> usize
where
    S: TranscriptSource,
{
    let mut applied = 0;

    while let Some(transcript) = source.next_transcript().await {
        match session.set_answer(transcript).await {
            Ok(true) => applied += 1,
            Ok(false) => trace!("Transcript ignored outside an active question"),
            Err(EngineError::SessionClosed) => break,
            Err(e) => debug!(error = %e, "Failed to apply transcript"),
        }
    }

    debug!(applied, "Transcript source finished");
    applied
}
