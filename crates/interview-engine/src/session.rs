//! Interview session state machine.
//!
//! [`InterviewSession`] owns every field of one interview run and is the only
//! code that mutates them. It performs no I/O: operations that need the
//! generative backend return a [`PendingCall`], and the caller hands the
//! backend's answer back through [`InterviewSession::resolve`]. Each call
//! carries a ticket; a resolution whose ticket is no longer current is
//! discarded, which is how `end()` and countdown expiry cancel the effect of
//! in-flight requests.
//!
//! ```text
//! Unconfigured -> Starting -> Active <-> Evaluating -> Ended
//!                    |          |
//!                    |          +-> Ended (cancel / time-up with no answer)
//!                    +-> Unconfigured (first question failed)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::InterviewConfig;
use crate::context::{build_context, evaluation_prompt, parse_score, question_prompt};
use crate::error::{EngineError, Result};

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle status of an interview session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No interview has started yet; configuration may change.
    #[default]
    Unconfigured,
    /// The first question is being generated.
    Starting,
    /// A question is on screen and the candidate may answer.
    Active,
    /// An answer is being evaluated, or the follow-up question generated.
    Evaluating,
    /// The interview is over.
    Ended,
}

impl SessionStatus {
    /// Returns `true` if this status is terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use interview_engine::SessionStatus;
    ///
    /// assert!(SessionStatus::Ended.is_terminal());
    /// assert!(!SessionStatus::Evaluating.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Returns `true` while the countdown is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Active | Self::Evaluating)
    }

    /// Returns the lower-case name used in logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Evaluating => "evaluating",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Turn
// ============================================================================

/// One question, answer and feedback exchange.
///
/// Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// The question that was asked.
    pub question: String,
    /// The candidate's answer.
    pub answer: String,
    /// Evaluation text returned by the backend.
    pub feedback: String,
    /// Score out of 10 extracted from the feedback.
    pub score: u8,
    /// When the answer was evaluated.
    pub answered_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a turn, scoring it from the feedback text.
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        feedback: impl Into<String>,
    ) -> Self {
        let feedback = feedback.into();
        Self {
            question: question.into(),
            answer: answer.into(),
            score: parse_score(&feedback),
            feedback,
            answered_at: Utc::now(),
        }
    }
}

// ============================================================================
// Backend calls
// ============================================================================

/// What a backend call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Generating the opening question.
    FirstQuestion,
    /// Evaluating the submitted answer.
    Evaluation,
    /// Generating the follow-up question after a successful evaluation.
    NextQuestion,
}

/// A backend call the session is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    /// Identifies the call; stale tickets are discarded on resolution.
    pub ticket: u64,
    /// Purpose of the call.
    pub phase: CallPhase,
    /// Prompt to send.
    pub prompt: String,
}

/// What happened when a call resolved.
#[derive(Debug)]
pub enum Resolution {
    /// The result belonged to a superseded call and was ignored.
    Discarded,
    /// The first question arrived; the interview is live.
    Started {
        /// The opening question.
        question: String,
    },
    /// The answer was evaluated; the follow-up question is needed next.
    Evaluated {
        /// The follow-up question request.
        call: PendingCall,
        /// Score of the staged turn.
        score: u8,
    },
    /// A turn was committed and a new question is on screen.
    TurnCompleted {
        /// The committed turn.
        turn: Turn,
        /// The new current question.
        question: String,
    },
    /// Time ran out while the call was in flight; the session has ended.
    Ended {
        /// The turn committed on the way out, if evaluation succeeded.
        turn: Option<Turn>,
        /// The call failure that ended the interview, if any.
        error: Option<EngineError>,
    },
    /// The call failed; the session fell back to its prior stable state.
    ///
    /// The banner now shows `error.user_message()`.
    Failed {
        /// The failure reported by the client.
        error: EngineError,
    },
}

/// Effect of one countdown tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The countdown is not running.
    Idle,
    /// One second elapsed.
    Running {
        /// Seconds left after this tick.
        remaining: u32,
    },
    /// Time ran out with a pending answer; it is being evaluated before the
    /// session ends.
    ImplicitSubmission(PendingCall),
    /// Time ran out with nothing to evaluate; the session has ended.
    Ended,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: u64,
    phase: CallPhase,
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Read-only, serializable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Unique id of this interview.
    pub session_id: Uuid,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Configuration, once set.
    pub config: Option<InterviewConfig>,
    /// The question currently on screen.
    pub current_question: String,
    /// 1-based number of the current question (0 before start).
    pub question_number: usize,
    /// Seconds left on the countdown.
    pub remaining_seconds: u32,
    /// Completed turns in order.
    pub history: Vec<Turn>,
    /// The unsubmitted answer.
    pub answer: String,
    /// Most recent error, cleared by the next successful transition.
    pub last_error: Option<String>,
    /// Mean score of completed turns.
    pub average_score: Option<f64>,
    /// When the first question arrived.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        InterviewSession::new().snapshot()
    }
}

// ============================================================================
// InterviewSession
// ============================================================================

/// State machine for one interview.
#[derive(Debug, Clone)]
pub struct InterviewSession {
    session_id: Uuid,
    status: SessionStatus,
    config: Option<InterviewConfig>,
    remaining_seconds: u32,
    current_question: String,
    history: Vec<Turn>,
    answer: String,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,

    next_ticket: u64,
    in_flight: Option<InFlight>,
    /// Answer text captured when evaluation began.
    submitted: Option<String>,
    /// Turn whose evaluation succeeded, awaiting the follow-up question.
    staged: Option<Turn>,
    /// Countdown hit zero during a call; end once it resolves.
    expire_on_resolve: bool,
}

impl Default for InterviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl InterviewSession {
    /// Creates an unconfigured session with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            status: SessionStatus::Unconfigured,
            config: None,
            remaining_seconds: 0,
            current_question: String::new(),
            history: Vec::new(),
            answer: String::new(),
            last_error: None,
            started_at: None,
            ended_at: None,
            next_ticket: 0,
            in_flight: None,
            submitted: None,
            staged: None,
            expire_on_resolve: false,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Returns the session id.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the configuration, if set.
    #[must_use]
    pub const fn config(&self) -> Option<&InterviewConfig> {
        self.config.as_ref()
    }

    /// Returns the seconds left on the countdown.
    #[must_use]
    pub const fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Returns the question currently on screen.
    #[must_use]
    pub fn current_question(&self) -> &str {
        &self.current_question
    }

    /// Returns the completed turns in order.
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Returns the unsubmitted answer.
    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Returns the banner message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the ticket of the call being waited on.
    #[must_use]
    pub fn in_flight_ticket(&self) -> Option<u64> {
        self.in_flight.map(|call| call.ticket)
    }

    /// Returns the mean score of completed turns.
    #[must_use]
    pub fn average_score(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let total: u32 = self.history.iter().map(|turn| u32::from(turn.score)).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(f64::from(total) / self.history.len() as f64)
    }

    /// Returns a serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let question_number = if self.current_question.is_empty() {
            0
        } else {
            self.history.len() + 1
        };

        SessionSnapshot {
            session_id: self.session_id,
            status: self.status,
            config: self.config.clone(),
            current_question: self.current_question.clone(),
            question_number,
            remaining_seconds: self.remaining_seconds,
            history: self.history.clone(),
            answer: self.answer.clone(),
            last_error: self.last_error.clone(),
            average_score: self.average_score(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Sets difficulty, domain and duration.
    ///
    /// Only allowed before the interview starts. An invalid configuration is
    /// rejected and the state is left untouched.
    pub fn configure(&mut self, config: InterviewConfig) -> Result<()> {
        if self.status != SessionStatus::Unconfigured {
            return Err(EngineError::invalid_transition(
                self.status,
                SessionStatus::Unconfigured,
            ));
        }
        config.validate()?;

        info!(
            session_id = %self.session_id,
            difficulty = %config.difficulty,
            domain = %config.domain,
            duration_minutes = config.duration_minutes,
            "Session configured"
        );
        self.config = Some(config);
        self.last_error = None;
        Ok(())
    }

    /// Begins the interview by requesting the first question.
    pub fn start(&mut self) -> Result<PendingCall> {
        if self.status != SessionStatus::Unconfigured {
            return Err(EngineError::invalid_transition(
                self.status,
                SessionStatus::Starting,
            ));
        }
        let Some(config) = &self.config else {
            return Err(EngineError::validation(
                "Please select difficulty level, duration, and domain",
                "Configure the session before starting it",
            ));
        };

        let prompt = question_prompt(config.difficulty, &config.domain, "");
        self.transition(SessionStatus::Starting);
        Ok(self.issue(CallPhase::FirstQuestion, prompt))
    }

    /// Replaces the unsubmitted answer.
    ///
    /// Voice transcripts and typed input both overwrite; nothing is appended.
    /// Returns `false` (and changes nothing) outside `Active`.
    pub fn set_answer(&mut self, text: impl Into<String>) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.answer = text.into();
        true
    }

    /// Submits the current answer for evaluation.
    ///
    /// Returns `Ok(None)` while an evaluation is already in flight.
    pub fn submit_answer(&mut self) -> Result<Option<PendingCall>> {
        match self.status {
            SessionStatus::Evaluating => {
                debug!(session_id = %self.session_id, "Ignoring submission during evaluation");
                return Ok(None);
            }
            SessionStatus::Active => {}
            other => {
                return Err(EngineError::invalid_transition(
                    other,
                    SessionStatus::Evaluating,
                ))
            }
        }

        if self.answer.trim().is_empty() {
            return Err(EngineError::validation(
                "Please provide an answer before submitting",
                "Type or speak an answer first",
            ));
        }
        if self.remaining_seconds == 0 {
            return Err(EngineError::validation(
                "Time is up",
                "Start a new interview to keep practicing",
            ));
        }

        Ok(Some(self.begin_evaluation()))
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.status.is_running() {
            return TickOutcome::Idle;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Running {
                remaining: self.remaining_seconds,
            };
        }

        if self.status == SessionStatus::Evaluating {
            if !self.expire_on_resolve {
                info!(session_id = %self.session_id, "Time is up, ending after the pending call");
            }
            self.expire_on_resolve = true;
            return TickOutcome::Running { remaining: 0 };
        }

        if self.answer.trim().is_empty() {
            info!(session_id = %self.session_id, "Time is up");
            self.finish();
            return TickOutcome::Ended;
        }

        info!(session_id = %self.session_id, "Time is up, evaluating pending answer");
        self.expire_on_resolve = true;
        TickOutcome::ImplicitSubmission(self.begin_evaluation())
    }

    /// Ends the interview immediately.
    ///
    /// Any call still in flight is abandoned. A turn whose evaluation had
    /// already succeeded is committed and returned. Ending an ended session
    /// does nothing.
    pub fn end(&mut self) -> Result<Option<Turn>> {
        match self.status {
            SessionStatus::Active | SessionStatus::Evaluating => {}
            SessionStatus::Ended => return Ok(None),
            other => {
                return Err(EngineError::invalid_transition(
                    other,
                    SessionStatus::Ended,
                ))
            }
        }

        let committed = self.staged.take().map(|turn| self.commit(turn));
        info!(session_id = %self.session_id, turns = self.history.len(), "Interview ended by candidate");
        self.finish();
        Ok(committed)
    }

    /// Applies the outcome of a backend call.
    pub fn resolve(&mut self, ticket: u64, result: Result<String>) -> Resolution {
        let Some(call) = self.in_flight.filter(|call| call.ticket == ticket) else {
            debug!(session_id = %self.session_id, ticket, "Discarding stale call result");
            return Resolution::Discarded;
        };
        self.in_flight = None;

        match (call.phase, result) {
            (CallPhase::FirstQuestion, Ok(question)) => self.on_started(question),
            (CallPhase::Evaluation, Ok(feedback)) => self.on_evaluated(feedback),
            (CallPhase::NextQuestion, Ok(question)) => self.on_next_question(question),
            (phase, Err(err)) => self.on_failed(phase, err),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn transition(&mut self, to: SessionStatus) {
        if self.status != to {
            info!(session_id = %self.session_id, from = %self.status, to = %to, "Session transition");
            self.status = to;
        }
    }

    fn issue(&mut self, phase: CallPhase, prompt: String) -> PendingCall {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight = Some(InFlight { ticket, phase });
        debug!(session_id = %self.session_id, ticket, ?phase, "Issuing backend call");
        PendingCall {
            ticket,
            phase,
            prompt,
        }
    }

    fn begin_evaluation(&mut self) -> PendingCall {
        let answer = self.answer.trim().to_string();
        let prompt = evaluation_prompt(
            &self.current_question,
            &answer,
            &build_context(&self.history),
        );
        self.submitted = Some(answer);
        self.transition(SessionStatus::Evaluating);
        self.issue(CallPhase::Evaluation, prompt)
    }

    fn commit(&mut self, turn: Turn) -> Turn {
        self.history.push(turn.clone());
        self.answer.clear();
        turn
    }

    fn finish(&mut self) {
        self.in_flight = None;
        self.submitted = None;
        self.staged = None;
        self.expire_on_resolve = false;
        self.ended_at = Some(Utc::now());
        self.transition(SessionStatus::Ended);
    }

    fn on_started(&mut self, question: String) -> Resolution {
        let Some(config) = &self.config else {
            return self.on_failed(
                CallPhase::FirstQuestion,
                EngineError::validation("session lost its configuration", "Configure again"),
            );
        };

        self.remaining_seconds = config.duration_seconds();
        self.history.clear();
        self.answer.clear();
        self.current_question = question.trim().to_string();
        self.last_error = None;
        self.started_at = Some(Utc::now());
        self.transition(SessionStatus::Active);

        Resolution::Started {
            question: self.current_question.clone(),
        }
    }

    fn on_evaluated(&mut self, feedback: String) -> Resolution {
        let answer = self.submitted.take().unwrap_or_default();
        let turn = Turn::new(self.current_question.clone(), answer, feedback.trim());
        let score = turn.score;
        debug!(session_id = %self.session_id, score, "Answer evaluated");

        if self.expire_on_resolve {
            let turn = self.commit(turn);
            self.finish();
            return Resolution::Ended {
                turn: Some(turn),
                error: None,
            };
        }

        let Some(config) = &self.config else {
            return self.on_failed(
                CallPhase::Evaluation,
                EngineError::validation("session lost its configuration", "Configure again"),
            );
        };

        let mut context_turns = self.history.clone();
        context_turns.push(turn.clone());
        let prompt = question_prompt(
            config.difficulty,
            &config.domain,
            &build_context(&context_turns),
        );

        self.staged = Some(turn);
        let call = self.issue(CallPhase::NextQuestion, prompt);
        Resolution::Evaluated { call, score }
    }

    fn on_next_question(&mut self, question: String) -> Resolution {
        let Some(turn) = self.staged.take() else {
            warn!(session_id = %self.session_id, "Follow-up question arrived without a staged turn");
            self.transition(SessionStatus::Active);
            return Resolution::Discarded;
        };
        let turn = self.commit(turn);

        if self.expire_on_resolve {
            self.finish();
            return Resolution::Ended {
                turn: Some(turn),
                error: None,
            };
        }

        self.current_question = question.trim().to_string();
        self.last_error = None;
        self.transition(SessionStatus::Active);

        Resolution::TurnCompleted {
            turn,
            question: self.current_question.clone(),
        }
    }

    fn on_failed(&mut self, phase: CallPhase, error: EngineError) -> Resolution {
        warn!(session_id = %self.session_id, ?phase, error = %error, "Backend call failed");

        if phase == CallPhase::FirstQuestion {
            self.last_error = Some(error.user_message());
            self.transition(SessionStatus::Unconfigured);
            return Resolution::Failed { error };
        }

        self.submitted = None;
        if self.expire_on_resolve {
            // Evaluation already succeeded if a turn is staged.
            let turn = self.staged.take().map(|turn| self.commit(turn));
            self.last_error = Some(error.user_message());
            self.finish();
            return Resolution::Ended {
                turn,
                error: Some(error),
            };
        }

        self.staged = None;
        self.last_error = Some(error.user_message());
        self.transition(SessionStatus::Active);
        Resolution::Failed { error }
    }
}

// ============================================================================
// Tests
// ============================================================================
