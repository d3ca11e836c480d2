//! Session actor: the single writer of interview state.
//!
//! [`SessionActor::spawn`] moves an [`InterviewSession`] onto its own task.
//! Commands from any number of [`SessionHandle`]s, backend call results and
//! the one-second countdown all flow through one `select!` loop, so they can
//! never interleave. Backend calls run on spawned tasks and report back by
//! ticket; the state machine discards results that arrive too late.
//!
//! After every step the actor publishes a fresh [`SessionSnapshot`] on a
//! `watch` channel and broadcasts the corresponding [`SessionEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::InterviewConfig;
use crate::error::{EngineError, Result};
use crate::generation::{ResilientClient, RetryAttempt};
use crate::session::{
    InterviewSession, PendingCall, Resolution, SessionSnapshot, SessionStatus, TickOutcome,
};
use crate::store::{InterviewRecord, InterviewStore, UserId};
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Countdown resolution.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Command {
    Configure {
        config: InterviewConfig,
        reply: Reply<Result<SessionSnapshot>>,
    },
    Start {
        reply: Reply<Result<SessionSnapshot>>,
    },
    SetAnswer {
        text: String,
        reply: Reply<bool>,
    },
    Submit {
        reply: Reply<Result<SessionSnapshot>>,
    },
    End {
        reply: Reply<Result<SessionSnapshot>>,
    },
}

#[derive(Debug)]
struct CallOutcome {
    ticket: u64,
    result: Result<String>,
}

// ============================================================================
// SessionActor
// ============================================================================

/// Owns one interview and serializes everything that touches it.
pub struct SessionActor {
    session: InterviewSession,
    client: ResilientClient,
    store: Arc<dyn InterviewStore>,
    user_id: UserId,
    events: EventBroadcaster,
}

impl std::fmt::Debug for SessionActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionActor")
            .field("session_id", &self.session.session_id())
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SessionActor {
    /// Creates an actor for a new, unconfigured interview.
    #[must_use]
    pub fn new(client: ResilientClient, store: Arc<dyn InterviewStore>, user_id: UserId) -> Self {
        Self {
            session: InterviewSession::new(),
            client,
            store,
            user_id,
            events: EventBroadcaster::default(),
        }
    }

    /// Broadcasts events through `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// Starts the actor task and returns a handle to it.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(self) -> SessionHandle {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (results_tx, results) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(self.session.snapshot());

        let retry_events = self.events.clone();
        let client = self
            .client
            .with_observer(Arc::new(move |retry: &RetryAttempt| {
                retry_events.send(SessionEvent::Retry(retry.clone()));
            }));

        let handle = SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            events: self.events.clone(),
        };

        let runner = Runner {
            session: self.session,
            client,
            store: self.store,
            user_id: self.user_id,
            events: self.events,
            snapshot: snapshot_tx,
            commands,
            results_tx,
            results,
            waiter: None,
        };
        tokio::spawn(runner.run());

        handle
    }
}

// ============================================================================
// Runner
// ============================================================================

struct Runner {
    session: InterviewSession,
    client: ResilientClient,
    store: Arc<dyn InterviewStore>,
    user_id: UserId,
    events: EventBroadcaster,
    snapshot: watch::Sender<SessionSnapshot>,
    commands: mpsc::Receiver<Command>,
    results_tx: mpsc::UnboundedSender<CallOutcome>,
    results: mpsc::UnboundedReceiver<CallOutcome>,
    /// Caller of `start`/`submit` waiting for the session to settle.
    waiter: Option<Reply<Result<SessionSnapshot>>>,
}

impl Runner {
    async fn run(mut self) {
        let session_id = self.session.session_id();
        info!(%session_id, user_id = %self.user_id, "Session actor started");

        let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                Some(outcome) = self.results.recv() => {
                    if self.handle_outcome(outcome).await {
                        // The countdown starts with the first question.
                        ticker.reset();
                    }
                }
                _ = ticker.tick() => self.handle_tick(),
            }
        }

        info!(%session_id, "Session actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let before = self.session.status();

        match command {
            Command::Configure { config, reply } => {
                let result = self.session.configure(config).map(|()| self.session.snapshot());
                self.report(&result);
                self.publish(before, Vec::new());
                send(reply, result);
            }
            Command::Start { reply } => match self.session.start() {
                Ok(call) => {
                    self.spawn_call(call);
                    self.park(reply);
                    self.publish(before, Vec::new());
                }
                Err(e) => {
                    self.report_error(&e);
                    send(reply, Err(e));
                }
            },
            Command::SetAnswer { text, reply } => {
                let applied = self.session.set_answer(text);
                if applied {
                    self.publish(before, Vec::new());
                }
                send(reply, applied);
            }
            Command::Submit { reply } => match self.session.submit_answer() {
                Ok(Some(call)) => {
                    self.spawn_call(call);
                    self.park(reply);
                    self.publish(before, Vec::new());
                }
                Ok(None) => send(reply, Ok(self.session.snapshot())),
                Err(e) => {
                    self.report_error(&e);
                    send(reply, Err(e));
                }
            },
            Command::End { reply } => match self.session.end() {
                Ok(committed) => {
                    let mut events = Vec::new();
                    if let Some(turn) = committed {
                        self.persist_turns(turn.score).await;
                        events.push(SessionEvent::turn_completed(
                            self.session.history().len(),
                            turn,
                        ));
                    }
                    self.publish(before, events);
                    self.release(Ok(self.session.snapshot()));
                    send(reply, Ok(self.session.snapshot()));
                }
                Err(e) => send(reply, Err(e)),
            },
        }
    }

    /// Applies a backend result. Returns `true` when the interview just began.
    async fn handle_outcome(&mut self, outcome: CallOutcome) -> bool {
        let before = self.session.status();
        let mut events = Vec::new();
        let mut started = false;

        match self.session.resolve(outcome.ticket, outcome.result) {
            Resolution::Discarded => {}
            Resolution::Started { question } => {
                started = true;
                self.persist_created().await;
                events.push(SessionEvent::question(1, question));
            }
            Resolution::Evaluated { call, score } => {
                debug!(ticket = call.ticket, score, "Requesting follow-up question");
                self.spawn_call(call);
            }
            Resolution::TurnCompleted { turn, question } => {
                self.persist_turns(turn.score).await;
                let number = self.session.history().len();
                events.push(SessionEvent::turn_completed(number, turn));
                events.push(SessionEvent::question(number + 1, question));
            }
            Resolution::Ended { turn, error } => {
                if let Some(turn) = turn {
                    self.persist_turns(turn.score).await;
                    events.push(SessionEvent::turn_completed(
                        self.session.history().len(),
                        turn,
                    ));
                }
                if let Some(error) = error {
                    events.push(SessionEvent::error(error.user_message()));
                }
            }
            Resolution::Failed { error } => {
                events.push(SessionEvent::error(error.user_message()));
                self.publish(before, events);
                self.release(Err(error));
                return false;
            }
        }

        self.publish(before, events);
        if self.session.in_flight_ticket().is_none() {
            self.release(Ok(self.session.snapshot()));
        }
        started
    }

    fn handle_tick(&mut self) {
        let before = self.session.status();

        let events = match self.session.tick() {
            TickOutcome::Idle => return,
            TickOutcome::Running { remaining } => vec![SessionEvent::tick(remaining)],
            TickOutcome::ImplicitSubmission(call) => {
                self.spawn_call(call);
                vec![SessionEvent::tick(0)]
            }
            TickOutcome::Ended => vec![SessionEvent::tick(0)],
        };

        self.publish(before, events);
    }

    fn spawn_call(&self, call: PendingCall) {
        let client = self.client.clone();
        let results = self.results_tx.clone();
        debug!(ticket = call.ticket, phase = ?call.phase, "Dispatching backend call");

        tokio::spawn(async move {
            let result = client.call(&call.prompt).await;
            if results
                .send(CallOutcome {
                    ticket: call.ticket,
                    result,
                })
                .is_err()
            {
                debug!(ticket = call.ticket, "Session gone before call finished");
            }
        });
    }

    fn park(&mut self, reply: Reply<Result<SessionSnapshot>>) {
        if let Some(previous) = self.waiter.replace(reply) {
            send(previous, Ok(self.session.snapshot()));
        }
    }

    fn release(&mut self, result: Result<SessionSnapshot>) {
        if let Some(waiter) = self.waiter.take() {
            send(waiter, result);
        }
    }

    /// Updates the snapshot, then broadcasts the status change (if any),
    /// `events`, and `session_ended` when the session just finished.
    fn publish(&self, before: SessionStatus, events: Vec<SessionEvent>) {
        let snapshot = self.session.snapshot();
        let after = snapshot.status;

        if before != after {
            self.events.send(SessionEvent::status_changed(before, after));
        }
        for event in events {
            self.events.send(event);
        }
        if before != after && after.is_terminal() {
            info!(
                session_id = %snapshot.session_id,
                turns = snapshot.history.len(),
                average_score = ?snapshot.average_score,
                "Interview finished"
            );
            self.events.send(SessionEvent::session_ended(&snapshot));
        }

        self.snapshot.send_replace(snapshot);
    }

    fn report<T>(&self, result: &Result<T>) {
        if let Err(e) = result {
            self.report_error(e);
        }
    }

    fn report_error(&self, error: &EngineError) {
        debug!(error = %error, "Command rejected");
        self.events.send(SessionEvent::error(error.user_message()));
    }

    async fn persist_created(&self) {
        let Some(config) = self.session.config() else {
            return;
        };
        let record = InterviewRecord::new(self.session.session_id(), self.user_id.clone(), config);
        if let Err(e) = self.store.create_interview(record).await {
            warn!(session_id = %self.session.session_id(), error = %e, "Failed to create interview record");
        }
    }

    async fn persist_turns(&self, score: u8) {
        let session_id = self.session.session_id();
        if let Err(e) = self
            .store
            .update_interview(session_id, score, self.session.history())
            .await
        {
            warn!(%session_id, error = %e, "Failed to update interview record");
        }
    }
}

fn send<T>(reply: Reply<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Caller went away before the reply");
    }
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Cloneable handle to a running [`SessionActor`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: EventBroadcaster,
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        response.await.map_err(|_| EngineError::SessionClosed)
    }

    /// Sets difficulty, domain and duration.
    pub async fn configure(&self, config: InterviewConfig) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Configure { config, reply })
            .await?
    }

    /// Starts the interview and waits for the first question.
    ///
    /// On failure the session is back in `Unconfigured` with its
    /// configuration intact.
    pub async fn start(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Replaces the unsubmitted answer. Returns `false` outside `Active`.
    pub async fn set_answer(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| Command::SetAnswer { text, reply })
            .await
    }

    /// Submits the current answer and waits until the turn is recorded and
    /// the next question is on screen.
    ///
    /// While another evaluation is in flight this returns the current
    /// snapshot without doing anything.
    pub async fn submit_answer(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    /// Ends the interview.
    pub async fn end(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::End { reply }).await?
    }

    /// Returns the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Returns a receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Returns the broadcaster carrying this session's events.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Subscribes to this session's events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Waits until the session has ended.
    pub async fn wait_until_ended(&self) -> Result<SessionSnapshot> {
        let mut snapshots = self.snapshot.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| snapshot.status.is_terminal())
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        Ok(snapshot.clone())
    }
}
