// Interactive id submission.
//
// The chat front-end used to block on "wait for the next DM" with a
// 60 second timeout. Here that loop is an explicit state machine driven
// by message events; the suspension point is AwaitingSubmission and
// cancellation is the transition to TimedOut.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{RegistryError, SessionError};
use crate::identity::models::ExternalAccountId;
use crate::identity::registry::IdentityRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    /// First-time `set`
    Register,
    /// `edit` of an existing id
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingSubmission { deadline: DateTime<Utc> },
    Validating { candidate: ExternalAccountId },
    Complete { external_account_id: ExternalAccountId },
    TimedOut,
}

/// What the front-end should tell the actor after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionReply {
    Prompt,
    InvalidId,
    IdInUse,
    Saved,
    Updated,
    TookTooLong,
}

impl SessionReply {
    pub fn message(&self, kind: SubmissionKind) -> &'static str {
        match (self, kind) {
            (SessionReply::Prompt, SubmissionKind::Register) => {
                "Please provide your EPIC Account ID within 60 seconds:"
            }
            (SessionReply::Prompt, SubmissionKind::Edit) => {
                "Please provide your new EPIC Account ID within 60 seconds:"
            }
            (SessionReply::InvalidId, _) => {
                "The provided EPIC Account ID is invalid. Please ensure it is a 32 character alphanumeric string."
            }
            (SessionReply::IdInUse, _) => {
                "The provided EPIC Account ID is already in use. Please provide a different ID."
            }
            (SessionReply::Saved, _) => "Thank you! Your EPIC Account ID has been saved.",
            (SessionReply::Updated, _) => "Thank you! Your EPIC Account ID has been updated.",
            (SessionReply::TookTooLong, _) => "You took too long to respond. Please try again.",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionReply::Saved | SessionReply::Updated | SessionReply::TookTooLong
        )
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionSession {
    kind: SubmissionKind,
    timeout: Duration,
    state: SessionState,
}

impl SubmissionSession {
    pub fn new(kind: SubmissionKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            state: SessionState::Idle,
        }
    }

    pub fn kind(&self) -> SubmissionKind {
        self.kind
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            SessionState::Complete { .. } | SessionState::TimedOut
        )
    }

    /// Idle -> AwaitingSubmission
    pub fn start(&mut self, now: DateTime<Utc>) -> SessionReply {
        self.await_next(now);
        SessionReply::Prompt
    }

    /// Feed one message. A valid id moves the session to Validating and is
    /// handed back so the caller can try it against the registry.
    pub fn receive(
        &mut self,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ExternalAccountId, SessionReply> {
        match self.state {
            SessionState::AwaitingSubmission { deadline } if now > deadline => {
                self.state = SessionState::TimedOut;
                Err(SessionReply::TookTooLong)
            }
            SessionState::AwaitingSubmission { .. } => match ExternalAccountId::parse(content) {
                Ok(candidate) => {
                    self.state = SessionState::Validating {
                        candidate: candidate.clone(),
                    };
                    Ok(candidate)
                }
                Err(_) => {
                    self.await_next(now);
                    Err(SessionReply::InvalidId)
                }
            },
            SessionState::TimedOut => Err(SessionReply::TookTooLong),
            _ => Err(SessionReply::Prompt),
        }
    }

    /// Apply the registry's verdict on the candidate from `receive`
    pub fn resolve(
        &mut self,
        verdict: Result<(), RegistryError>,
        now: DateTime<Utc>,
    ) -> Result<SessionReply, RegistryError> {
        let candidate = match &self.state {
            SessionState::Validating { candidate } => candidate.clone(),
            _ => return Ok(SessionReply::Prompt),
        };

        match verdict {
            Ok(()) => {
                self.state = SessionState::Complete {
                    external_account_id: candidate,
                };
                Ok(match self.kind {
                    SubmissionKind::Register => SessionReply::Saved,
                    SubmissionKind::Edit => SessionReply::Updated,
                })
            }
            Err(RegistryError::DuplicateIdentity(_)) => {
                self.await_next(now);
                Ok(SessionReply::IdInUse)
            }
            Err(other) => {
                self.await_next(now);
                Err(other)
            }
        }
    }

    /// AwaitingSubmission -> TimedOut once the deadline has passed
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if let SessionState::AwaitingSubmission { deadline } = self.state {
            if now > deadline {
                self.state = SessionState::TimedOut;
                return true;
            }
        }
        false
    }

    // Each prompt gets its own full timeout window
    fn await_next(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::AwaitingSubmission {
            deadline: now + self.timeout,
        };
    }
}

/// Submission sessions keyed by actor id
pub struct SessionManager {
    timeout: Duration,
    sessions: Mutex<HashMap<String, SubmissionSession>>,
}

impl SessionManager {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            timeout: Duration::from_std(timeout).unwrap_or_else(|_| Duration::seconds(60)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or restart) a submission for `actor`.
    /// Register needs no existing id, Edit needs one.
    pub async fn start(
        &self,
        actor: &str,
        kind: SubmissionKind,
        registry: &IdentityRegistry,
        now: DateTime<Utc>,
    ) -> Result<SessionReply, RegistryError> {
        let registered = registry.is_registered(actor).await;
        match kind {
            SubmissionKind::Register if registered => {
                return Err(RegistryError::AlreadyRegistered(actor.to_string()))
            }
            SubmissionKind::Edit if !registered => {
                return Err(RegistryError::NotFound(actor.to_string()))
            }
            _ => {}
        }

        let mut session = SubmissionSession::new(kind, self.timeout);
        let reply = session.start(now);
        self.sessions.lock().insert(actor.to_string(), session);

        info!("Submission session ({:?}) opened for {}", kind, actor);
        Ok(reply)
    }

    /// Deliver one message from `actor` and drive the session
    pub async fn submit(
        &self,
        actor: &str,
        content: &str,
        registry: &IdentityRegistry,
        now: DateTime<Utc>,
    ) -> Result<(SubmissionKind, SessionReply), SubmissionFailure> {
        let mut session = self
            .sessions
            .lock()
            .remove(actor)
            .ok_or(SubmissionFailure::Session(SessionError::NoSession))?;
        let kind = session.kind();

        let candidate = match session.receive(content.trim(), now) {
            Ok(candidate) => candidate,
            Err(reply) => {
                self.put_back(actor, session);
                return Ok((kind, reply));
            }
        };

        let verdict = match kind {
            SubmissionKind::Register => registry.register(actor, &candidate).await,
            SubmissionKind::Edit => registry.update(actor, &candidate).await,
        };

        let outcome = session.resolve(verdict, now);
        self.put_back(actor, session);
        outcome
            .map(|reply| (kind, reply))
            .map_err(SubmissionFailure::Registry)
    }

    pub fn state_of(&self, actor: &str) -> Option<SessionState> {
        self.sessions.lock().get(actor).map(|s| s.state().clone())
    }

    /// Time out sessions past their deadline and forget finished ones
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock();
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.expire_if_due(now) {
                expired += 1;
            }
        }
        sessions.retain(|_, s| !s.is_finished());
        if expired > 0 {
            debug!("Expired {} submission sessions", expired);
        }
        expired
    }

    fn put_back(&self, actor: &str, session: SubmissionSession) {
        if !session.is_finished() {
            self.sessions.lock().insert(actor.to_string(), session);
        }
    }
}

/// Why a submitted message could not be processed
#[derive(Debug)]
pub enum SubmissionFailure {
    Session(SessionError),
    Registry(RegistryError),
}

impl From<SubmissionFailure> for crate::error::AppError {
    fn from(failure: SubmissionFailure) -> Self {
        match failure {
            SubmissionFailure::Session(e) => e.into(),
            SubmissionFailure::Registry(e) => e.into(),
        }
    }
}
