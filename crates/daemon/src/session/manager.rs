//! Active channel sessions.
//!
//! Every open command channel is tracked here from the moment it is
//! authorized until its connection closes. Removal from the set is the only
//! way a session ends; terminating a session only signals its connection
//! task, which then removes itself.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier of a channel session.
pub type SessionId = Uuid;

/// Lifecycle of a channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Transport accepted, nothing checked yet.
    Connecting,
    /// Checking the device against the registry.
    Authorizing,
    /// Authorized and processing commands.
    Open,
    /// Terminal.
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Authorizing)
                | (SessionState::Authorizing, SessionState::Open)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Authorizing, SessionState::Closed)
                | (SessionState::Open, SessionState::Closed)
        )
    }
}

/// Errors raised by session bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Illegal state machine transition.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Only open sessions may join the active set.
    #[error("session {0} is not open")]
    NotOpen(SessionId),
}

/// Per-connection state, owned by the connection task.
///
/// A session is bound to one device for its whole lifetime.
#[derive(Debug)]
pub struct ChannelSession {
    id: SessionId,
    device_id: String,
    state: SessionState,
    connected_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ChannelSession {
    /// Creates a session in the `Connecting` state.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            state: SessionState::Connecting,
            connected_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Token cancelled when the session is terminated from outside.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Moves the session to `next`.
    ///
    /// Closing an already closed session is a no-op.
    pub fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if self.state == SessionState::Closed && next == SessionState::Closed {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::trace!(
            session_id = %self.id,
            device_id = %self.device_id,
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
        Ok(())
    }

    /// Summary used by the active-session listing.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            device_id: self.device_id.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Public view of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub device_id: String,
    pub connected_at: DateTime<Utc>,
}

struct ActiveSession {
    info: SessionInfo,
    cancel: CancellationToken,
}

/// Thread-safe set of open sessions using DashMap.
///
/// Insert and remove are serialized per shard, so concurrent connects and
/// disconnects never lose updates.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionId, ActiveSession>,
}

impl SessionManager {
    /// Creates an empty session set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an open session to the active set.
    pub fn insert(&self, session: &ChannelSession) -> Result<(), SessionError> {
        if !session.is_open() {
            return Err(SessionError::NotOpen(session.id()));
        }

        self.sessions.insert(
            session.id(),
            ActiveSession {
                info: session.info(),
                cancel: session.cancellation(),
            },
        );

        tracing::info!(
            session_id = %session.id(),
            device_id = %session.device_id(),
            active = self.sessions.len(),
            "Channel session opened"
        );
        Ok(())
    }

    /// Removes a session. Returns false if it was already gone.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        match self.sessions.remove(session_id) {
            Some((id, entry)) => {
                tracing::info!(
                    session_id = %id,
                    device_id = %entry.info.device_id,
                    active = self.sessions.len(),
                    "Channel session closed"
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Snapshot of active sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| entry.value().info.clone())
            .collect();
        sessions.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        sessions
    }

    /// Signals every session of a device to close.
    ///
    /// Returns the number of sessions signalled.
    pub fn terminate_device(&self, device_id: &str) -> usize {
        let mut terminated = 0;
        for entry in self.sessions.iter() {
            if entry.value().info.device_id == device_id {
                entry.value().cancel.cancel();
                terminated += 1;
            }
        }

        if terminated > 0 {
            tracing::info!(
                device_id = %device_id,
                sessions = terminated,
                "Terminating device sessions"
            );
        }
        terminated
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
