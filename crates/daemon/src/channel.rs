//! Command channel: connect-time authorization and message dispatch.
//!
//! A device opens one channel per connection. The registry is consulted
//! exactly once, when the channel connects; an open channel keeps working
//! until its connection closes or it is terminated from outside. Commands
//! are answered only on the channel that sent them, and a failed command
//! never closes the channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use protocol::{
    ActionKind, ChannelRequest, ChannelResponse, Command, DeviceRecord, ErrorCode, ListDirectory,
    Pong, ProtocolError,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_MESSAGE_BYTES;
use crate::devices::{PairingRegistry, RegistryError};
use crate::files::{Sandbox, SandboxError};
use crate::session::{ChannelSession, SessionError, SessionManager, SessionState};

/// Errors that end a channel before it opens.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The device is not paired.
    #[error("device is not paired: {0}")]
    Unauthorized(String),

    /// Session bookkeeping failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl ChannelError {
    /// Returns the stable error classification sent to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChannelError::Unauthorized(_) => ErrorCode::Unauthorized,
            ChannelError::Session(_) => ErrorCode::Internal,
        }
    }
}

/// Shared command channel state.
///
/// One instance serves every connection; per-connection state lives in
/// [`ChannelSession`].
pub struct CommandChannel {
    registry: Arc<PairingRegistry>,
    sessions: Arc<SessionManager>,
    sandbox: Arc<Sandbox>,
    max_message_bytes: usize,
    terminate_sessions_on_revoke: bool,
    /// Held across authorize+insert in `connect` and across
    /// revoke+terminate in `revoke_device`.
    admission: Mutex<()>,
}

impl CommandChannel {
    pub fn new(
        registry: Arc<PairingRegistry>,
        sessions: Arc<SessionManager>,
        sandbox: Arc<Sandbox>,
    ) -> Self {
        Self {
            registry,
            sessions,
            sandbox,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            terminate_sessions_on_revoke: true,
            admission: Mutex::new(()),
        }
    }

    /// Sets the largest inbound frame accepted, in bytes.
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }

    /// Sets whether revoking a device closes its open channels.
    pub fn with_terminate_sessions_on_revoke(mut self, terminate: bool) -> Self {
        self.terminate_sessions_on_revoke = terminate;
        self
    }

    pub fn registry(&self) -> &Arc<PairingRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    /// Authorizes a new connection for `device_id`.
    ///
    /// On success the session is `Open` and part of the active set. An
    /// unpaired device gets `Unauthorized` and never joins the set.
    pub fn connect(&self, device_id: &str) -> Result<ChannelSession, ChannelError> {
        let mut session = ChannelSession::new(device_id);
        session.transition(SessionState::Authorizing)?;

        let _admission = self.lock_admission();
        self.admit(&mut session)?;
        Ok(session)
    }

    /// Authorizes an `Authorizing` session and adds it to the active set.
    ///
    /// The caller must hold the admission lock, so a revocation either
    /// happens before the check or sees the inserted session.
    fn admit(&self, session: &mut ChannelSession) -> Result<(), ChannelError> {
        let device_id = session.device_id().to_string();
        if !self.registry.is_authorized(&device_id) {
            session.transition(SessionState::Closed)?;
            warn!(device_id = %device_id, "Rejected channel from unpaired device");
            return Err(ChannelError::Unauthorized(device_id));
        }

        session.transition(SessionState::Open)?;
        self.sessions.insert(session)?;
        Ok(())
    }

    fn lock_admission(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock is still usable.
        self.admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles one inbound text frame and returns the reply.
    ///
    /// Every frame gets exactly one reply, including malformed frames and
    /// unknown actions.
    pub async fn handle_message(&self, session: &ChannelSession, raw: &str) -> ChannelResponse {
        if !session.is_open() {
            return ChannelResponse::error(
                "",
                ErrorCode::Unauthorized,
                "channel is not open",
            );
        }

        if raw.len() > self.max_message_bytes {
            let err = ProtocolError::MessageTooLarge {
                size: raw.len(),
                max: self.max_message_bytes,
            };
            warn!(session_id = %session.id(), "{}", err);
            return ChannelResponse::error("", err.code(), err.to_string());
        }

        let (action, command) = match decode(raw) {
            Ok(decoded) => decoded,
            Err((action, err)) => {
                debug!(
                    session_id = %session.id(),
                    device_id = %session.device_id(),
                    action = %action,
                    "Rejected channel frame: {}",
                    err
                );
                return ChannelResponse::error(action, err.code(), err.to_string());
            }
        };

        debug!(
            session_id = %session.id(),
            device_id = %session.device_id(),
            action = %action,
            "Dispatching channel command"
        );
        self.dispatch(command).await
    }

    async fn dispatch(&self, command: Command) -> ChannelResponse {
        let action = command.kind();
        match command {
            Command::ListDirectory(request) => self.list_directory(request).await,
            Command::Ping => {
                let pong = Pong {
                    timestamp: Utc::now().timestamp_millis(),
                };
                to_success(action, &pong)
            }
        }
    }

    async fn list_directory(&self, request: ListDirectory) -> ChannelResponse {
        let action = ActionKind::ListDirectory;
        let sandbox = Arc::clone(&self.sandbox);
        let path = request.path;

        // Directory reads block; keep them off the connection's task.
        let result = tokio::task::spawn_blocking(move || sandbox.list(&path)).await;

        match result {
            Ok(Ok(listing)) => to_success(action, &listing),
            Ok(Err(err)) => sandbox_failure(action, err),
            Err(join_err) => {
                tracing::error!("Directory listing task failed: {}", join_err);
                ChannelResponse::error(
                    action.as_str(),
                    ErrorCode::Internal,
                    "an internal error occurred while reading the directory",
                )
            }
        }
    }

    /// Removes a session from the active set and closes it.
    ///
    /// Safe to call more than once.
    pub fn disconnect(&self, session: &mut ChannelSession) -> bool {
        let removed = self.sessions.remove(&session.id());
        if let Err(e) = session.transition(SessionState::Closed) {
            warn!(session_id = %session.id(), "{}", e);
        }
        removed
    }

    /// Revokes a device and, if configured, terminates its open channels.
    ///
    /// Returns the removed record and the number of channels signalled.
    pub fn revoke_device(&self, device_id: &str) -> Result<(DeviceRecord, usize), RegistryError> {
        let (record, terminated) = {
            let _admission = self.lock_admission();
            let record = self.registry.revoke(device_id)?;
            let terminated = if self.terminate_sessions_on_revoke {
                self.sessions.terminate_device(device_id)
            } else {
                0
            };
            (record, terminated)
        };

        info!(
            device_id = %device_id,
            terminated_sessions = terminated,
            "Device revoked"
        );
        Ok((record, terminated))
    }
}

/// Decodes a raw frame, keeping the action name for error replies.
fn decode(raw: &str) -> Result<(String, Command), (String, ProtocolError)> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| (String::new(), ProtocolError::from(e)))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let request: ChannelRequest =
        serde_json::from_value(value).map_err(|e| (action.clone(), ProtocolError::from(e)))?;
    let command = Command::from_request(request).map_err(|e| (action.clone(), e))?;

    Ok((action, command))
}

fn to_success<T: serde::Serialize>(action: ActionKind, data: &T) -> ChannelResponse {
    match serde_json::to_value(data) {
        Ok(value) => ChannelResponse::success(action.as_str(), value),
        Err(e) => {
            tracing::error!(action = %action, "Failed to encode response: {}", e);
            ChannelResponse::error(
                action.as_str(),
                ErrorCode::Internal,
                "failed to encode response",
            )
        }
    }
}

fn sandbox_failure(action: ActionKind, err: SandboxError) -> ChannelResponse {
    if err.code() == ErrorCode::Internal {
        tracing::error!(action = %action, "Command failed: {}", err);
    } else {
        debug!(action = %action, "Command failed: {}", err);
    }
    ChannelResponse::error(action.as_str(), err.code(), err.client_message())
}
