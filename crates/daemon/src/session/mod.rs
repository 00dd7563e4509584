//! Channel session tracking.
//!
//! This module provides the per-connection session state machine and the
//! shared set of open sessions.

pub mod manager;

pub use manager::{
    ChannelSession, SessionError, SessionId, SessionInfo, SessionManager, SessionState,
};
