//! Wire message definitions for HybridStore.
//!
//! This module defines the JSON shapes exchanged with companion devices:
//! pairing offers and confirmations, device records, directory listings, and
//! the frames of the real-time command channel. All field names are
//! camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

// ============================================================================
// Error classification
// ============================================================================

/// Stable error classification carried by every failure sent to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Path escapes the sandbox, or the device is not paired.
    Unauthorized,
    /// Missing path or device.
    NotFound,
    /// Filesystem permission failure.
    AccessDenied,
    /// Malformed or missing request fields.
    ValidationError,
    /// Unexpected failure on the host.
    Internal,
}

impl ErrorCode {
    /// Returns the wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a failed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable classification.
    pub code: ErrorCode,
}

// ============================================================================
// Pairing
// ============================================================================

/// Information a companion device needs to pair with this host.
///
/// Typically rendered as a QR code by the desktop UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingOffer {
    /// Host name of the desktop machine.
    pub host_name: String,
    /// PEM export of the server public key.
    pub server_public_key_export: String,
    /// Fingerprint of the server public key.
    pub fingerprint: String,
}

/// Request sent by a device to complete pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePairingRequest {
    /// Client-chosen unique device identifier.
    pub device_id: String,
    /// Human-readable device name.
    #[serde(default)]
    pub display_name: String,
    /// Public key export supplied by the device.
    #[serde(default)]
    pub client_public_key_export: String,
}

/// Generic `{status}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Short status word, e.g. `paired`, `revoked`, `ok`.
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    /// Creates a status response without a message.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: None,
        }
    }

    /// Attaches a human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// Devices
// ============================================================================

/// Pairing status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Device completed pairing and may open a channel.
    #[default]
    Paired,
}

/// A paired device as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Unique device identifier.
    pub device_id: String,
    /// Human-readable device name.
    pub display_name: String,
    /// Public key export supplied at pairing time.
    pub client_public_key_export: String,
    /// Pairing status.
    pub status: DeviceStatus,
    /// When the device was last (re)paired.
    pub paired_at: DateTime<Utc>,
}

// ============================================================================
// Directory listings
// ============================================================================

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file (or anything that is not a directory).
    File,
    /// Directory.
    Directory,
}

/// A direct child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Logical path of the entry, relative to the storage root.
    pub logical_path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes as reported by the filesystem.
    pub size_bytes: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// Result of listing one logical directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    /// The logical path that was requested.
    pub current_path: String,
    /// Direct children of the directory.
    pub entries: Vec<DirectoryEntry>,
}

// ============================================================================
// Command channel
// ============================================================================

/// The actions a device may send over the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// List the direct children of a logical directory.
    ListDirectory,
    /// Keepalive.
    Ping,
}

impl ActionKind {
    /// Every action the host understands.
    pub const ALL: [ActionKind; 2] = [ActionKind::ListDirectory, ActionKind::Ping];

    /// Returns the wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ListDirectory => "list-directory",
            ActionKind::Ping => "ping",
        }
    }

    /// Looks up an action by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inbound frame: `{action, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Action name.
    pub action: String,
    /// Action-specific payload.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of a `list-directory` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDirectory {
    /// Logical path to list, relative to the storage root.
    #[serde(default = "default_list_path")]
    pub path: String,
}

fn default_list_path() -> String {
    "/".to_string()
}

/// A decoded, typed channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List a directory.
    ListDirectory(ListDirectory),
    /// Keepalive.
    Ping,
}

impl Command {
    /// Returns the action kind of this command.
    pub fn kind(&self) -> ActionKind {
        match self {
            Command::ListDirectory(_) => ActionKind::ListDirectory,
            Command::Ping => ActionKind::Ping,
        }
    }

    /// Decodes a raw frame into a typed command.
    pub fn from_request(request: ChannelRequest) -> Result<Self> {
        let kind = ActionKind::from_name(&request.action)
            .ok_or_else(|| ProtocolError::UnknownAction(request.action.clone()))?;

        match kind {
            ActionKind::ListDirectory => {
                // A missing payload means "list the root".
                let payload = if request.payload.is_null() {
                    Value::Object(Default::default())
                } else {
                    request.payload
                };
                let list: ListDirectory =
                    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
                        action: request.action,
                        reason: e.to_string(),
                    })?;
                Ok(Command::ListDirectory(list))
            }
            ActionKind::Ping => Ok(Command::Ping),
        }
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The command succeeded; `data` is set.
    Success,
    /// The command failed; `message` and `code` are set.
    Error,
}

/// Outbound frame: `{action, status, data|message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResponse {
    /// The action this frame answers.
    pub action: String,
    /// Outcome.
    pub status: ResponseStatus,
    /// Result data on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stable classification on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ChannelResponse {
    /// Builds a success frame.
    pub fn success(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            status: ResponseStatus::Success,
            data: Some(data),
            message: None,
            code: None,
        }
    }

    /// Builds an error frame.
    pub fn error(action: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: ResponseStatus::Error,
            data: None,
            message: Some(message.into()),
            code: Some(code),
        }
    }

    /// Serializes the frame to JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// Returns true if this is a success frame.
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Data of a `ping` success frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Host time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}
