//! Error types for the protocol crate.

use thiserror::Error;

use crate::messages::ErrorCode;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Cryptographic errors
    /// The public key could not be encoded.
    #[error("key encoding failed: {0}")]
    KeyEncoding(String),

    // Channel frame errors
    /// Frame exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The `action` of a channel message is not one the host understands.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The payload did not match what the action expects.
    #[error("invalid payload for {action}: {reason}")]
    InvalidPayload {
        /// The action whose payload was rejected.
        action: String,
        /// Why the payload was rejected.
        reason: String,
    },
}

impl ProtocolError {
    /// Returns the stable error classification sent to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Serialization(_) | ProtocolError::KeyEncoding(_) => ErrorCode::Internal,
            ProtocolError::Deserialization(_)
            | ProtocolError::MessageTooLarge { .. }
            | ProtocolError::UnknownAction(_)
            | ProtocolError::InvalidPayload { .. } => ErrorCode::ValidationError,
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_too_large_display() {
        let err = ProtocolError::MessageTooLarge {
            size: 100_000,
            max: 65536,
        };
        assert_eq!(
            err.to_string(),
            "message too large: 100000 bytes exceeds maximum of 65536 bytes"
        );
    }

    #[test]
    fn test_unknown_action_display() {
        let err = ProtocolError::UnknownAction("delete-everything".to_string());
        assert_eq!(err.to_string(), "unknown action: delete-everything");
    }

    #[test]
    fn test_invalid_payload_display() {
        let err = ProtocolError::InvalidPayload {
            action: "list-directory".to_string(),
            reason: "missing field `path`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid payload for list-directory: missing field `path`"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            ProtocolError::UnknownAction("x".into()).code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            ProtocolError::Deserialization("x".into()).code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            ProtocolError::KeyEncoding("x".into()).code(),
            ErrorCode::Internal
        );
        assert_eq!(
            ProtocolError::Serialization("x".into()).code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }
}
