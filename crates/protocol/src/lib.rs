//! # HybridStore Protocol Library
//!
//! Wire definitions and the host identity key shared by the HybridStore
//! daemon and its companion clients.
//!
//! ## Overview
//!
//! - **Message Definitions**: pairing offers, device records, directory
//!   listings, and the `{action, payload}` / `{action, status, ...}` frames of
//!   the real-time command channel
//! - **Error Codes**: the stable classification attached to every failure
//! - **Server Identity**: Ed25519 key generation, SPKI export, and the
//!   16-group fingerprint shown during pairing
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ChannelRequest, Command, ServerIdentity};
//!
//! let identity = ServerIdentity::generate().unwrap();
//! println!("Fingerprint: {}", identity.fingerprint());
//!
//! let request: ChannelRequest =
//!     serde_json::from_str(r#"{"action":"list-directory","payload":{"path":"/"}}"#).unwrap();
//! let command = Command::from_request(request).unwrap();
//! assert_eq!(command.kind().as_str(), "list-directory");
//! ```
//!
//! ## Modules
//!
//! - [`crypto`]: Server identity and fingerprints
//! - [`messages`]: Wire message definitions
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod messages;

pub use crypto::{fingerprint, ServerIdentity, FINGERPRINT_LENGTH};
pub use error::{ProtocolError, Result};
pub use messages::{
    ActionKind, ChannelRequest, ChannelResponse, Command, CompletePairingRequest, DeviceRecord,
    DeviceStatus, DirectoryEntry, DirectoryListing, EntryKind, ErrorBody, ErrorCode,
    ListDirectory, PairingOffer, Pong, ResponseStatus, StatusResponse,
};
