//! Server identity key and fingerprint derivation.
//!
//! The host owns a single Ed25519 keypair for the lifetime of the process.
//! Its public half is exported as a SubjectPublicKeyInfo PEM document so that
//! companion devices can store it, and a short fingerprint of the DER
//! encoding is shown to the user for out-of-band confirmation.

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// Number of digest bytes rendered in a fingerprint.
///
/// Only the first half of the SHA-256 digest is shown, giving 16
/// colon-separated groups such as `A1:B2:...`.
pub const FINGERPRINT_LENGTH: usize = 16;

/// The identity of the host, including the secret key.
///
/// Never persisted. A restart produces a new identity, which invalidates
/// every fingerprint shown before it.
#[derive(Clone)]
pub struct ServerIdentity {
    /// The Ed25519 signing key (secret key).
    signing_key: SigningKey,
    /// Canonical binary (SPKI DER) encoding of the public key.
    public_key_der: Vec<u8>,
    /// Textual (SPKI PEM) encoding of the public key.
    public_key_pem: String,
}

impl ServerIdentity {
    /// Generates a new random server identity.
    ///
    /// Every call yields a different keypair. Callers generate once at
    /// startup and share the result.
    pub fn generate() -> Result<Self> {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Builds an identity around an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Result<Self> {
        let verifying_key = signing_key.verifying_key();
        let public_key_der = verifying_key
            .to_public_key_der()
            .map_err(|e| ProtocolError::KeyEncoding(e.to_string()))?
            .as_bytes()
            .to_vec();
        let public_key_pem = verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::KeyEncoding(e.to_string()))?;

        Ok(Self {
            signing_key,
            public_key_der,
            public_key_pem,
        })
    }

    /// Returns the public key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Returns the PEM export of the public key, suitable for transmission.
    pub fn export_public_key(&self) -> &str {
        &self.public_key_pem
    }

    /// Returns the DER encoding of the public key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Returns the human-verifiable fingerprint of this identity.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key_der)
    }
}

impl std::fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("fingerprint", &self.fingerprint())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Derives the fingerprint of a DER-encoded public key.
///
/// SHA-256 over the DER bytes, truncated to [`FINGERPRINT_LENGTH`] bytes and
/// rendered as uppercase hex pairs joined with colons.
pub fn fingerprint(public_key_der: &[u8]) -> String {
    let digest = Sha256::digest(public_key_der);
    digest[..FINGERPRINT_LENGTH]
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":")
}
