//! Pairing protocol: offers and completion.
//!
//! An offer carries the host name, the server public key export and its
//! fingerprint. It is stateless and repeatable: it never expires and can be
//! used any number of times. Completion is trust-on-first-use; the client key
//! is stored verbatim and never verified.

use std::sync::Arc;

use protocol::{CompletePairingRequest, DeviceRecord, ErrorCode, PairingOffer, ServerIdentity};
use thiserror::Error;

use super::registry::{PairingRegistry, RegistryError};

/// Errors returned when completing a pairing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    /// The request did not carry a device identifier.
    #[error("deviceId is required")]
    MissingDeviceId,

    /// The registry rejected the record.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl PairingError {
    /// Returns the stable error classification sent to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            PairingError::MissingDeviceId => ErrorCode::ValidationError,
            PairingError::Registry(e) => e.code(),
        }
    }
}

/// Builds pairing offers and completes pairing requests.
pub struct PairingService {
    identity: Arc<ServerIdentity>,
    registry: Arc<PairingRegistry>,
    host_name: String,
}

impl PairingService {
    /// Creates a pairing service around the process identity.
    pub fn new(
        identity: Arc<ServerIdentity>,
        registry: Arc<PairingRegistry>,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            registry,
            host_name: host_name.into(),
        }
    }

    /// Returns the advertised host name.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Builds a pairing offer. Every call returns the same fingerprint.
    pub fn generate_offer(&self) -> PairingOffer {
        PairingOffer {
            host_name: self.host_name.clone(),
            server_public_key_export: self.identity.export_public_key().to_string(),
            fingerprint: self.identity.fingerprint(),
        }
    }

    /// Completes a pairing request by registering the device.
    ///
    /// The device identifier is registered exactly as sent; one that is
    /// blank after trimming is rejected. A blank display name falls back to
    /// the device identifier.
    pub fn complete_pairing(
        &self,
        request: CompletePairingRequest,
    ) -> Result<DeviceRecord, PairingError> {
        let device_id = request.device_id.as_str();
        if device_id.trim().is_empty() {
            tracing::warn!("Rejected pairing request without a device id");
            return Err(PairingError::MissingDeviceId);
        }

        let display_name = match request.display_name.trim() {
            "" => device_id,
            name => name,
        };

        let record =
            self.registry
                .register(device_id, display_name, &request.client_public_key_export)?;

        tracing::info!(
            device_id = %record.device_id,
            display_name = %record.display_name,
            "Pairing completed"
        );
        Ok(record)
    }
}

/// Returns the operating system host name, or `localhost` if unavailable.
pub fn local_host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!("Failed to read host name: {}", e);
            "localhost".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> (PairingService, Arc<PairingRegistry>, Arc<ServerIdentity>) {
        let identity = Arc::new(ServerIdentity::generate().unwrap());
        let registry = Arc::new(PairingRegistry::new());
        let service = PairingService::new(Arc::clone(&identity), Arc::clone(&registry), "desk");
        (service, registry, identity)
    }

    fn pairing_request(device_id: &str, display_name: &str) -> CompletePairingRequest {
        CompletePairingRequest {
            device_id: device_id.to_string(),
            display_name: display_name.to_string(),
            client_public_key_export: "client-key".to_string(),
        }
    }

    #[test]
    fn test_offer_contents() {
        let (service, _, identity) = create_test_service();
        let offer = service.generate_offer();

        assert_eq!(offer.host_name, "desk");
        assert_eq!(offer.server_public_key_export, identity.export_public_key());
        assert_eq!(offer.fingerprint, identity.fingerprint());
    }

    #[test]
    fn test_offer_is_repeatable() {
        let (service, _, _) = create_test_service();
        let first = service.generate_offer();
        let second = service.generate_offer();
        assert_eq!(first, second);
    }

    #[test]
    fn test_complete_pairing_registers_device() {
        let (service, registry, _) = create_test_service();
        let record = service
            .complete_pairing(pairing_request("d1", "Phone"))
            .unwrap();

        assert_eq!(record.device_id, "d1");
        assert_eq!(record.display_name, "Phone");
        assert_eq!(record.client_public_key_export, "client-key");
        assert!(registry.is_authorized("d1"));
    }

    #[test]
    fn test_complete_pairing_requires_device_id() {
        let (service, registry, _) = create_test_service();

        let err = service
            .complete_pairing(pairing_request("", "Phone"))
            .unwrap_err();
        assert_eq!(err, PairingError::MissingDeviceId);
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = service
            .complete_pairing(pairing_request("   ", "Phone"))
            .unwrap_err();
        assert_eq!(err, PairingError::MissingDeviceId);

        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_complete_pairing_keeps_device_id_verbatim() {
        let (service, registry, _) = create_test_service();
        let record = service
            .complete_pairing(pairing_request(" phone-1 ", "Phone"))
            .unwrap();

        assert_eq!(record.device_id, " phone-1 ");
        assert!(registry.is_authorized(" phone-1 "));
        assert!(!registry.is_authorized("phone-1"));
    }

    #[test]
    fn test_complete_pairing_blank_name_uses_id() {
        let (service, _, _) = create_test_service();
        let record = service.complete_pairing(pairing_request("d1", "  ")).unwrap();
        assert_eq!(record.display_name, "d1");
    }

    #[test]
    fn test_repairing_updates_record() {
        let (service, registry, _) = create_test_service();
        service
            .complete_pairing(pairing_request("d1", "Phone"))
            .unwrap();
        service
            .complete_pairing(pairing_request("d1", "Phone2"))
            .unwrap();

        let devices = registry.list().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].display_name, "Phone2");
    }

    #[test]
    fn test_local_host_name_not_empty() {
        assert!(!local_host_name().is_empty());
    }
}
