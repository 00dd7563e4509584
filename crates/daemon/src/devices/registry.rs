//! In-memory registry of paired devices.
//!
//! The registry is the single source of truth for authorization: a device
//! may open a command channel only while its `device_id` is present here.
//! Nothing is persisted; a restart starts from an empty registry.

use std::sync::RwLock;

use chrono::Utc;
use protocol::{DeviceRecord, DeviceStatus, ErrorCode};
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No device with this identifier is registered.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The device identifier is empty.
    #[error("device id must not be empty")]
    EmptyDeviceId,

    /// A thread panicked while holding the registry lock.
    #[error("registry lock poisoned")]
    LockPoisoned,
}

impl RegistryError {
    /// Returns the stable error classification sent to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            RegistryError::EmptyDeviceId => ErrorCode::ValidationError,
            RegistryError::LockPoisoned => ErrorCode::Internal,
        }
    }
}

/// Thread-safe registry of paired devices.
///
/// Records are kept in insertion order. All mutations take the write lock,
/// so concurrent `register`/`revoke` calls never lose updates; readers get a
/// consistent snapshot.
#[derive(Debug, Default)]
pub struct PairingRegistry {
    devices: RwLock<Vec<DeviceRecord>>,
}

impl PairingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device, or updates it if the identifier is already known.
    ///
    /// Re-registering keeps the record's position and replaces its display
    /// name and key; it never creates a duplicate.
    pub fn register(
        &self,
        device_id: &str,
        display_name: &str,
        client_public_key_export: &str,
    ) -> Result<DeviceRecord, RegistryError> {
        if device_id.is_empty() {
            return Err(RegistryError::EmptyDeviceId);
        }

        let mut devices = self
            .devices
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;

        let record = DeviceRecord {
            device_id: device_id.to_string(),
            display_name: display_name.to_string(),
            client_public_key_export: client_public_key_export.to_string(),
            status: DeviceStatus::Paired,
            paired_at: Utc::now(),
        };

        match devices.iter_mut().find(|d| d.device_id == device_id) {
            Some(existing) => {
                tracing::info!(
                    device_id = %device_id,
                    display_name = %display_name,
                    "Updating paired device"
                );
                *existing = record.clone();
            }
            None => {
                tracing::info!(
                    device_id = %device_id,
                    display_name = %display_name,
                    "Registering paired device"
                );
                devices.push(record.clone());
            }
        }

        Ok(record)
    }

    /// Returns a snapshot of all records in insertion order.
    pub fn list(&self) -> Result<Vec<DeviceRecord>, RegistryError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(devices.clone())
    }

    /// Removes a device.
    ///
    /// Future authorization checks fail immediately. Channels that are
    /// already open are not touched here.
    pub fn revoke(&self, device_id: &str) -> Result<DeviceRecord, RegistryError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;

        let index = devices
            .iter()
            .position(|d| d.device_id == device_id)
            .ok_or_else(|| RegistryError::NotFound(device_id.to_string()))?;

        let removed = devices.remove(index);
        tracing::info!(
            device_id = %removed.device_id,
            display_name = %removed.display_name,
            "Revoked device"
        );
        Ok(removed)
    }

    /// Returns true if the device is currently paired.
    ///
    /// A poisoned lock is treated as "not authorized".
    pub fn is_authorized(&self, device_id: &str) -> bool {
        match self.devices.read() {
            Ok(devices) => devices.iter().any(|d| d.device_id == device_id),
            Err(_) => {
                tracing::error!("Registry lock poisoned during authorization check");
                false
            }
        }
    }

    /// Returns the number of paired devices.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?;
        Ok(devices.len())
    }

    /// Returns true if no device is paired.
    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}
