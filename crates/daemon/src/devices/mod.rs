//! Device management module.
//!
//! This module provides the in-memory registry of paired devices and the
//! pairing protocol that fills it.

pub mod pairing;
pub mod registry;

pub use pairing::{local_host_name, PairingError, PairingService};
pub use registry::{PairingRegistry, RegistryError};
