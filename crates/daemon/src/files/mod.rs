//! Sandboxed file browsing.
//!
//! # Security
//!
//! Every logical path is resolved against a single storage root. Paths that
//! normalize outside the root, including through symlinks, are rejected
//! with `Unauthorized` before any directory is read.

pub mod sandbox;

pub use sandbox::{list_directory, resolve, Sandbox, SandboxError};
