//! # HybridStore Daemon Library
//!
//! The desktop host of HybridStore: it pairs companion devices and serves
//! them sandboxed directory listings over a real-time command channel.
//!
//! ## Overview
//!
//! - **Pairing**: offers carrying the host's public key and fingerprint, and
//!   trust-on-first-use completion into an in-memory device registry
//! - **Sandbox**: logical paths resolved under a single storage root; nothing
//!   outside it is ever listed
//! - **Command Channel**: one WebSocket per device, authorized once at
//!   connect time, answering `list-directory` and `ping` commands
//! - **HTTP API**: pairing, device management, file listing and health routes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Daemon Orchestrator                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐  │
//! │  │ Server Identity│─▶│ Pairing Service│─▶│Pairing Registry│  │
//! │  └────────────────┘  └────────────────┘  └───────┬────────┘  │
//! │                                                  │           │
//! │  ┌────────────────┐  ┌────────────────┐  ┌───────▼────────┐  │
//! │  │    Sandbox     │◀─│Command Channel │─▶│ Session Manager│  │
//! │  └────────────────┘  └────────────────┘  └────────────────┘  │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              HTTP / WebSocket Server (axum)             │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let mut orchestrator = DaemonOrchestrator::new(config)?;
//!     let addr = orchestrator.start().await?;
//!     println!("Listening on {}", addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`devices`]: Pairing registry and pairing protocol
//! - [`files`]: Sandboxed path resolution and listing
//! - [`session`]: Channel session state and the active-session set
//! - [`channel`]: Connect-time authorization and command dispatch
//! - [`server`]: HTTP routes and the WebSocket channel endpoint
//! - [`logging`]: Tracing subscriber setup
//! - [`orchestrator`]: Main daemon coordinator

pub mod channel;
pub mod config;
pub mod devices;
pub mod files;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use channel::{ChannelError, CommandChannel};
pub use config::Config;
pub use devices::{PairingError, PairingRegistry, PairingService, RegistryError};
pub use files::{Sandbox, SandboxError};
pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
pub use server::{build_router, ApiError, AppState, HttpServer, ServerError};
pub use session::{ChannelSession, SessionId, SessionInfo, SessionManager, SessionState};
