//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that prepares the storage
//! root, generates the process identity, builds the registry, sandbox and
//! command channel, and runs the HTTP server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use protocol::ServerIdentity;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::CommandChannel;
use crate::config::Config;
use crate::devices::{local_host_name, PairingRegistry, PairingService};
use crate::files::Sandbox;
use crate::server::{build_router, AppState, HttpServer};
use crate::session::SessionManager;

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, binding the server.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// The server is accepting connections.
    Listening { addr: SocketAddr },
}

/// Daemon orchestrator that owns every subsystem.
pub struct DaemonOrchestrator {
    config: Config,
    /// Generated once per process; never persisted.
    identity: Arc<ServerIdentity>,
    state: Arc<RwLock<OrchestratorState>>,
    pairing: Arc<PairingService>,
    channel: Arc<CommandChannel>,
    server: HttpServer,
    shutdown_token: CancellationToken,
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

/// Creates the storage root if it does not exist yet.
fn ensure_storage_root(root: &Path) -> Result<()> {
    if !root.exists() {
        info!("Creating storage root at {}", root.display());
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create storage root: {}", root.display()))?;
    }
    Ok(())
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator.
    pub fn new(config: Config) -> Result<Self> {
        ensure_storage_root(&config.storage.root)?;

        let identity =
            Arc::new(ServerIdentity::generate().context("Failed to generate server identity")?);
        info!("Server identity fingerprint: {}", identity.fingerprint());

        let sandbox = Sandbox::new(&config.storage.root)
            .context("Failed to open storage root")?
            .include_hidden(config.storage.include_hidden);
        info!("Serving files from {}", sandbox.root().display());

        let registry = Arc::new(PairingRegistry::new());
        let sessions = Arc::new(SessionManager::new());

        let host_name = config
            .server
            .host_name
            .clone()
            .unwrap_or_else(local_host_name);
        let pairing = Arc::new(PairingService::new(
            Arc::clone(&identity),
            Arc::clone(&registry),
            host_name,
        ));

        let channel = Arc::new(
            CommandChannel::new(registry, sessions, Arc::new(sandbox))
                .with_max_message_bytes(config.security.max_message_bytes)
                .with_terminate_sessions_on_revoke(config.security.terminate_sessions_on_revoke),
        );

        let shutdown_token = CancellationToken::new();
        let server = HttpServer::new(config.server.bind_address, shutdown_token.clone());
        let (event_tx, _) = broadcast::channel(64);

        Ok(Self {
            config,
            identity,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            pairing,
            channel,
            server,
            shutdown_token,
            event_tx,
        })
    }

    /// Returns the server identity fingerprint.
    pub fn fingerprint(&self) -> String {
        self.identity.fingerprint()
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Starts the HTTP server and returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            if self.shutdown_token.is_cancelled() {
                anyhow::bail!("Orchestrator has been stopped and cannot be restarted");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let app_state = AppState {
            pairing: Arc::clone(&self.pairing),
            channel: Arc::clone(&self.channel),
            shutdown: self.shutdown_token.clone(),
        };
        let app = build_router(app_state, self.config.server.cors_permissive);

        let addr = match self.server.start(app).await {
            Ok(addr) => addr,
            Err(e) => {
                *self.state.write().await = OrchestratorState::Stopped;
                self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));
                return Err(e).context("Failed to start HTTP server");
            }
        };

        *self.state.write().await = OrchestratorState::Running;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Running));
        self.emit_event(OrchestratorEvent::Listening { addr });

        info!("Daemon orchestrator started on {}", addr);
        Ok(addr)
    }

    /// Stops the daemon orchestrator gracefully.
    ///
    /// Open channels are closed with a "going away" frame.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        let open = self.channel.sessions().count();
        debug!("Closing {} open channel(s)", open);

        // Stops the listener and every channel task.
        self.server.shutdown().await;

        *self.state.write().await = OrchestratorState::Stopped;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Daemon orchestrator stopped");
        Ok(())
    }

    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn pairing(&self) -> &Arc<PairingService> {
        &self.pairing
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.root = temp_dir.path().join("store");
        config.server.bind_address = "127.0.0.1:0".parse().unwrap();
        config.server.host_name = Some("test-host".to_string());
        config
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);

        let orchestrator = DaemonOrchestrator::new(config).unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert!(orchestrator.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_creates_missing_storage_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        assert!(!temp_dir.path().join("store").exists());

        let _orchestrator = DaemonOrchestrator::new(config).unwrap();
        assert!(temp_dir.path().join("store").is_dir());
    }

    #[tokio::test]
    async fn test_identity_is_per_process() {
        let temp_dir = TempDir::new().unwrap();

        let first = DaemonOrchestrator::new(create_test_config(&temp_dir)).unwrap();
        let second = DaemonOrchestrator::new(create_test_config(&temp_dir)).unwrap();

        // Stable within one orchestrator, fresh across restarts.
        assert_eq!(first.fingerprint(), first.fingerprint());
        assert_ne!(first.fingerprint(), second.fingerprint());
        assert_eq!(
            first.pairing().generate_offer().fingerprint,
            first.fingerprint()
        );
    }

    #[tokio::test]
    async fn test_host_name_override() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = DaemonOrchestrator::new(create_test_config(&temp_dir)).unwrap();
        assert_eq!(orchestrator.pairing().host_name(), "test-host");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = DaemonOrchestrator::new(create_test_config(&temp_dir)).unwrap();
        let mut events = orchestrator.subscribe();

        let addr = orchestrator.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(orchestrator.state().await, OrchestratorState::Running);
        assert_eq!(orchestrator.local_addr(), Some(addr));
        assert!(orchestrator.start().await.is_err());

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert!(orchestrator.shutdown_token().is_cancelled());

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first,
            OrchestratorEvent::StateChanged(OrchestratorState::Starting)
        ));

        // Stopping twice is a no-op.
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cannot_restart_after_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = DaemonOrchestrator::new(create_test_config(&temp_dir)).unwrap();
        orchestrator.start().await.unwrap();
        orchestrator.stop().await.unwrap();
        assert!(orchestrator.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_on_occupied_port_fails() {
        let temp_dir = TempDir::new().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = create_test_config(&temp_dir);
        config.server.bind_address = listener.local_addr().unwrap();
        let mut orchestrator = DaemonOrchestrator::new(config).unwrap();

        assert!(orchestrator.start().await.is_err());
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
    }
}
