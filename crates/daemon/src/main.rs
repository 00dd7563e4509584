//! HybridStore Daemon
//!
//! Desktop host that pairs companion devices and serves sandboxed
//! directory listings.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::logging::init_logging;
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorEvent};

/// HybridStore Daemon - pairs devices and serves sandboxed file listings.
#[derive(Parser, Debug)]
#[command(name = "hybridstore-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HybridStore host
    Start {
        /// Address to bind, overriding the configuration
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Storage root, overriding the configuration
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

/// Loads the configuration file, then applies environment and CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    config.apply_env_overrides()?;

    if let Commands::Start { bind, root } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind_address = *bind;
        }
        if let Some(root) = root {
            config.storage.root = root.clone();
        }
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.daemon.log_level.as_str()
    };
    let _log_guard = init_logging(level, config.daemon.log_dir.as_deref())?;

    match cli.command {
        Commands::Start { .. } => {
            tracing::info!(
                "Using config file: {}",
                cli.config
                    .clone()
                    .unwrap_or_else(default_config_path)
                    .display()
            );
            tracing::info!(
                bind_address = %config.server.bind_address,
                storage_root = %config.storage.root.display(),
                "Effective configuration"
            );

            let mut orchestrator = DaemonOrchestrator::new(config)?;
            run_headless(&mut orchestrator).await?;
        }
        Commands::Config { default } => {
            let shown = if default { Config::default() } else { config };
            let toml = shown.to_toml().context("Failed to render configuration")?;
            println!("{}", toml);
        }
    }

    Ok(())
}

/// Run the daemon until a shutdown signal arrives.
async fn run_headless(orchestrator: &mut DaemonOrchestrator) -> anyhow::Result<()> {
    let mut events = orchestrator.subscribe();

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::info!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::Listening { addr } => {
                    tracing::info!("Accepting connections on {}", addr);
                }
            }
        }
    });

    let addr = orchestrator.start().await?;
    println!("HybridStore host listening on http://{}", addr);
    println!("Pairing fingerprint: {}", orchestrator.fingerprint());

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl-C, or SIGTERM on Unix).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received SIGINT");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_command() {
        let cli = Cli::try_parse_from(["hybridstore-daemon", "start"]).unwrap();
        match cli.command {
            Commands::Start { bind, root } => {
                assert!(bind.is_none());
                assert!(root.is_none());
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_start_with_overrides() {
        let cli = Cli::try_parse_from([
            "hybridstore-daemon",
            "start",
            "--bind",
            "0.0.0.0:9000",
            "--root",
            "/srv/store",
        ])
        .unwrap();
        match cli.command {
            Commands::Start { bind, root } => {
                assert_eq!(bind.unwrap().to_string(), "0.0.0.0:9000");
                assert_eq!(root.unwrap(), PathBuf::from("/srv/store"));
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let result = Cli::try_parse_from(["hybridstore-daemon", "start", "--bind", "nope"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_command() {
        let cli = Cli::try_parse_from(["hybridstore-daemon", "config", "--default"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { default: true }));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "hybridstore-daemon",
            "start",
            "--verbose",
            "--config",
            "/etc/hybridstore.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/hybridstore.toml")));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_config_rejects_invalid_env_bind() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let cli = Cli::try_parse_from([
            "hybridstore-daemon",
            "--config",
            config_path.to_str().unwrap(),
            "start",
            "--root",
            "/srv/store",
        ])
        .unwrap();

        std::env::set_var("HYBRIDSTORE_BIND", "not-an-address");
        let result = load_config(&cli);
        std::env::remove_var("HYBRIDSTORE_BIND");

        let err = result.unwrap_err().to_string();
        assert!(err.contains("HYBRIDSTORE_BIND"));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_config_applies_cli_overrides() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let cli = Cli::try_parse_from([
            "hybridstore-daemon",
            "--config",
            config_path.to_str().unwrap(),
            "start",
            "--bind",
            "127.0.0.1:0",
            "--root",
            "/srv/store",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.bind_address.port(), 0);
        assert_eq!(config.storage.root, PathBuf::from("/srv/store"));
    }
}
