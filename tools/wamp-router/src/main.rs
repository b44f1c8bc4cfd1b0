//! WAMP Router Server
//!
//! A standalone WAMP v1 router that accepts WebSocket connections and routes
//! pub/sub events between clients.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wamp_router::{Router, RouterConfig};

#[derive(Parser)]
#[command(name = "wamp-router")]
#[command(about = "WAMP v1 Router Server")]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Server identification sent in WELCOME
    #[arg(short, long)]
    name: Option<String>,

    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// On-disk configuration; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    listen: Option<SocketAddr>,
    server_ident: Option<String>,
    max_sessions: Option<usize>,
    /// Seconds; 0 disables call timeouts
    call_timeout_secs: Option<u64>,
    send_queue_capacity: Option<usize>,
    max_message_size: Option<usize>,
    handshake_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], wamp_core::DEFAULT_WS_PORT))
}

/// Merge file settings over defaults, then CLI flags over both
fn build_config(cli: &Cli, file: FileConfig) -> (SocketAddr, RouterConfig) {
    let mut config = RouterConfig::default();

    if let Some(ident) = file.server_ident {
        config.server_ident = ident;
    }
    if let Some(max) = file.max_sessions {
        config.max_sessions = max;
    }
    if let Some(secs) = file.call_timeout_secs {
        config.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(capacity) = file.send_queue_capacity {
        config.send_queue_capacity = capacity;
    }
    if let Some(size) = file.max_message_size {
        config.max_message_size = size;
    }
    if let Some(secs) = file.handshake_timeout_secs {
        config.handshake_timeout = Duration::from_secs(secs);
    }
    if let Some(name) = &cli.name {
        config.server_ident = name.clone();
    }

    let listen = cli.listen.or(file.listen).unwrap_or_else(default_listen);
    (listen, config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let (listen, config) = build_config(&cli, file);
    config.validate()?;

    tracing::info!("Starting WAMP Router ({})", config.server_ident);
    tracing::info!("Listening on: {}", listen);

    let router = Router::new(config);

    let listen_addr = listen.to_string();
    tokio::select! {
        result = router.serve_websocket(&listen_addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            router.stop();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("wamp-router").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let (listen, config) = build_config(&cli(&[]), FileConfig::default());
        assert_eq!(listen, default_listen());
        assert_eq!(config.server_ident, wamp_core::SERVER_IDENT);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:9000"
            server_ident = "from-file"
            max_sessions = 5
            call_timeout_secs = 0
            handshake_timeout_secs = 3
            "#,
        )
        .unwrap();

        let (listen, config) = build_config(&cli(&["--name", "from-cli"]), file);
        assert_eq!(listen, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server_ident, "from-cli");
        assert_eq!(config.max_sessions, 5);
        assert!(config.call_timeout.is_none());
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("bogus = 1").is_err());
    }
}
