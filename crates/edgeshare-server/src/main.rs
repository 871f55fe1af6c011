//! edgeshare server entry point.
//!
//! Loads the configuration, wires the services together and runs the server
//! until Ctrl-C or a `quit` console command.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load server.toml       -- ServerConfig, then build_topology()
//!  └─ Server::new()          -- owns topology, sessions, switching state
//!  └─ start services
//!       ├─ listener::serve   (accept loop, one task per connection)
//!       ├─ console::pump     (stdin commands)
//!       └─ Server::run       (single event loop, until shutdown)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use edgeshare_core::{ScreenName, ScreenShape};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edgeshare_server::application::server::{event_channel, Server};
use edgeshare_server::infrastructure::console::{self, ConsoleSource};
use edgeshare_server::infrastructure::network::{listener, NetworkError};
use edgeshare_server::infrastructure::primary::HeadlessPrimary;
use edgeshare_server::infrastructure::storage::config::{self, ConfigError, ServerConfig};
use edgeshare_server::ServerError;

#[derive(Parser, Debug)]
#[command(
    name = "edgeshare-server",
    about = "Share this machine's keyboard and mouse with neighbouring screens",
    version
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "EDGESHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (ip:port).  Overrides the configured one.
    #[arg(short, long)]
    address: Option<String>,

    /// Screen name of this machine.  Overrides the configured one.
    #[arg(short, long)]
    name: Option<String>,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(cli));
    // The stdin reader sits on a blocking thread that never returns by itself.
    runtime.shutdown_timeout(Duration::from_millis(100));

    if let Err(err) = result {
        error!(%err, "edgeshare server failed");
        std::process::exit(err.exit_code());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let loaded = load(&cli);

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.server.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut cfg = loaded?;
    if let Some(name) = cli.name {
        cfg.server.name = name;
    }
    let addr = listen_address(&cfg, cli.address.as_deref())?;
    let options = cfg.server.listener_options().map_err(from_config)?;
    let topology = config::build_topology(&cfg).map_err(from_config)?;

    info!(screen = %cfg.server.name, screens = topology.len(), "edgeshare server starting");

    let primary = HeadlessPrimary::new(
        ScreenShape::new(
            0,
            0,
            cfg.server.screen_width as i32,
            cfg.server.screen_height as i32,
        ),
        cfg.server.jump_zone,
    );

    let (events_tx, events_rx) = event_channel();
    let server = Server::new(
        cfg.server.server_settings(),
        topology,
        ScreenName::new(cfg.server.name.clone()),
        Box::new(primary),
        events_tx.clone(),
    )
    .map_err(|err| ServerError::NoConfiguration(err.to_string()))?;

    // ── Listener ──────────────────────────────────────────────────────────────
    let socket = listener::bind(addr).await.map_err(|err| match err {
        NetworkError::BindFailed { source, .. } => ServerError::Io(source),
        other => ServerError::Io(std::io::Error::new(std::io::ErrorKind::Other, other)),
    })?;
    tokio::spawn(listener::serve(socket, events_tx.clone(), options));

    // ── Console commands ──────────────────────────────────────────────────────
    if !cli.no_console {
        tokio::spawn(console::pump(ConsoleSource::stdin(), events_tx.clone()));
    }
    drop(events_tx);

    info!(%addr, "edgeshare server ready.  Press Ctrl-C to exit.");

    // ── Ctrl-C / SIGTERM ──────────────────────────────────────────────────────
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
    };
    server.run(events_rx, shutdown).await;

    info!("edgeshare server stopped");
    Ok(())
}

fn load(cli: &Cli) -> Result<ServerConfig, ServerError> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path().map_err(from_config)?,
    };
    config::load_config(&path).map_err(from_config)
}

/// Resolves the listen address, preferring the command line.
fn listen_address(cfg: &ServerConfig, cli_address: Option<&str>) -> Result<SocketAddr, ServerError> {
    let text = match cli_address {
        Some(text) => text.to_string(),
        None => format!("{}:{}", cfg.server.address, cfg.server.port),
    };
    text.parse().map_err(|_| ServerError::InvalidAddress(text))
}

fn from_config(err: ConfigError) -> ServerError {
    match err {
        ConfigError::UnknownProtocol(name) => ServerError::IncompatibleProtocol(name),
        ConfigError::Io { source, .. } => ServerError::Io(source),
        other => ServerError::NoConfiguration(other.to_string()),
    }
}
