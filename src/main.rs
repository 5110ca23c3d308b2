//! Split WebDAV reverse proxy.
//!
//! Mount one local endpoint; downloads and uploads take different paths.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                 SPLIT PROXY                  │
//!   WebDAV client     │  ┌────────┐   ┌────────────┐   ┌──────────┐  │    read upstream
//!  ───────────────────┼─▶│ server │──▶│ classifier │─┬▶│forwarder │──┼──▶ (GET HEAD
//!                     │  └────────┘   └────────────┘ │ └──────────┘  │     OPTIONS PROPFIND)
//!                     │                              │ ┌──────────┐  │
//!                     │                              └▶│forwarder │──┼──▶ write upstream
//!                     │                                └──────────┘  │    (everything else)
//!  ◀──────────────────┼── streamer (bounded chunks) ◀── response ◀───┼───
//!                     │                                              │
//!                     │  config snapshot (arc-swap) · LogSink · stop │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use clap::{Args, Parser, Subcommand};

use split_proxy::config::watcher::ConfigWatcher;
use split_proxy::config::{load_or_default, save_config, validate_config, ConfigError, ProxyConfig};
use split_proxy::observability::logging::init_tracing;
use split_proxy::observability::metrics::init_metrics;
use split_proxy::observability::TracingSink;
use split_proxy::{ProxyServer, RouteConfig};

#[derive(Parser)]
#[command(name = "split-proxy")]
#[command(version, about = "WebDAV reverse proxy that sends reads and writes to different upstreams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy and run until Ctrl+C
    Run(RunArgs),
    /// Validate the configuration and print the routing table
    Check(ConfigArg),
    /// Write a default configuration file
    Init {
        #[command(flatten)]
        config: ConfigArg,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct ConfigArg {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, default_value = "split-proxy.toml")]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Override the read upstream base URL
    #[arg(long)]
    read_url: Option<String>,

    /// Override the write upstream base URL
    #[arg(long)]
    write_url: Option<String>,

    /// Override the loopback listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Reload routing when the configuration file changes
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Check(arg) => check(&arg.config),
        Commands::Init { config, force } => init(&config.config, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Routing values given on the command line. They win over the file,
/// including over later reloads of it.
#[derive(Debug, Clone, Default)]
struct RouteOverrides {
    read_url: Option<String>,
    write_url: Option<String>,
    port: Option<u16>,
}

impl RouteOverrides {
    fn apply(&self, mut route: RouteConfig) -> RouteConfig {
        if let Some(url) = &self.read_url {
            route.read_url = url.clone();
        }
        if let Some(url) = &self.write_url {
            route.write_url = url.clone();
        }
        if let Some(port) = self.port {
            route.listen_port = port;
        }
        route.normalized()
    }
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let file_config = load_or_default(&args.config.config)?.normalized();
    let overrides = RouteOverrides {
        read_url: args.read_url,
        write_url: args.write_url,
        port: args.port,
    };
    let mut config = file_config.clone();
    config.route = overrides.apply(config.route);

    init_tracing(&config.observability.log_level);
    tracing::info!("split-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = ProxyServer::new(config, Arc::new(TracingSink));
    let handle = server.start().await?;

    // Held for the lifetime of the run; dropping it stops the watch.
    let mut _watcher = None;
    let mut updates = None;
    if args.watch {
        let (watcher, rx) = ConfigWatcher::new(&args.config.config, file_config);
        match watcher.run() {
            Ok(w) => {
                _watcher = Some(w);
                updates = Some(rx);
            }
            Err(e) => tracing::error!(error = %e, "Config watcher unavailable"),
        }
    }

    let shutdown = shutdown_requested(tokio::signal::ctrl_c());
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Some(route) = next_update(&mut updates) => {
                if let Err(e) = handle.publish(overrides.apply(route)) {
                    tracing::error!(error = %e, "Rejected reloaded routing, keeping current snapshot");
                }
            }
        }
    }

    handle.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve when `signal` fires. Never resolves if listening for it fails.
async fn shutdown_requested(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, stop the process another way");
        std::future::pending::<()>().await;
    }
}

async fn next_update(
    updates: &mut Option<tokio::sync::mpsc::UnboundedReceiver<RouteConfig>>,
) -> Option<RouteConfig> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(path)?;
    validate_config(&config)?;
    println!("config:  {}", path.display());
    println!("listen:  http://127.0.0.1:{}", config.route.listen_port);
    println!("READ  -> {}  (GET, HEAD, OPTIONS, PROPFIND)", config.route.read_url);
    println!("WRITE -> {}  (all other methods)", config.route.write_url);
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(Box::new(ConfigError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "file exists, pass --force to overwrite",
            ),
        }));
    }
    save_config(path, &ProxyConfig::default())?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
