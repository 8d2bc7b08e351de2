//! Tether: a small TCP forwarding proxy built on request-scoped sessions.
//!
//! Every accepted connection gets its own session carrying the inbound
//! details, the dispatcher, an error feedback sink and any routing
//! overrides. The router picks an outbound for it and the connection is
//! relayed until either side closes.
//!
//! Usage:
//!   tether --target 10.0.0.5:22                        # Forward 127.0.0.1:1080 to 10.0.0.5:22
//!   tether --listen 0.0.0.0:8443 --target host:443     # Custom listen address
//!   tether --config router.json --force-tag proxy      # Routing rules, forced outbound
//!   tether --outbound-ip 192.0.2.10                    # Pin the outbound gateway

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tether_router::RouterConfig;
use tether_session::{Destination, RoutingConfig, Sockopt};
use tether_transport::{InboundConfig, InboundListener};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Tether: session-aware TCP forwarding proxy")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:1080")]
    listen: SocketAddr,

    /// Destination every connection is forwarded to (host:port)
    #[arg(long)]
    target: String,

    /// Inbound tag used by routing rules
    #[arg(long, default_value = "tunnel-in")]
    tag: String,

    /// Router configuration file (JSON); defaults to a single direct outbound
    #[arg(long)]
    config: Option<PathBuf>,

    /// Route every connection to this outbound tag, bypassing rules
    #[arg(long)]
    force_tag: Option<String>,

    /// Pin the source address of all outbound connections (set once per process)
    #[arg(long)]
    outbound_ip: Option<IpAddr>,

    /// Source address for the default direct outbound
    #[arg(long)]
    send_through: Option<IpAddr>,

    /// SO_MARK for outgoing sockets
    #[arg(long)]
    mark: Option<u32>,

    /// Network interface to bind outgoing sockets to
    #[arg(long)]
    interface: Option<String>,

    /// Prefer multiplexed outbounds
    #[arg(long)]
    mux: bool,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if let Some(log_path) = &cli.log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn router_config(cli: &Cli) -> Result<RouterConfig> {
    let mut config = match &cli.config {
        Some(path) => RouterConfig::from_file(path)
            .with_context(|| format!("Failed to load router config {}", path.display()))?,
        None => RouterConfig::direct_only(),
    };

    if cli.config.is_none() {
        if let Some(ip) = cli.send_through {
            config.outbounds[0].send_through = Some(ip);
        }
    } else if cli.send_through.is_some() {
        bail!("--send-through only applies without --config; set sendThrough per outbound instead");
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let target = Destination::parse_tcp(&cli.target)
        .with_context(|| format!("Invalid --target {:?}, expected host:port", cli.target))?;

    if let Some(ip) = cli.outbound_ip {
        RoutingConfig::global().set_outbound_ip(ip);
    }

    let dispatcher = Arc::new(router_config(&cli)?.build()?);
    info!("Outbounds: {}", dispatcher.outbounds().tags().join(", "));

    let sockopt = (cli.mark.is_some() || cli.interface.is_some()).then(|| Sockopt {
        mark: cli.mark.unwrap_or(0),
        interface: cli.interface.clone(),
    });

    let config = InboundConfig {
        listen: cli.listen,
        tag: cli.tag.clone(),
        target,
        forced_outbound_tag: cli.force_tag.clone(),
        mux_preferred: cli.mux,
        sockopt,
        sniffing: None,
        max_connections: Some(cli.max_connections),
    };

    let mut listener = InboundListener::start(config, dispatcher)
        .await
        .with_context(|| format!("Failed to listen on {}", cli.listen))?;

    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl+C")?;
    info!("Shutting down...");
    listener.stop().await;
    Ok(())
}
