use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_config::RelayConfig;
use relay_reactor::Reactor;
use relay_server::listener::ServerListener;
use relay_server::routes;

/// The relay HTTP server.
///
/// Configuration is loaded from (in order, later wins):
/// 1. Compiled defaults
/// 2. /etc/relay/config.toml
/// 3. ~/.config/relay/config.toml
/// 4. ./relay.toml (or --config path)
/// 5. Environment variables (RELAY_*)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides ./relay.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Show loaded configuration and exit
    #[arg(long)]
    show_config: bool,
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
        libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) =
        relay_config::load_with_sources(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    if cli.show_config {
        println!("{}", toml::to_string_pretty(&config).context("failed to render configuration")?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .init();

    tracing::info!("configuration loaded");
    for path in &sources.files {
        tracing::info!(path = %path.display(), "config file");
    }
    if !sources.env_overrides.is_empty() {
        tracing::info!(overrides = ?sources.env_overrides, "environment overrides applied");
    }

    run(config)
}

fn run(config: RelayConfig) -> Result<()> {
    let addr = config.bind.parse().with_context(|| format!("invalid bind address: {}", config.bind))?;

    let (reactor, panic_rx) = Reactor::new(config.workers).context("failed to start reactor")?;
    let reactor = Arc::new(reactor);
    let router = Arc::new(routes::default_router());

    let _listener = ServerListener::bind(addr, reactor.clone(), router).with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, workers = config.workers, "relay-server listening");

    install_signal_handlers();

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            tracing::info!("shutdown signal received");
            break;
        }
        while let Ok(report) = panic_rx.try_recv() {
            tracing::error!(?report, "panic caught in reactor callback");
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    reactor.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}
