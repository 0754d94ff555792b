//! memwatch - version 0.1.0
//!
//! Memory telemetry and leak detection service with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, level_filters::LevelFilter, warn};

use cli::{Args, LogLevel};
use commands::run_command;
use memwatch::config::{find_default_config, render_config, ConfigService};
use memwatch::handlers;
use memwatch::monitor::Monitor;
use memwatch::process::{ProcScanner, ProcUsageReader};
use memwatch::state::AppState;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Config file to use: `--config`, else the first default location found.
fn config_source(args: &Args) -> Option<PathBuf> {
    if args.no_config {
        return None;
    }
    args.config.clone().or_else(find_default_config)
}

/// Loads and validates configuration, exiting with code 1 when invalid.
fn load_validated_config(args: &Args) -> ConfigService {
    match ConfigService::load(config_source(args), args.overrides()) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Reloads configuration on every SIGHUP. A failed reload keeps the old config.
#[cfg(unix)]
fn spawn_reload_on_sighup(config: Arc<ConfigService>) {
    tokio::spawn(async move {
        let mut hup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("SIGHUP reload unavailable: {}", e);
                return;
            }
        };
        while hup.recv().await.is_some() {
            info!("Received SIGHUP, reloading configuration");
            if let Err(e) = config.reload() {
                error!("Configuration reload failed, keeping previous config: {}", e);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_sighup(_config: Arc<ConfigService>) {}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let service = load_validated_config(&args);

        if args.check_config {
            println!("✅ Configuration is valid");
            return Ok(());
        }

        let rendered = render_config(&service.current().config, args.config_format.into())?;
        print!("{}", rendered);
        return Ok(());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        return run_command(command, || Ok(load_validated_config(&args).current().config.clone()));
    }

    setup_logging(&args)?;

    let config = Arc::new(load_validated_config(&args));
    if let Some(path) = config.source() {
        info!("Using configuration file: {}", path.display());
    } else {
        info!("No configuration file, using defaults");
    }
    spawn_reload_on_sighup(Arc::clone(&config));

    let server = config.current().config.server.clone();
    let monitor = Arc::new(Monitor::new(
        Arc::clone(&config),
        Arc::new(ProcScanner::default()),
        Arc::new(ProcUsageReader::default()),
    ));
    monitor.start();

    let state = Arc::new(AppState::new(Arc::clone(&monitor))?);
    let app = handlers::router(state);

    let addr: SocketAddr = format!("{}:{}", server.bind, server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", server.bind, server.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("memwatch listening on http://{}", addr);

    // Open /stream responses only end once their subscription is closed.
    let hub = Arc::clone(&monitor.hub);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            hub.close_all();
        })
        .await;

    monitor.stop().await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("memwatch stopped gracefully");
    Ok(())
}
