//! RhinoBridge Daemon - Main entry point
//!
//! Runs the asset socket listener and imports received assets into a
//! headless scene document from an idle loop.

mod config;
mod context;
mod events;
mod listener;

use anyhow::Result;
use clap::Parser;
use rhinobridge_core::{Settings, TomlSettingsStore};
use rhinobridge_import::{ImportError, SceneHost};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::context::BridgeContext;

#[derive(Parser, Debug)]
#[command(name = "rhinobridge")]
#[command(about = "Asset bridge: receives exported assets and imports them into a scene")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rhinobridge.toml")]
    config: PathBuf,

    /// Listen on this port (persisted to the settings file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Reset the persisted settings to their defaults before starting
    #[arg(long)]
    restore_defaults: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("RhinoBridge v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = config::load_config(&args.config)?;

    let store = TomlSettingsStore::open(Path::new(&config.settings.path))?;
    let mut ctx = BridgeContext::new(Settings::new(store), config.to_listener_options());

    if args.restore_defaults {
        ctx.restore_default_settings()?;
    }
    if let Some(port) = args.port {
        ctx.set_port(port)?;
    }

    info!(
        settings = %ctx.settings().store().path().display(),
        port = ctx.settings().port(),
        preview = %ctx.settings().preview_geometry().as_str(),
        flavor = %ctx.settings().geometry_flavor().as_str(),
        scale_materials = ctx.settings().should_scale_materials(),
        units = ?config.document.units,
        "Configuration loaded"
    );

    let mut host = SceneHost::new();
    host.open_document(config.document.units);

    // The listener owns its own runtime and thread; starting and stopping it blocks
    tokio::task::block_in_place(|| ctx.start_server())?;

    let mut tick = tokio::time::interval(Duration::from_millis(config.idle.tick_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match ctx.on_idle(&mut host) {
                    Ok(_) => {}
                    // Asset stays queued until a document is available
                    Err(ImportError::NoActiveDocument) => {}
                    Err(e) => warn!(error = %e, "Idle import stopped"),
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    // Assets received by in-flight connections are queued once the
    // listener has stopped
    tokio::task::block_in_place(|| ctx.end_server());
    match ctx.drain(&mut host) {
        Ok(0) => {}
        Ok(count) => info!(count = count, "Imported remaining assets"),
        Err(e) => warn!(error = %e, pending = ctx.queue().len(), "Could not import remaining assets"),
    }

    if let Some(output) = &config.document.output {
        host.save_json(Path::new(output))?;
    }

    Ok(())
}
