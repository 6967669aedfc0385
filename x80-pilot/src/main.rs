//! X80 pilot: entry point.
//!
//! ```text
//! x80-pilot                      Connect with x80-pilot.toml (or defaults)
//! x80-pilot --config <path>      Load a custom config TOML
//! x80-pilot --drone <ip>         Override the drone address
//! x80-pilot --no-video           Do not start the video stream
//! x80-pilot --json               Print telemetry as JSON lines
//! x80-pilot --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use x80_pilot::config::PilotConfig;
use x80_pilot::session::PilotSession;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "x80-pilot", about = "Operator console for the X80 quadcopter")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "x80-pilot.toml")]
    config: PathBuf,

    /// Drone IP address, overriding the config file.
    #[arg(long)]
    drone: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Do not send the video start command on connect.
    #[arg(long)]
    no_video: bool,

    /// Print telemetry as JSON lines.
    #[arg(long)]
    json: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&PilotConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply CLI overrides. Load errors are logged once
    // tracing is up.
    let (mut config, load_error) = match PilotConfig::try_load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (PilotConfig::default(), Some(e)),
    };
    if let Some(ip) = cli.drone {
        config.drone.ip = ip;
    }
    if cli.no_video {
        config.session.video_on_connect = false;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("x80-pilot v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) if e.is_missing() => info!("{e}; using defaults"),
        Some(e) => warn!("{e}; using defaults"),
        None => info!("config: {}", cli.config.display()),
    }
    info!(
        "drone: {} (control {}, video {})",
        config.drone.ip, config.drone.control_port, config.drone.video_port
    );
    info!("auto-reconnect: {}", config.session.auto_reconnect);

    let mut session = PilotSession::new(&config, cli.json)?;
    let stop = session.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    session.run().await?;

    Ok(())
}
