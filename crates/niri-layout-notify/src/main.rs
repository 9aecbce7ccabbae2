//! niri-layout-notify
//!
//! Watches niri's event stream and shows a desktop notification whenever the
//! active keyboard layout changes.

mod logging;
mod notify;
mod watcher;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::notify::DbusNotifier;
use crate::watcher::EventStream;

#[derive(Parser, Debug)]
#[command(name = "niri-layout-notify")]
#[command(about = "Desktop notifications for niri keyboard layout switches")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/niri-layout-notify/config.kdl")]
    config: String,

    /// Validate the configuration file and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();

    let config = logging::with_bootstrap(|| niri_layout_notify_config::load_config(&config_path))
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    if args.check {
        println!("Configuration is valid: {}", config_path.display());
        println!("  Log level: {}", config.global.log_level.as_filter_str());
        println!("  Log target: {}", config.global.log_target.as_str());
        println!("  Connect retries: {}", config.global.connect_retries);
        println!(
            "  Notification: \"{}\" from {} ({} ms)",
            config.notification.summary,
            config.notification.app_name,
            config.notification.timeout_ms
        );
        return Ok(());
    }

    logging::init(&config.global).context("Failed to set up logging")?;
    tracing::info!("Starting niri layout notifier");

    let stream = EventStream::connect_with_retry(config.global.connect_retries)
        .await
        .context("Could not subscribe to niri events")?;
    tracing::info!(
        "Watching keyboard layouts on {}",
        stream.socket_path().display()
    );

    let mut notifier = DbusNotifier::new(config.notification);
    let summary = stream.run(&mut notifier).await?;

    tracing::info!(
        lines = summary.lines,
        notifications = summary.notifications,
        failed_notifications = summary.failed_notifications,
        compositor_errors = summary.compositor_errors,
        phase = ?summary.phase,
        "niri closed the event stream"
    );
    tracing::info!("Shutting down niri layout notifier");

    Ok(())
}
