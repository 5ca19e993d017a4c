//! biomood demo - run a monitoring session against the synthetic camera
//!
//! Streams mood switches to the log while running and prints the final
//! monitor snapshot as JSON on exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use biomood_lib::vision::synthetic::{SyntheticConfig, SyntheticDetector, SyntheticSource};
use biomood_lib::{MonitorController, MonitorSettings, SettingsStore, StartOutcome};

#[derive(Parser)]
#[command(name = "biomood")]
#[command(about = "Heart rate, blink rate and mood from a camera feed", long_about = None)]
struct Cli {
    /// Settings file (JSON); created with defaults on first update
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// How long to monitor before stopping
    #[arg(long, default_value = "45")]
    seconds: u64,

    /// Pulse frequency of the synthetic subject, in Hz
    #[arg(long, default_value = "1.2")]
    pulse_hz: f64,

    /// Seconds between synthetic blinks (0 disables blinking)
    #[arg(long, default_value = "4")]
    blink_every_secs: u64,

    /// Override the mood dwell period, in seconds
    #[arg(long)]
    dwell_secs: Option<u64>,
}

fn load_settings(cli: &Cli) -> Result<MonitorSettings> {
    let settings = match &cli.settings {
        Some(path) => SettingsStore::new(path.clone())
            .with_context(|| format!("loading settings from {}", path.display()))?
            .settings(),
        None => MonitorSettings::default(),
    };
    let mut settings = settings.with_env_overrides();
    if let Some(dwell) = cli.dwell_secs {
        settings.mood.dwell_secs = dwell;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let source = SyntheticSource::new(SyntheticConfig {
        fps: settings.rate.sample_rate_hz,
        pulse_hz: cli.pulse_hz,
        blink_every: (cli.blink_every_secs > 0).then(|| Duration::from_secs(cli.blink_every_secs)),
        ..SyntheticConfig::default()
    });

    let controller = MonitorController::new(
        settings,
        Arc::new(source),
        Arc::new(SyntheticDetector::default()),
    )?;

    let mut moods = controller.subscribe_moods();
    let mood_log = tokio::spawn(async move {
        loop {
            match moods.recv().await {
                Ok(change) => info!(
                    "mood: {} -> {} (tag {})",
                    change
                        .previous
                        .map(|prev| prev.to_string())
                        .unwrap_or_else(|| "none".into()),
                    change.category,
                    change.tag
                ),
                Err(RecvError::Lagged(skipped)) => warn!("missed {skipped} mood changes"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if controller.start().await? == StartOutcome::AlreadyRunning {
        warn!("a session was already running");
    }
    info!(
        "monitoring for {}s, starting in {}",
        cli.seconds,
        controller.provisional_mood()
    );

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.seconds)) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    controller.stop().await;
    let snapshot = controller.snapshot().await;
    let diagnostics = controller.diagnostics().await;
    drop(controller);
    mood_log.abort();

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    info!(
        "processed {} frames, {} without a face, {} read failures",
        diagnostics.frames_processed,
        diagnostics.frames_without_face,
        diagnostics.transient_read_failures + diagnostics.unexpected_read_failures
    );

    Ok(())
}
