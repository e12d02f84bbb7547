use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;

use gesture_tint::logging::{self, LOG_TARGET_STARTUP};
use gesture_tint::{
    AppResult, Config, ReplayVideoSource, ScriptedLoader, Session, SessionStatus, VideoSource,
};

#[derive(Parser, Debug)]
#[command(name = "gesture-tint", version, about = "Hand gesture classifier driving a UI color")]
struct Args {
    /// Configuration file (default: <config dir>/GestureTint/config.json).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of png/jpeg frames to replay as video.
    #[arg(long)]
    frames: Option<PathBuf>,
    /// JSON detection script for the scripted detector.
    #[arg(long)]
    script: Option<PathBuf>,
}

fn main() -> AppResult<()> {
    let args = Args::parse();

    logging::initialize_tracing(&logging::default_log_dir());
    logging::log_runtime_environment();

    println!("===========================================");
    println!("  Gesture Tint - Hand Gesture Classifier");
    println!("===========================================\n");

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()
            .context("No config directory on this platform; pass --config")?,
    };
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    println!("✓ Configuration loaded");
    println!(
        "  Tick: {}ms | timeout: {}ms",
        config.tick_interval_ms, config.classify_timeout_ms
    );
    println!("  Confidence threshold: {:.2}\n", config.model.confidence_threshold);

    let frames_dir = args
        .frames
        .or_else(|| config.frames_dir.clone())
        .context("No frames directory; pass --frames or set frames_dir in the config")?;
    let script_path = args
        .script
        .or_else(|| config.script_path.clone())
        .context("No detection script; pass --script or set script_path in the config")?;

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Frames: {} | script: {}",
        frames_dir.display(),
        script_path.display()
    );

    let video: Arc<dyn VideoSource> = Arc::new(ReplayVideoSource::from_dir(
        frames_dir,
        config.model.mirror_input,
    ));
    let session = Session::new(config, ScriptedLoader::from_path(script_path), video);

    session.on_state_change(|previous, next| {
        tracing::info!("State: {} → {} (color {})", previous, next, next.color_hex());
        println!("● {:<10} {}", next.to_string(), next.color_hex());
    });
    session.on_status_change(|_, next| {
        if let SessionStatus::Failed(kind) = next {
            tracing::error!("Session failed: {:?}", kind);
        }
    });

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    session.start().context("Failed to start gesture session")?;
    println!("✓ Running - press Ctrl-C to stop\n");

    let _ = stop_rx.recv();
    println!("\nStopping...");
    session.shutdown();

    let stats = session.stats();
    println!(
        "✓ Stopped after {} ticks ({} classified, {} errors)",
        stats.ticks, stats.classifications, stats.detection_errors
    );
    Ok(())
}
