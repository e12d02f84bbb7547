/// Tracing setup for the binary
///
/// File logging with daily rotation, plus console output in debug builds.
use std::path::{Path, PathBuf};

use sysinfo::System;

/// Log target for startup diagnostics
pub const LOG_TARGET_STARTUP: &str = "gesture_tint::startup";

const LOG_FILE_NAME: &str = "gesture-tint.log";

/// Log directory in the user config folder, `./logs` if there is none
pub fn default_log_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("GestureTint").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber. Call once, before anything logs.
pub fn initialize_tracing(log_dir: &Path) {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(log_dir, LOG_FILE_NAME);

    // RUST_LOG wins; info otherwise
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

pub fn log_runtime_environment() {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Starting Gesture Tint v{} on ({})",
        version,
        architecture
    );
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Operating System: {} (kernel {})",
        os_name,
        kernel
    );
    tracing::debug!(
        target: LOG_TARGET_STARTUP,
        "CPUs: {} | memory: {} MiB",
        system.cpus().len(),
        system.total_memory() / (1024 * 1024)
    );
}
