mod bootstrap;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use monitor_core::settings::Settings;
use monitor_core::time_utils::ClockFormatter;
use monitor_pm2::{LogTailer, Pm2Control};
use monitor_runtime::{Monitor, MonitorConfig};

/// Buffered PM2 log chunks between the tailer and the monitor.
const PROCESS_LOG_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Bot Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Bot: {}, Folder: {}, Shell: {}, Timezone: {} ({})",
        settings.bot_name,
        settings.bot_folder.display(),
        settings.shell,
        settings.timezone,
        settings.time_format
    );

    let bot_folder = bootstrap::resolve_bot_folder(&settings.bot_folder)?;
    let clock = ClockFormatter::from_settings(&settings.timezone, &settings.time_format);

    let (log_tx, log_rx) = mpsc::channel(PROCESS_LOG_CAPACITY);
    let tailer = LogTailer::for_pm2_process(
        &settings.pm2_home_dir(),
        &settings.bot_name,
        Duration::from_millis(settings.log_poll_ms),
    );
    for path in tailer.paths() {
        tracing::info!("Following PM2 log {}", path.display());
    }
    let tail = tailer.start(log_tx);

    let config = MonitorConfig {
        bot_name: settings.bot_name.clone(),
        bot_folder,
        shell: Some(settings.shell.clone()),
        history_size: settings.history_size as usize,
        clock,
    };
    let control = Arc::new(Pm2Control::new(settings.pm2_bin.clone()));
    let monitor = Monitor::start(config, control, log_rx)
        .context("the shared shell could not be started; the monitor cannot run without it")?;

    let address = settings.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not listen on {address}"))?;

    monitor_web::serve(listener, monitor.clone(), shutdown_signal()).await?;

    tail.abort();
    monitor.shutdown();
    tracing::info!("Bot Monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl+C received; shutting down"),
        Err(e) => {
            tracing::warn!("Could not listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
