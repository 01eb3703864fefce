//! The single owned monitor context.
//!
//! [`Monitor::start`] builds the history, the fan-out, the shared shell, the
//! event pump and the process log forwarder once, and hands back a cheap
//! clonable handle that the transport layer threads through its handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use monitor_core::error::Result;
use monitor_core::events::LogEvent;
use monitor_core::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use monitor_core::process::{ControlAction, ProcessControl, ProcessLog, ProcessStatus};
use monitor_core::time_utils::ClockFormatter;

use crate::control::ControlFacade;
use crate::fanout::{Fanout, Subscription};
use crate::orchestrator::{event_channel, forward_process_logs, EventPump};
use crate::shell_session::{ShellConfig, ShellSession, ShellTasks};

/// What the monitor needs to know at startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Name of the supervised process as the process manager knows it.
    pub bot_name: String,
    /// Shell working directory and root of the reload script.
    pub bot_folder: PathBuf,
    /// Preferred shell program; `None` means the POSIX default.
    pub shell: Option<String>,
    pub history_size: usize,
    pub clock: ClockFormatter,
}

impl MonitorConfig {
    pub fn new(bot_name: impl Into<String>, bot_folder: impl Into<PathBuf>) -> Self {
        Self {
            bot_name: bot_name.into(),
            bot_folder: bot_folder.into(),
            shell: None,
            history_size: DEFAULT_HISTORY_CAPACITY,
            clock: ClockFormatter::default(),
        }
    }
}

struct MonitorInner {
    bot_name: String,
    fanout: Fanout,
    shell: ShellSession,
    facade: ControlFacade,
    shell_tasks: ShellTasks,
    pump: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.shell_tasks.abort();
        self.forwarder.abort();
        self.pump.abort();
    }
}

/// Handle to the running monitor. Clones share everything.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    /// Spawn the shared shell and background tasks.
    ///
    /// Fails only when the shell cannot be started.
    pub fn start(
        config: MonitorConfig,
        control: Arc<dyn ProcessControl>,
        process_logs: mpsc::Receiver<ProcessLog>,
    ) -> Result<Self> {
        let fanout = Fanout::new(HistoryBuffer::new(config.history_size, config.clock));
        let (events_tx, events_rx) = event_channel();
        let pump = EventPump::new(fanout.clone()).start(events_rx);

        let shell_config = ShellConfig::new(config.shell.as_deref(), &config.bot_folder);
        let (shell, shell_tasks) = match ShellSession::spawn(&shell_config, events_tx.clone()) {
            Ok(spawned) => spawned,
            Err(e) => {
                pump.abort();
                return Err(e);
            }
        };

        let forwarder = forward_process_logs(config.bot_name.clone(), process_logs, events_tx);
        let facade = ControlFacade::new(control, shell.clone(), &config.bot_folder);

        info!(
            bot = %config.bot_name,
            folder = %config.bot_folder.display(),
            shell = %shell.program(),
            history = config.history_size,
            "monitor started"
        );

        Ok(Self {
            inner: Arc::new(MonitorInner {
                bot_name: config.bot_name,
                fanout,
                shell,
                facade,
                shell_tasks,
                pump,
                forwarder,
            }),
        })
    }

    pub fn bot_name(&self) -> &str {
        &self.inner.bot_name
    }

    /// Run a viewer's command in the shared shell.
    pub async fn submit_command(&self, command: &str) -> Result<()> {
        self.inner.shell.submit(command).await
    }

    /// Register a viewer. See [`Fanout::connect`].
    pub fn connect(&self) -> Subscription {
        self.inner.fanout.connect()
    }

    /// Apply a lifecycle action to the supervised process.
    pub async fn control(&self, action: ControlAction) -> Result<()> {
        self.inner
            .facade
            .control_action(action, &self.inner.bot_name)
            .await
    }

    /// Never fails; unknown or unreachable reports offline.
    pub async fn status(&self) -> ProcessStatus {
        self.inner.facade.status(&self.inner.bot_name).await
    }

    pub fn history(&self) -> Vec<LogEvent> {
        self.inner.fanout.snapshot()
    }

    pub fn shell_alive(&self) -> bool {
        self.inner.shell.is_alive()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.fanout.subscriber_count()
    }

    /// Kill the shell and stop background tasks.
    pub fn shutdown(&self) {
        info!("monitor shutting down");
        self.inner.shell_tasks.abort();
        self.inner.forwarder.abort();
        self.inner.pump.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
