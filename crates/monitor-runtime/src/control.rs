//! Lifecycle actions and status for the supervised process.
//!
//! `start`, `stop` and `restart` go to the process manager. Reload does not:
//! it runs the bot's registration script through the shared shell, so its
//! output lands in the same log stream as every other command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use monitor_core::error::Result;
use monitor_core::process::{ControlAction, ProcessControl, ProcessStatus};

use crate::shell_session::ShellSession;

/// Shell command that re-registers the bot, built only from `bot_folder`.
pub fn reload_command(bot_folder: &Path) -> String {
    let folder = bot_folder.display();
    format!(r#"node -r "{folder}/node_modules/dotenv/config.js" "{folder}/register.js""#)
}

#[derive(Clone)]
pub struct ControlFacade {
    control: Arc<dyn ProcessControl>,
    shell: ShellSession,
    bot_folder: PathBuf,
}

impl ControlFacade {
    pub fn new(
        control: Arc<dyn ProcessControl>,
        shell: ShellSession,
        bot_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            control,
            shell,
            bot_folder: bot_folder.into(),
        }
    }

    /// Run `action` against `name`. Failures come back as errors; nothing
    /// is swallowed.
    pub async fn control_action(&self, action: ControlAction, name: &str) -> Result<()> {
        info!(%action, name, "control action requested");
        let result = match action {
            ControlAction::Start => self.control.start(name).await,
            ControlAction::Stop => self.control.stop(name).await,
            ControlAction::Restart => self.control.restart(name).await,
            ControlAction::Reload => return self.reload(name).await,
        };
        if let Err(e) = &result {
            warn!(%action, name, error = %e, "control action failed");
        }
        result
    }

    /// Submit the registration script to the shared shell.
    pub async fn reload(&self, name: &str) -> Result<()> {
        let command = reload_command(&self.bot_folder);
        info!(name, %command, "reloading through the shared shell");
        self.shell.submit(&command).await
    }

    /// Current state of `name`. Unknown names and manager errors both
    /// report offline.
    pub async fn status(&self, name: &str) -> ProcessStatus {
        match self.control.describe(name).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!(name, "process not known to manager");
                ProcessStatus::offline()
            }
            Err(e) => {
                warn!(name, error = %e, "status query failed; reporting offline");
                ProcessStatus::offline()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
