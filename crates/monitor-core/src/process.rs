//! Contract with the external process manager.
//!
//! The monitor never starts or stops the supervised process itself. It asks a
//! [`ProcessControl`] implementation to, and it receives that process's output
//! as [`ProcessLog`] chunks pushed by a log source.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::events::LogKind;

// ── Actions ───────────────────────────────────────────────────────────────────

/// Lifecycle actions a viewer may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    /// Re-run the bot's registration script through the shared shell.
    /// Never reaches the process manager.
    #[serde(rename = "register")]
    Reload,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Reload => "register",
        }
    }
}

impl FromStr for ControlAction {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "register" | "reload" => Ok(ControlAction::Reload),
            other => Err(MonitorError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// State reported for the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// Process-manager state such as `"online"`, `"stopped"`, `"errored"`.
    pub status: String,
    /// Epoch milliseconds of the last start, or `0` when not running.
    pub uptime: i64,
}

impl ProcessStatus {
    pub const OFFLINE: &'static str = "offline";

    /// Result used whenever the process is unknown or cannot be described.
    pub fn offline() -> Self {
        Self {
            status: Self::OFFLINE.to_string(),
            uptime: 0,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status == Self::OFFLINE
    }
}

// ── Capability ────────────────────────────────────────────────────────────────

/// Start, stop, restart and describe processes by name.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn restart(&self, name: &str) -> Result<()>;

    /// `Ok(None)` when the manager does not know `name`.
    async fn describe(&self, name: &str) -> Result<Option<ProcessStatus>>;
}

// ── Log source ────────────────────────────────────────────────────────────────

/// Which output stream of the supervised process a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn kind(&self) -> LogKind {
        match self {
            LogStream::Stdout => LogKind::ProcessStdout,
            LogStream::Stderr => LogKind::ProcessStderr,
        }
    }
}

/// A raw chunk of output from a managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLog {
    pub process: String,
    pub stream: LogStream,
    pub data: String,
}
