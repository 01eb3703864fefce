use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of a log line shown to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    /// Standard output of the shared shell.
    #[serde(rename = "SYSTEM")]
    SystemOutput,
    /// Standard error of the shared shell, and monitor-side failures.
    #[serde(rename = "ERROR")]
    ErrorOutput,
    /// A command typed by a viewer, exactly as submitted.
    #[serde(rename = "USER")]
    UserInput,
    /// Standard output of the supervised process.
    #[serde(rename = "STDOUT")]
    ProcessStdout,
    /// Standard error of the supervised process.
    #[serde(rename = "STDERR")]
    ProcessStderr,
}

impl LogKind {
    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::SystemOutput => "SYSTEM",
            LogKind::ErrorOutput => "ERROR",
            LogKind::UserInput => "USER",
            LogKind::ProcessStdout => "STDOUT",
            LogKind::ProcessStderr => "STDERR",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified line of output or input.
///
/// Only [`HistoryBuffer::append`](crate::history::HistoryBuffer::append)
/// creates these. Subscribers receive clones; nothing mutates an event once
/// it has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(rename = "msg")]
    pub message: String,
    /// Wall-clock time of day, pre-rendered in the configured timezone.
    pub time: String,
    pub timestamp: DateTime<Utc>,
}
