//! Event pump.
//!
//! Every producer (shell reader tasks, command submission, the process log
//! source) sends [`MonitorEvent`]s into one channel. A single pump task
//! drains it into the [`Fanout`], so arrival order on the channel is the
//! order every viewer sees.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use monitor_core::events::LogKind;
use monitor_core::process::ProcessLog;

use crate::fanout::Fanout;

/// Buffered events between producers and the pump.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── Public types ──────────────────────────────────────────────────────────────

/// Something a producer wants viewers to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Log { kind: LogKind, message: String },
    PathUpdate(String),
}

impl MonitorEvent {
    pub fn log(kind: LogKind, message: impl Into<String>) -> Self {
        MonitorEvent::Log {
            kind,
            message: message.into(),
        }
    }
}

pub fn event_channel() -> (mpsc::Sender<MonitorEvent>, mpsc::Receiver<MonitorEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

// ── EventPump ─────────────────────────────────────────────────────────────────

/// Drains the event channel into a [`Fanout`].
pub struct EventPump {
    fanout: Fanout,
}

impl EventPump {
    pub fn new(fanout: Fanout) -> Self {
        Self { fanout }
    }

    /// Spawn the pump. It runs until every sender is dropped.
    pub fn start(self, mut rx: mpsc::Receiver<MonitorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.dispatch(event);
            }
            tracing::debug!("event channel closed; pump exiting");
        })
    }

    fn dispatch(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::Log { kind, message } => {
                self.fanout.publish(kind, &message);
            }
            MonitorEvent::PathUpdate(path) => self.fanout.publish_path(&path),
        }
    }
}

// ── Process log forwarding ────────────────────────────────────────────────────

/// Convert a raw process log chunk into an event, if it belongs to `target`
/// and carries any text. Trailing whitespace is dropped; leading indentation
/// (stack traces) is kept.
pub fn process_log_event(target: &str, log: ProcessLog) -> Option<MonitorEvent> {
    if log.process != target {
        return None;
    }
    let message = log.data.trim_end();
    if message.trim_start().is_empty() {
        return None;
    }
    Some(MonitorEvent::log(log.stream.kind(), message))
}

/// Spawn a task forwarding `target`'s chunks from a log source into the
/// event channel. Ends when either side closes.
pub fn forward_process_logs(
    target: String,
    mut logs: mpsc::Receiver<ProcessLog>,
    events: mpsc::Sender<MonitorEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(log) = logs.recv().await {
            let Some(event) = process_log_event(&target, log) else {
                continue;
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
        tracing::debug!(process = %target, "process log source closed");
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
