//! In-memory [`ProcessControl`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use monitor_core::error::{MonitorError, Result};
use monitor_core::process::{ProcessControl, ProcessStatus};

/// Records every call as `"<action> <name>"` and answers `describe` from a
/// fixed table. Flip [`RecordingControl::set_failing`] to make every call
/// fail.
#[derive(Debug, Default)]
pub struct RecordingControl {
    calls: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, ProcessStatus>>,
    failing: AtomicBool,
}

impl RecordingControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, name: &str, status: &str, uptime: i64) -> Self {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                ProcessStatus {
                    status: status.to_string(),
                    uptime,
                },
            );
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, action: &str, name: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{action} {name}"));
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::ProcessControl {
                action: action.to_string(),
                name: name.to_string(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessControl for RecordingControl {
    async fn start(&self, name: &str) -> Result<()> {
        self.record("start", name)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record("stop", name)
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.record("restart", name)
    }

    async fn describe(&self, name: &str) -> Result<Option<ProcessStatus>> {
        self.record("describe", name)?;
        Ok(self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned())
    }
}
