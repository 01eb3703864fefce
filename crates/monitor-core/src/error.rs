use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the bot monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The persistent shell could not be started.
    #[error("Failed to spawn shell {program} in {cwd}: {source}")]
    ShellSpawn {
        program: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persistent shell has exited; commands can no longer be delivered.
    #[error("Shell is not running")]
    ShellUnavailable,

    /// The process manager rejected or failed a lifecycle call.
    #[error("Process control {action} failed for {name}: {message}")]
    ProcessControl {
        action: String,
        name: String,
        message: String,
    },

    /// A lifecycle action name outside the supported set.
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_shell_spawn() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = MonitorError::ShellSpawn {
            program: "/bin/nope".to_string(),
            cwd: PathBuf::from("/srv/bot"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to spawn shell"));
        assert!(msg.contains("/bin/nope"));
        assert!(msg.contains("/srv/bot"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_shell_unavailable() {
        assert_eq!(
            MonitorError::ShellUnavailable.to_string(),
            "Shell is not running"
        );
    }

    #[test]
    fn test_error_display_process_control() {
        let err = MonitorError::ProcessControl {
            action: "restart".to_string(),
            name: "bot".to_string(),
            message: "process or namespace not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Process control restart failed for bot: process or namespace not found"
        );
    }

    #[test]
    fn test_error_display_unknown_action() {
        let err = MonitorError::UnknownAction("explode".to_string());
        assert_eq!(err.to_string(), "Unknown action: explode");
    }
}
