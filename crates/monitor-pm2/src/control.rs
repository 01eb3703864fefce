//! Process control backed by the `pm2` command-line client.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use monitor_core::error::{MonitorError, Result};
use monitor_core::process::{ProcessControl, ProcessStatus};

// ── jlist shape ───────────────────────────────────────────────────────────────

/// The subset of one `pm2 jlist` entry the monitor reads.
#[derive(Debug, Deserialize)]
struct Pm2Process {
    name: String,
    #[serde(default)]
    pm2_env: Pm2Env,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Env {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    pm_uptime: Option<i64>,
}

/// Find `name` in `pm2 jlist` output.
///
/// PM2 sometimes prints `[PM2] ...` banners or update notices ahead of the
/// JSON array, so parsing starts at the first line that opens the array.
pub fn parse_jlist(output: &str, name: &str) -> Result<Option<ProcessStatus>> {
    let unreadable = |message: String| MonitorError::ProcessControl {
        action: "describe".to_string(),
        name: name.to_string(),
        message,
    };
    let start = json_array_start(output)
        .ok_or_else(|| unreadable("pm2 jlist produced no JSON array".to_string()))?;
    let processes: Vec<Pm2Process> = serde_json::from_str(output[start..].trim_end())
        .map_err(|e| unreadable(format!("pm2 jlist output is not valid JSON: {e}")))?;

    Ok(processes.into_iter().find(|p| p.name == name).map(|p| {
        ProcessStatus {
            status: p
                .pm2_env
                .status
                .unwrap_or_else(|| ProcessStatus::OFFLINE.to_string()),
            uptime: p.pm2_env.pm_uptime.unwrap_or(0),
        }
    }))
}

fn json_array_start(output: &str) -> Option<usize> {
    let mut offset = 0;
    for line in output.split_inclusive('\n') {
        let body = line.trim_start();
        if body.starts_with("[{") || body.starts_with("[]") || body.trim_end() == "[" {
            return Some(offset + line.len() - body.len());
        }
        offset += line.len();
    }
    None
}

// ── Pm2Control ────────────────────────────────────────────────────────────────

/// [`ProcessControl`] implementation that shells out to `pm2`.
#[derive(Debug, Clone)]
pub struct Pm2Control {
    pm2_bin: String,
}

impl Pm2Control {
    pub fn new(pm2_bin: impl Into<String>) -> Self {
        Self {
            pm2_bin: pm2_bin.into(),
        }
    }

    /// Run `pm2 <args…>` and return stdout, mapping a spawn failure or a
    /// non-zero exit to [`MonitorError::ProcessControl`].
    async fn run(&self, action: &str, name: &str, args: &[&str]) -> Result<String> {
        debug!(pm2 = %self.pm2_bin, ?args, "invoking pm2");

        let output = Command::new(&self.pm2_bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MonitorError::ProcessControl {
                action: action.to_string(),
                name: name.to_string(),
                message: format!("could not run {}: {e}", self.pm2_bin),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("pm2 exited with {}", output.status)
            } else {
                stderr
            };
            warn!(action, name, %message, "pm2 command failed");
            return Err(MonitorError::ProcessControl {
                action: action.to_string(),
                name: name.to_string(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ProcessControl for Pm2Control {
    async fn start(&self, name: &str) -> Result<()> {
        self.run("start", name, &["start", name]).await.map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.run("stop", name, &["stop", name]).await.map(|_| ())
    }

    async fn restart(&self, name: &str) -> Result<()> {
        self.run("restart", name, &["restart", name]).await.map(|_| ())
    }

    async fn describe(&self, name: &str) -> Result<Option<ProcessStatus>> {
        let stdout = self.run("describe", name, &["jlist"]).await?;
        parse_jlist(&stdout, name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const JLIST: &str = r#"[
        {"name":"api","pm_id":0,"pm2_env":{"status":"stopped","pm_uptime":1700000000000}},
        {"name":"ellibot","pm_id":1,"pm2_env":{"status":"online","pm_uptime":1712345678901,"unstable_restarts":0}}
    ]"#;

    // ── parse_jlist ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_jlist_finds_process() {
        let status = parse_jlist(JLIST, "ellibot").unwrap().unwrap();
        assert_eq!(status.status, "online");
        assert_eq!(status.uptime, 1_712_345_678_901);
    }

    #[test]
    fn test_parse_jlist_unknown_process() {
        assert_eq!(parse_jlist(JLIST, "ghost").unwrap(), None);
        assert_eq!(parse_jlist("[]", "ghost").unwrap(), None);
    }

    #[test]
    fn test_parse_jlist_skips_banner() {
        let output = format!(
            "[PM2] Spawning PM2 daemon with pm2_home=/root/.pm2\n>>>> $ pm2 update\n{JLIST}\n"
        );
        let status = parse_jlist(&output, "api").unwrap().unwrap();
        assert_eq!(status.status, "stopped");
    }

    #[test]
    fn test_parse_jlist_missing_env_fields() {
        let status = parse_jlist(r#"[{"name":"bare"}]"#, "bare").unwrap().unwrap();
        assert!(status.is_offline());
        assert_eq!(status.uptime, 0);
    }

    #[test]
    fn test_parse_jlist_garbage_is_describe_failure() {
        for output in ["command not found", "[{oops"] {
            let err = parse_jlist(output, "x").unwrap_err();
            assert!(
                matches!(err, MonitorError::ProcessControl { ref action, ref name, .. } if action == "describe" && name == "x"),
                "{output:?} gave {err:?}"
            );
        }
    }

    // ── Pm2Control against a stand-in executable ──────────────────────────

    #[cfg(unix)]
    fn fake_pm2(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("pm2");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_describe_via_cli() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = format!("cat <<'JSON'\n{JLIST}\nJSON");
        let control = Pm2Control::new(fake_pm2(&dir, &script));

        let status = control.describe("ellibot").await.unwrap().unwrap();
        assert_eq!(status.status, "online");
        assert_eq!(control.describe("ghost").await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lifecycle_passes_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let script = format!("echo \"$@\" >> {}", log.display());
        let control = Pm2Control::new(fake_pm2(&dir, &script));

        control.start("ellibot").await.unwrap();
        control.restart("ellibot").await.unwrap();
        control.stop("ellibot").await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls, "start ellibot\nrestart ellibot\nstop ellibot\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_surfaces_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let control = Pm2Control::new(fake_pm2(
            &dir,
            "echo '[PM2][ERROR] Process or Namespace ghost not found' >&2; exit 1",
        ));

        let err = control.restart("ghost").await.unwrap_err();
        match err {
            MonitorError::ProcessControl {
                action,
                name,
                message,
            } => {
                assert_eq!(action, "restart");
                assert_eq!(name, "ghost");
                assert!(message.contains("not found"), "message: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_control_error() {
        let control = Pm2Control::new("/definitely/not/pm2");
        let err = control.start("bot").await.unwrap_err();
        assert!(matches!(err, MonitorError::ProcessControl { .. }));
    }
}
