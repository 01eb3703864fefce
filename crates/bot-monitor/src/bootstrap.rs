use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// `~/.bot-monitor/`, or `./.bot-monitor/` without a home directory.
pub fn monitor_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bot-monitor")
}

/// Ensure `~/.bot-monitor/` and `~/.bot-monitor/logs/` exist.
pub fn ensure_directories() -> anyhow::Result<()> {
    let dir = monitor_dir();
    std::fs::create_dir_all(dir.join("logs"))
        .with_context(|| format!("could not create {}", dir.display()))?;
    Ok(())
}

/// Resolve the bot folder to an absolute path. A missing folder is a
/// startup error; the shell could not be started in it anyway.
pub fn resolve_bot_folder(folder: &Path) -> anyhow::Result<PathBuf> {
    let resolved = std::fs::canonicalize(folder)
        .with_context(|| format!("bot folder {} is not accessible", folder.display()))?;
    anyhow::ensure!(
        resolved.is_dir(),
        "bot folder {} is not a directory",
        resolved.display()
    );
    Ok(resolved)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name onto an [`EnvFilter`] directive.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `log_level` when set. Output goes to stderr, and is
/// also appended to `log_file` when one is given.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(log_level)));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("could not open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("logging was already initialised")?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── ensure_directories ────────────────────────────────────────────────

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");

        // Override HOME so that dirs::home_dir() resolves to our temp dir.
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", tmp.path());

        let result = ensure_directories();

        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        result.expect("ensure_directories should succeed");
        let dir = tmp.path().join(".bot-monitor");
        assert!(dir.is_dir(), ".bot-monitor dir must exist");
        assert!(dir.join("logs").is_dir(), "logs subdir must exist");
    }

    // ── resolve_bot_folder ────────────────────────────────────────────────

    #[test]
    fn test_resolve_bot_folder_absolute() {
        let tmp = TempDir::new().expect("tempdir");
        let nested = tmp.path().join("bot");
        std::fs::create_dir(&nested).unwrap();

        let resolved = resolve_bot_folder(&nested.join("..").join("bot")).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, nested.canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_bot_folder_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let err = resolve_bot_folder(&tmp.path().join("gone")).unwrap_err();
        assert!(err.to_string().contains("not accessible"));
    }

    #[test]
    fn test_resolve_bot_folder_rejects_file() {
        let tmp = TempDir::new().expect("tempdir");
        let file = tmp.path().join("index.js");
        std::fs::write(&file, "").unwrap();
        assert!(resolve_bot_folder(&file).is_err());
    }

    // ── level_directive ───────────────────────────────────────────────────

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("nonsense"), "info");
    }
}
