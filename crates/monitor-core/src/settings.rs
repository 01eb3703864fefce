use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Shared remote shell and live log tail for a PM2-managed bot
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bot-monitor",
    about = "Shared remote shell and live log tail for a PM2-managed bot",
    version
)]
pub struct Settings {
    /// Address to bind the web server to
    #[arg(long, env = "BOT_MONITOR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the web server to
    #[arg(long, env = "BOT_MONITOR_PORT", default_value = "4000")]
    pub port: u16,

    /// PM2 process name of the supervised bot
    #[arg(long, env = "BOT_MONITOR_NAME", default_value = "bot")]
    pub bot_name: String,

    /// Bot folder; working directory of the shared shell
    #[arg(long, env = "BOT_MONITOR_FOLDER", default_value = ".")]
    pub bot_folder: PathBuf,

    /// Shell program for the shared terminal
    #[arg(long, env = "SHELL", default_value = "sh")]
    pub shell: String,

    /// Number of log lines kept for newly connecting viewers (1-10000)
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub history_size: u32,

    /// PM2 executable
    #[arg(long, default_value = "pm2")]
    pub pm2_bin: String,

    /// PM2 home directory (defaults to ~/.pm2)
    #[arg(long, env = "PM2_HOME")]
    pub pm2_home: Option<PathBuf>,

    /// Fallback rescan interval for PM2 log files in milliseconds, used
    /// alongside file-system events
    #[arg(long, default_value = "500", value_parser = clap::value_parser!(u64).range(50..=60_000))]
    pub log_poll_ms: u64,

    /// Timezone for log timestamps (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Time format for log timestamps
    #[arg(long, default_value = "auto", value_parser = ["12h", "24h", "auto"])]
    pub time_format: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.bot-monitor/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_format: Option<String>,
}

impl LastUsedParams {
    /// `~/.bot-monitor/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".bot-monitor").join("last_used.json")
    }

    /// Load persisted params; `Default` when the file is absent or unreadable.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at `path` if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments, merge last-used values, resolve `"auto"`
    /// values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config path so tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(args: Vec<std::ffi::OsString>, config_path: &Path) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return settings.resolve_auto_values();
        }

        let last = LastUsedParams::load_from(config_path);

        // Command line and environment always win over persisted values.
        if !is_arg_explicitly_set(&matches, "host") {
            if let Some(v) = last.host {
                settings.host = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "port") {
            if let Some(v) = last.port {
                settings.port = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "bot_name") {
            if let Some(v) = last.bot_name {
                settings.bot_name = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "bot_folder") {
            if let Some(v) = last.bot_folder {
                settings.bot_folder = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "history_size") {
            if let Some(v) = last.history_size {
                settings.history_size = v.clamp(1, 10_000);
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "time_format") {
            if let Some(v) = last.time_format {
                settings.time_format = v;
            }
        }

        // Persist before resolving "auto" so detection re-runs next time.
        let _ = LastUsedParams::from(&settings).save_to(config_path);

        settings.resolve_auto_values()
    }

    /// Resolve `"auto"` sentinels and apply `--debug`.
    fn resolve_auto_values(mut self) -> Self {
        if self.timezone == "auto" {
            self.timezone = crate::time_utils::get_system_timezone();
        }

        if self.time_format == "auto" {
            let is_12h = crate::time_utils::detect_time_format(Some(&self.timezone), None);
            self.time_format = if is_12h { "12h" } else { "24h" }.to_string();
        }

        if self.debug {
            self.log_level = "DEBUG".to_string();
        }

        self
    }

    /// PM2 home directory: `--pm2-home` / `$PM2_HOME`, else `~/.pm2`.
    pub fn pm2_home_dir(&self) -> PathBuf {
        self.pm2_home.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pm2")
        })
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            host: Some(s.host.clone()),
            port: Some(s.port),
            bot_name: Some(s.bot_name.clone()),
            bot_folder: Some(s.bot_folder.clone()),
            history_size: Some(s.history_size),
            timezone: Some(s.timezone.clone()),
            time_format: Some(s.time_format.clone()),
        }
    }
}

/// `true` when `name` came from the command line or the environment rather
/// than a default. clap keys args by field name (underscores).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine | clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
        std::iter::once("bot-monitor")
            .chain(list.iter().copied())
            .map(Into::into)
            .collect()
    }

    // ── LastUsedParams ────────────────────────────────────────────────────────

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            host: Some("127.0.0.1".to_string()),
            port: Some(8080),
            bot_name: Some("ellibot".to_string()),
            bot_folder: Some(PathBuf::from("/srv/ellibot")),
            history_size: Some(250),
            timezone: Some("Europe/Berlin".to_string()),
            time_format: Some("24h".to_string()),
        };

        params.save_to(&path).expect("save");
        assert_eq!(LastUsedParams::load_from(&path), params);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let tmp = TempDir::new().expect("tempdir");
        let loaded = LastUsedParams::load_from(&tmp_config_path(&tmp));
        assert_eq!(loaded, LastUsedParams::default());
    }

    #[test]
    fn test_load_corrupt_file_returns_default() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_clear_at_missing_file_is_ok() {
        let tmp = TempDir::new().expect("tempdir");
        assert!(LastUsedParams::clear_at(&tmp_config_path(&tmp)).is_ok());
    }

    // ── CLI parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_settings_cli_defaults() {
        let s = Settings::parse_from(args(&["--shell", "sh", "--bot-name", "bot"]));
        assert_eq!(s.port, 4000);
        assert_eq!(s.history_size, 100);
        assert_eq!(s.pm2_bin, "pm2");
        assert_eq!(s.log_poll_ms, 500);
        assert_eq!(s.time_format, "auto");
        assert_eq!(s.log_level, "INFO");
        assert!(!s.debug);
    }

    #[test]
    fn test_settings_cli_values() {
        let s = Settings::parse_from(args(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--bot-name",
            "ellibot",
            "--bot-folder",
            "/srv/ellibot",
            "--shell",
            "/bin/bash",
            "--history-size",
            "500",
        ]));
        assert_eq!(s.bind_address(), "127.0.0.1:9000");
        assert_eq!(s.bot_name, "ellibot");
        assert_eq!(s.bot_folder, PathBuf::from("/srv/ellibot"));
        assert_eq!(s.shell, "/bin/bash");
        assert_eq!(s.history_size, 500);
    }

    #[test]
    fn test_settings_rejects_history_out_of_range() {
        assert!(Settings::try_parse_from(args(&["--history-size", "0"])).is_err());
        assert!(Settings::try_parse_from(args(&["--history-size", "10001"])).is_err());
    }

    #[test]
    fn test_settings_rejects_bad_time_format() {
        assert!(Settings::try_parse_from(args(&["--time-format", "36h"])).is_err());
    }

    #[test]
    fn test_pm2_home_explicit() {
        let s = Settings::parse_from(args(&["--pm2-home", "/opt/pm2"]));
        assert_eq!(s.pm2_home_dir(), PathBuf::from("/opt/pm2"));
    }

    // ── load_with_last_used_impl ──────────────────────────────────────────────

    #[test]
    fn test_load_with_last_used_merges_persisted_port() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams {
            port: Some(4321),
            timezone: Some("UTC".to_string()),
            time_format: Some("24h".to_string()),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");

        let s = Settings::load_with_last_used_impl(args(&[]), &path);
        assert_eq!(s.port, 4321);
        assert_eq!(s.timezone, "UTC");
        assert_eq!(s.time_format, "24h");
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams {
            port: Some(4321),
            ..Default::default()
        }
        .save_to(&path)
        .expect("save");

        let s = Settings::load_with_last_used_impl(args(&["--port", "5555"]), &path);
        assert_eq!(s.port, 5555);
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());

        Settings::load_with_last_used_impl(args(&["--clear"]), &path);
        assert!(!path.exists(), "file must be gone after --clear");
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let s = Settings::load_with_last_used_impl(args(&["--debug"]), &tmp_config_path(&tmp));
        assert_eq!(s.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_resolves_auto() {
        let tmp = TempDir::new().expect("tempdir");
        let s = Settings::load_with_last_used_impl(
            args(&["--timezone", "America/New_York"]),
            &tmp_config_path(&tmp),
        );
        assert_eq!(s.time_format, "12h");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);

        Settings::load_with_last_used_impl(args(&["--bot-name", "ellibot"]), &path);

        let loaded = LastUsedParams::load_from(&path);
        assert_eq!(loaded.bot_name.as_deref(), Some("ellibot"));
        assert_eq!(loaded.time_format.as_deref(), Some("auto"));
    }
}
