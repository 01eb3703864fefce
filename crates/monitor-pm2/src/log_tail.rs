//! Follow PM2's per-process log files.
//!
//! PM2 writes each managed process's stdout and stderr to
//! `<pm2-home>/logs/<name>-out.log` and `<name>-error.log`. [`LogTailer`]
//! follows both files, starting at their current end, and forwards every newly
//! appended chunk as a [`ProcessLog`] tagged with the process name.
//!
//! Reads are triggered by `notify` events on the logs directory. A slow
//! interval rescans as well, for file systems that deliver no events and
//! for a logs directory that does not exist yet.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use monitor_core::decode::Utf8Chunker;
use monitor_core::process::{LogStream, ProcessLog};

/// Upper bound on bytes read from one file per poll.
const MAX_READ_PER_POLL: u64 = 256 * 1024;

/// PM2's log-file stem for a process name. Mirrors the
/// `[^a-zA-Z0-9\\.\\-]` replacement in PM2's app config preparation, which
/// keeps dots, dashes and backslashes.
pub fn pm2_log_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '\\') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Watch the directories holding `targets` and wake the tail loop whenever
/// one of them is created or modified.
fn start_file_watcher(
    targets: Vec<PathBuf>,
    wake: mpsc::Sender<()>,
) -> notify::Result<RecommendedWatcher> {
    let mut dirs: Vec<PathBuf> = targets
        .iter()
        .map(|p| p.parent().unwrap_or_else(|| Path::new(".")).to_path_buf())
        .collect();
    dirs.dedup();

    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                if event.paths.iter().any(|p| targets.contains(p)) {
                    // A full channel already has a wake-up pending.
                    let _ = wake.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "log file watcher error"),
        })?;

    for dir in &dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    Ok(watcher)
}

// ── FileCursor ────────────────────────────────────────────────────────────────

/// Read position in one followed file.
#[derive(Debug)]
struct FileCursor {
    stream: LogStream,
    path: PathBuf,
    offset: u64,
    decoder: Utf8Chunker,
}

impl FileCursor {
    fn new(stream: LogStream, path: PathBuf) -> Self {
        Self {
            stream,
            path,
            offset: 0,
            decoder: Utf8Chunker::new(),
        }
    }

    /// Skip whatever the file already holds.
    async fn seek_to_end(&mut self) {
        self.offset = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
    }

    /// Text appended since the last poll, if any.
    async fn poll(&mut self) -> std::io::Result<Option<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Rotated away or not created yet; pick up from the start.
                self.offset = 0;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if len < self.offset {
            debug!(path = %self.path.display(), "log file truncated; rewinding");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(None);
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file
            .take((len - self.offset).min(MAX_READ_PER_POLL))
            .read_to_end(&mut buf)
            .await?;
        self.offset += read as u64;

        let text = self.decoder.push(&buf[..read]);
        Ok((!text.is_empty()).then_some(text))
    }
}

// ── LogTailer ─────────────────────────────────────────────────────────────────

/// Follower for one process's stdout and stderr log files.
#[derive(Debug)]
pub struct LogTailer {
    process: String,
    cursors: Vec<FileCursor>,
    poll_interval: Duration,
}

impl LogTailer {
    /// Follow explicit stdout / stderr files for `process`.
    pub fn new(
        process: impl Into<String>,
        stdout_path: PathBuf,
        stderr_path: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            process: process.into(),
            cursors: vec![
                FileCursor::new(LogStream::Stdout, stdout_path),
                FileCursor::new(LogStream::Stderr, stderr_path),
            ],
            poll_interval,
        }
    }

    /// Follow the default PM2 log files for `process` under `pm2_home`.
    pub fn for_pm2_process(pm2_home: &Path, process: &str, poll_interval: Duration) -> Self {
        let logs = pm2_home.join("logs");
        let stem = pm2_log_stem(process);
        Self::new(
            process,
            logs.join(format!("{stem}-out.log")),
            logs.join(format!("{stem}-error.log")),
            poll_interval,
        )
    }

    /// Paths being followed, stdout first.
    pub fn paths(&self) -> Vec<&Path> {
        self.cursors.iter().map(|c| c.path.as_path()).collect()
    }

    /// Spawn the tail loop. It ends when the receiver is dropped or the
    /// handle is aborted.
    pub fn start(self, tx: mpsc::Sender<ProcessLog>) -> TailHandle {
        let handle = tokio::spawn(async move {
            self.tail_loop(tx).await;
        });
        TailHandle { handle }
    }

    async fn tail_loop(mut self, tx: mpsc::Sender<ProcessLog>) {
        let (wake_tx, mut wake_rx) = mpsc::channel(1);
        let targets = self.cursors.iter().map(|c| c.path.clone()).collect();
        let _watcher = match start_file_watcher(targets, wake_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "file events unavailable; falling back to rescans only");
                None
            }
        };

        for cursor in &mut self.cursors {
            cursor.seek_to_end().await;
            debug!(
                path = %cursor.path.display(),
                offset = cursor.offset,
                "following log file"
            );
        }

        let mut rescan = time::interval(self.poll_interval);
        rescan.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = rescan.tick() => {}
                Some(()) = wake_rx.recv() => {}
                _ = tx.closed() => {
                    debug!("log channel closed; stopping tail");
                    return;
                }
            }

            for cursor in &mut self.cursors {
                if !drain(cursor, &self.process, &tx).await {
                    return;
                }
            }
        }
    }
}

/// Forward everything appended to `cursor`'s file. `false` once the
/// receiver is gone.
async fn drain(cursor: &mut FileCursor, process: &str, tx: &mpsc::Sender<ProcessLog>) -> bool {
    loop {
        let data = match cursor.poll().await {
            Ok(Some(data)) => data,
            Ok(None) => return true,
            Err(e) => {
                warn!(path = %cursor.path.display(), error = %e, "failed to read log file");
                return true;
            }
        };

        let chunk = ProcessLog {
            process: process.to_string(),
            stream: cursor.stream,
            data,
        };
        if tx.send(chunk).await.is_err() {
            return false;
        }
    }
}

// ── TailHandle ────────────────────────────────────────────────────────────────

/// Handle to a running tail loop.
pub struct TailHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl TailHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(20);

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    async fn next(rx: &mut mpsc::Receiver<ProcessLog>) -> ProcessLog {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for log chunk")
            .expect("channel closed")
    }

    // ── pm2_log_stem ──────────────────────────────────────────────────────

    #[test]
    fn test_pm2_log_stem() {
        assert_eq!(pm2_log_stem("ellibot"), "ellibot");
        assert_eq!(pm2_log_stem("my bot.v2"), "my-bot.v2");
        assert_eq!(pm2_log_stem("bot.v2"), "bot.v2");
        assert_eq!(pm2_log_stem("api-server"), "api-server");
        assert_eq!(pm2_log_stem("team/bot@1"), "team-bot-1");
    }

    #[test]
    fn test_for_pm2_process_paths() {
        let tailer = LogTailer::for_pm2_process(Path::new("/home/u/.pm2"), "my_bot", POLL);
        assert_eq!(
            tailer.paths(),
            vec![
                Path::new("/home/u/.pm2/logs/my-bot-out.log"),
                Path::new("/home/u/.pm2/logs/my-bot-error.log"),
            ]
        );
    }

    // ── tailing ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_skips_existing_and_streams_new_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("bot-out.log");
        let err = dir.path().join("bot-error.log");
        append(&out, "old line that predates the monitor\n");

        let (tx, mut rx) = mpsc::channel(16);
        let handle = LogTailer::new("bot", out.clone(), err.clone(), POLL).start(tx);
        tokio::time::sleep(POLL * 5).await;

        append(&out, "ready on port 3000\n");
        let chunk = next(&mut rx).await;
        assert_eq!(chunk.process, "bot");
        assert_eq!(chunk.stream, LogStream::Stdout);
        assert_eq!(chunk.data, "ready on port 3000\n");

        append(&err, "Unhandled rejection\n");
        let chunk = next(&mut rx).await;
        assert_eq!(chunk.stream, LogStream::Stderr);
        assert_eq!(chunk.data, "Unhandled rejection\n");

        handle.abort();
    }

    #[tokio::test]
    async fn test_file_events_wake_tail_between_rescans() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("bot-out.log");
        let err = dir.path().join("bot-error.log");
        append(&out, "existing\n");

        let (tx, mut rx) = mpsc::channel(16);
        let handle =
            LogTailer::new("bot", out.clone(), err, Duration::from_secs(3600)).start(tx);
        tokio::time::sleep(Duration::from_millis(300)).await;

        append(&out, "woken by notify\n");
        let chunk = next(&mut rx).await;
        assert_eq!(chunk.stream, LogStream::Stdout);
        assert_eq!(chunk.data, "woken by notify\n");

        handle.abort();
    }

    #[tokio::test]
    async fn test_truncation_rewinds() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("bot-out.log");
        append(&out, "a fairly long line written before the monitor started\n");

        let (tx, mut rx) = mpsc::channel(16);
        let handle =
            LogTailer::new("bot", out.clone(), dir.path().join("bot-error.log"), POLL).start(tx);
        tokio::time::sleep(POLL * 5).await;

        // `pm2 flush` truncates the file.
        std::fs::write(&out, "").unwrap();
        tokio::time::sleep(POLL * 5).await;
        append(&out, "after flush\n");

        let chunk = next(&mut rx).await;
        assert_eq!(chunk.data, "after flush\n");
        handle.abort();
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(1);
        let handle = LogTailer::new(
            "bot",
            dir.path().join("o.log"),
            dir.path().join("e.log"),
            POLL,
        )
        .start(tx);
        drop(rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("tail loop should exit once the receiver is gone");
    }
}
