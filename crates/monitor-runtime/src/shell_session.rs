//! The single persistent shell shared by every viewer.
//!
//! [`ShellSession`] spawns one shell with piped stdin/stdout/stderr. Commands
//! are written to stdin followed by a working-directory probe; output is
//! read back by two long-lived reader tasks that classify raw chunks into
//! [`MonitorEvent`]s. Nothing waits for a command to finish: a command that
//! never completes just never produces more output.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use monitor_core::decode::Utf8Chunker;
use monitor_core::error::{MonitorError, Result};
use monitor_core::events::LogKind;
use monitor_core::marker::{classify_output, probe_line};

use crate::orchestrator::MonitorEvent;

/// Shell used when the environment does not name one.
pub const DEFAULT_SHELL: &str = "sh";

/// `TERM` value forced on the shell so programs skip full-screen escapes.
pub const SHELL_TERM: &str = "dumb";

const READ_BUFFER_SIZE: usize = 8192;

/// How long the readers get to flush after the shell exits. Background jobs
/// can hold the pipes open indefinitely.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

// ── ShellConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Program to run; `$SHELL` in practice.
    pub program: String,
    /// Working directory the shell starts in.
    pub cwd: PathBuf,
}

impl ShellConfig {
    /// Pick the shell from a preference such as `$SHELL`, falling back to
    /// [`DEFAULT_SHELL`] when it is unset or blank.
    pub fn new(preference: Option<&str>, cwd: impl Into<PathBuf>) -> Self {
        let program = preference
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SHELL)
            .to_string();
        Self {
            program,
            cwd: cwd.into(),
        }
    }
}

// ── Chunk classification ──────────────────────────────────────────────────────

/// Events produced by one stdout chunk.
pub fn stdout_events(chunk: &str) -> Vec<MonitorEvent> {
    let classified = classify_output(chunk);
    let mut events = Vec::with_capacity(2);
    if let Some(output) = classified.output {
        events.push(MonitorEvent::log(LogKind::SystemOutput, output));
    }
    if let Some(path) = classified.path {
        events.push(MonitorEvent::PathUpdate(path));
    }
    events
}

/// Events produced by one stderr chunk. Never parsed for the path marker.
pub fn stderr_events(chunk: &str) -> Vec<MonitorEvent> {
    let trimmed = chunk.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![MonitorEvent::log(LogKind::ErrorOutput, trimmed)]
}

// ── ShellSession ──────────────────────────────────────────────────────────────

struct ShellInner {
    program: String,
    stdin: Mutex<Option<ChildStdin>>,
    alive: AtomicBool,
    events: mpsc::Sender<MonitorEvent>,
}

impl ShellInner {
    async fn emit(&self, event: MonitorEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event channel closed; dropping shell event");
        }
    }

    /// Flip to dead and tell viewers, once.
    async fn mark_dead(&self, reason: String) {
        if self.alive.swap(false, Ordering::SeqCst) {
            warn!(shell = %self.program, %reason, "shell is no longer running");
            self.emit(MonitorEvent::log(LogKind::ErrorOutput, reason)).await;
        }
    }
}

/// Handle to the shared shell. Cheap to clone; all clones drive the same
/// subprocess.
#[derive(Clone)]
pub struct ShellSession {
    inner: Arc<ShellInner>,
}

impl ShellSession {
    /// Spawn the shell and its reader tasks.
    ///
    /// Failure to spawn is fatal for the monitor and is returned as
    /// [`MonitorError::ShellSpawn`].
    pub fn spawn(
        config: &ShellConfig,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Result<(Self, ShellTasks)> {
        let mut child = Command::new(&config.program)
            .current_dir(&config.cwd)
            .env("TERM", SHELL_TERM)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MonitorError::ShellSpawn {
                program: config.program.clone(),
                cwd: config.cwd.clone(),
                source,
            })?;

        let pipes_missing = || MonitorError::ShellSpawn {
            program: config.program.clone(),
            cwd: config.cwd.clone(),
            source: std::io::Error::other("shell pipes were not captured"),
        };
        let stdin = child.stdin.take().ok_or_else(pipes_missing)?;
        let stdout = child.stdout.take().ok_or_else(pipes_missing)?;
        let stderr = child.stderr.take().ok_or_else(pipes_missing)?;

        info!(
            shell = %config.program,
            cwd = %config.cwd.display(),
            pid = child.id().unwrap_or(0),
            "shared shell started"
        );

        let inner = Arc::new(ShellInner {
            program: config.program.clone(),
            stdin: Mutex::new(Some(stdin)),
            alive: AtomicBool::new(true),
            events: events.clone(),
        });

        let stdout_task = tokio::spawn(read_stream(stdout, events.clone(), stdout_events));
        let stderr_task = tokio::spawn(read_stream(stderr, events, stderr_events));
        let watcher = tokio::spawn(watch_child(
            child,
            stdout_task,
            stderr_task,
            Arc::clone(&inner),
        ));

        Ok((Self { inner }, ShellTasks { watcher }))
    }

    /// Write `command` to the shell, followed by the path probe.
    ///
    /// A `UserInput` event with the unmodified text is emitted first. The
    /// call returns once the line is written; it never waits for the command
    /// to finish. When the shell is gone, an `ErrorOutput` event is emitted
    /// and [`MonitorError::ShellUnavailable`] returned.
    pub async fn submit(&self, command: &str) -> Result<()> {
        // Holding stdin across the emit keeps UserInput order equal to
        // write order when viewers submit concurrently.
        let mut stdin = self.inner.stdin.lock().await;
        self.inner
            .emit(MonitorEvent::log(LogKind::UserInput, command))
            .await;

        if !self.is_alive() {
            drop(stdin);
            return self.refuse(command).await;
        }
        let Some(pipe) = stdin.as_mut() else {
            drop(stdin);
            return self.refuse(command).await;
        };

        let line = probe_line(command);
        let written = async {
            pipe.write_all(line.as_bytes()).await?;
            pipe.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                debug!(bytes = line.len(), "command written to shell");
                Ok(())
            }
            Err(e) => {
                *stdin = None;
                drop(stdin);
                self.inner
                    .mark_dead(format!("shell input closed: {e}"))
                    .await;
                self.refuse(command).await
            }
        }
    }

    async fn refuse(&self, command: &str) -> Result<()> {
        self.inner
            .emit(MonitorEvent::log(
                LogKind::ErrorOutput,
                format!("command not delivered, shell is not running: {command}"),
            ))
            .await;
        Err(MonitorError::ShellUnavailable)
    }

    /// `false` once the shell has exited or its input has failed.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    pub fn program(&self) -> &str {
        &self.inner.program
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Owns the shell's background work. Aborting it kills the shell.
pub struct ShellTasks {
    watcher: JoinHandle<()>,
}

impl ShellTasks {
    pub fn abort(&self) {
        self.watcher.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.watcher.is_finished()
    }
}

/// Read raw chunks until EOF, classifying each with `classify`.
async fn read_stream<R>(
    mut reader: R,
    events: mpsc::Sender<MonitorEvent>,
    classify: fn(&str) -> Vec<MonitorEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Chunker::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let (text, eof) = match reader.read(&mut buf).await {
            Ok(0) => (decoder.finish(), true),
            Ok(n) => (decoder.push(&buf[..n]), false),
            Err(e) => {
                warn!(error = %e, "failed to read shell output");
                (decoder.finish(), true)
            }
        };

        for event in classify(&text) {
            if events.send(event).await.is_err() {
                return;
            }
        }
        if eof {
            return;
        }
    }
}

/// Wait for the shell to exit, give the readers a moment to drain, then
/// report it.
///
/// A job backgrounded from the shell inherits its stdout and stderr, so the
/// readers may never see EOF. They are cut off after [`EXIT_DRAIN_GRACE`].
async fn watch_child(
    mut child: Child,
    mut stdout_task: JoinHandle<()>,
    mut stderr_task: JoinHandle<()>,
    inner: Arc<ShellInner>,
) {
    let status = child.wait().await;
    let drained = tokio::time::timeout(EXIT_DRAIN_GRACE, async {
        let _ = (&mut stdout_task).await;
        let _ = (&mut stderr_task).await;
    })
    .await;
    if drained.is_err() {
        debug!("shell pipes still held open after exit; stopping readers");
        stdout_task.abort();
        stderr_task.abort();
    }
    inner.mark_dead(exit_message(&status)).await;
}

fn exit_message(status: &std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => format!("shell exited ({status}); commands can no longer be run"),
        Err(e) => format!("lost track of shell process: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
