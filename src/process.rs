//! Process harness — supervises a single long-lived child process through
//! prepare → running → exited → (restart | done).
//!
//! Stderr lines are classified against an unrecoverable-error regex list
//! first, then a recoverable-error list with a counted limit; either match
//! terminates the child. An exit whose code isn't in `valid_return_codes`,
//! and that wasn't requested via `terminate()`/`kill()`, is reported as an
//! error.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    New,
    Prepared,
    Running,
    Exited,
    Done,
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub shell: bool,
    pub recoverable_errors: Vec<Regex>,
    pub unrecoverable_errors: Vec<Regex>,
    pub valid_return_codes: Vec<i32>,
    pub fire_once: bool,
    pub recoverable_error_limit: u32,
    pub settle_time: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("process exited with unexpected code {code}")]
    Aborted { code: i32 },
}

pub type Hook = Arc<dyn Fn() + Send + Sync>;

pub struct Command {
    spec: CommandSpec,
    state_tx: watch::Sender<HarnessState>,
    terminated: AtomicBool,
    killed: AtomicBool,
    recoverable_error_count: AtomicU32,
    pid: Mutex<Option<i32>>,
    on_running: Option<Hook>,
    on_exited: Option<Hook>,
}

impl Command {
    pub fn new(spec: CommandSpec) -> Self {
        let (state_tx, _) = watch::channel(HarnessState::New);
        Self {
            spec,
            state_tx,
            terminated: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            recoverable_error_count: AtomicU32::new(0),
            pid: Mutex::new(None),
            on_running: None,
            on_exited: None,
        }
    }

    pub fn with_hooks(mut self, on_running: Option<Hook>, on_exited: Option<Hook>) -> Self {
        self.on_running = on_running;
        self.on_exited = on_exited;
        self
    }

    pub fn state(&self) -> HarnessState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<HarnessState> {
        self.state_tx.subscribe()
    }

    pub fn recoverable_error_count(&self) -> u32 {
        self.recoverable_error_count.load(Ordering::SeqCst)
    }

    /// Resets the recoverable-error count outside the normal per-attempt
    /// reset, so an external health check can mark the child healthy again
    /// (e.g. once it has stayed up long enough to no longer be counted
    /// against the limit accrued during an earlier rough patch).
    pub fn reset_recoverable_error_count(&self) {
        self.recoverable_error_count.store(0, Ordering::SeqCst);
    }

    /// Requests a graceful shutdown: sends SIGTERM to the running child, if
    /// any, and marks the next exit as expected. Idempotent.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.signal(Signal::SIGTERM);
    }

    /// Requests an immediate shutdown and prevents any further restart.
    /// Idempotent.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.signal(Signal::SIGKILL);
    }

    fn signal(&self, signal: Signal) {
        if let Some(pid) = *self.pid.lock().unwrap() {
            if let Err(error) = signal::kill(Pid::from_raw(pid), signal) {
                debug!(pid, %error, "signal delivery failed (process likely already gone)");
            }
        }
    }

    fn set_state(&self, state: HarnessState) {
        let _ = self.state_tx.send(state);
    }

    fn build_command(&self) -> tokio::process::Command {
        if self.spec.shell {
            let mut command = tokio::process::Command::new("sh");
            command.arg("-c").arg(self.spec.argv.join(" "));
            command
        } else {
            let mut command = tokio::process::Command::new(&self.spec.argv[0]);
            command.args(&self.spec.argv[1..]);
            command
        }
    }

    /// Runs the full prepare → running → exited lifecycle, restarting the
    /// child after each non-fatal exit unless `fire_once` or `kill()` was
    /// called. Returns once the harness reaches `Done`, or immediately on
    /// an error that invalidates the state machine (spawn/wait failure, or
    /// an unexpected exit code).
    pub async fn execute(self: Arc<Self>) -> Result<(), HarnessError> {
        loop {
            if self.killed.load(Ordering::SeqCst) {
                break;
            }
            if !self.spec.settle_time.is_zero() {
                tokio::time::sleep(self.spec.settle_time).await;
            }
            self.set_state(HarnessState::Prepared);
            self.recoverable_error_count.store(0, Ordering::SeqCst);

            let mut command = self.build_command();
            command.stderr(Stdio::piped());
            info!(argv = ?self.spec.argv, "starting process");
            let mut child = command.spawn().map_err(HarnessError::Spawn)?;
            *self.pid.lock().unwrap() = child.id().map(|p| p as i32);

            if let Some(hook) = &self.on_running {
                hook();
            }
            self.set_state(HarnessState::Running);

            let stderr = child.stderr.take();
            let watcher = tokio::spawn(Arc::clone(&self).watch_stderr(stderr));

            let wait_result = child.wait().await.map_err(HarnessError::Wait)?;
            watcher.abort();
            *self.pid.lock().unwrap() = None;

            let terminated = self.terminated.load(Ordering::SeqCst);
            let killed = self.killed.load(Ordering::SeqCst);

            if let Some(hook) = &self.on_exited {
                hook();
            }
            self.set_state(HarnessState::Exited);

            let code = wait_result.code().unwrap_or(-1);
            if !self.spec.valid_return_codes.contains(&code) && !terminated && !killed {
                return Err(HarnessError::Aborted { code });
            }

            if self.spec.fire_once || killed {
                break;
            }
            info!("process exited, restarting");
        }
        self.set_state(HarnessState::Done);
        Ok(())
    }

    async fn watch_stderr(self: Arc<Self>, stderr: Option<tokio::process::ChildStderr>) {
        let Some(stderr) = stderr else { return };
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(%line, "child stderr");
                    if self
                        .spec
                        .unrecoverable_errors
                        .iter()
                        .any(|re| re.is_match(&line))
                    {
                        warn!(%line, "unrecoverable error, terminating child");
                        self.terminate();
                        break;
                    }
                    if self.spec.recoverable_errors.iter().any(|re| re.is_match(&line)) {
                        let count = self.recoverable_error_count.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(count, limit = self.spec.recoverable_error_limit, "recoverable error");
                        if count > self.spec.recoverable_error_limit {
                            warn!(%line, count, "recoverable error limit exceeded, terminating child");
                            self.terminate();
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "stderr read failed");
                    break;
                }
            }
        }
    }
}
