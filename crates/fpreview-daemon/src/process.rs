//! Dev server child process management

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};

use super::commands::ControlCommand;
use fpreview_core::events::ServerEvent;
use fpreview_core::prelude::*;

/// How long a SIGTERM'd process tree gets before the leader is SIGKILLed
const KILL_ESCALATION: Duration = Duration::from_secs(2);

/// Manages one dev server child process.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task
/// that owns it until the process is reaped. `ServerProcess` keeps:
/// - a command channel feeding the stdin writer task,
/// - a kill channel ([`kill_tx`]) to request a forced termination,
/// - an atomic flag ([`exited`]) for synchronous `has_exited()` checks,
/// - a [`Notify`] so `shutdown()` can await the exit without polling.
pub struct ServerProcess {
    /// Sender for stdin control commands
    stdin_tx: mpsc::Sender<ControlCommand>,
    /// Process ID (also the process group ID on unix)
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to terminate the process tree.
    /// Consumed on first use (or on drop).
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set to `true` by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

impl ServerProcess {
    /// Spawn a prepared command and wire up its stdio tasks.
    ///
    /// The command's stdio is overridden to pipes. Output lines and the final
    /// exit are delivered on `event_tx`.
    pub fn spawn(mut command: Command, event_tx: mpsc::Sender<ServerEvent>) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::process_spawn(format!("executable not found ({})", e))
                } else {
                    Error::process_spawn(e.to_string())
                }
            })?;

        let pid = child.id();
        info!("Dev server process started, PID: {:?}", pid);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::process_spawn("stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process_spawn("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::process_spawn("stderr was not captured"))?;

        let (stdin_tx, stdin_rx) = mpsc::channel::<ControlCommand>(16);
        tokio::spawn(Self::stdin_writer(stdin, stdin_rx));
        tokio::spawn(Self::stdout_reader(stdout, event_tx.clone()));
        tokio::spawn(Self::stderr_reader(stderr, event_tx.clone()));

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            pid,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            stdin_tx,
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits `ServerEvent::Exited`.
    ///
    /// Two ways the task can end:
    /// 1. The process exits on its own (including after a `q` command).
    /// 2. `kill_rx` fires: the process tree is terminated, then reaped.
    async fn wait_for_exit(
        mut child: Child,
        pid: Option<u32>,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ServerEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("Dev server exited with status: {:?}", status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for dev server: {}", e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill requested, terminating dev server process tree");
                if let Some(pid) = pid {
                    terminate_process_tree(pid);
                }
                match tokio::time::timeout(KILL_ESCALATION, child.wait()).await {
                    Ok(Ok(status)) => status.code(),
                    Ok(Err(e)) => {
                        error!("Error waiting after terminate: {}", e);
                        None
                    }
                    Err(_) => {
                        warn!("Process tree ignored terminate, killing leader");
                        if let Err(e) = child.kill().await {
                            error!("Failed to kill dev server: {}", e);
                        }
                        child.wait().await.ok().and_then(|status| status.code())
                    }
                }
            }
        };

        // Mark as exited and wake waiters before the event goes out, so
        // `has_exited()` is already true for anyone reacting to the event.
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        debug!("Sending ServerEvent::Exited {{ code: {:?} }}", code);
        let _ = event_tx.send(ServerEvent::Exited { code }).await;
    }

    /// Read lines from stdout and forward them as `ServerEvent::Stdout`.
    async fn stdout_reader(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<ServerEvent>) {
        let mut reader = BufReader::new(stdout).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stdout: {}", line);

            if tx.send(ServerEvent::Stdout(line)).await.is_err() {
                debug!("stdout channel closed");
                break;
            }
        }

        debug!("stdout reader finished");
    }

    /// Read lines from stderr and forward them as `ServerEvent::Stderr`.
    async fn stderr_reader(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<ServerEvent>) {
        let mut reader = BufReader::new(stderr).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("stderr: {}", line);

            if tx.send(ServerEvent::Stderr(line)).await.is_err() {
                debug!("stderr channel closed");
                break;
            }
        }

        debug!("stderr reader finished");
    }

    /// Write control commands to stdin
    async fn stdin_writer(
        mut stdin: tokio::process::ChildStdin,
        mut rx: mpsc::Receiver<ControlCommand>,
    ) {
        while let Some(command) = rx.recv().await {
            debug!("Sending to dev server: {}", command);

            if let Err(e) = stdin.write_all(command.to_line().as_bytes()).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }

        debug!("stdin writer finished");
    }

    /// Queue a control command without waiting.
    ///
    /// Fire-and-forget: there is no acknowledgment from the child, and a full
    /// or closed channel only gets logged.
    pub fn send_command(&self, command: ControlCommand) {
        if let Err(e) = self.stdin_tx.try_send(command) {
            debug!("Dropped {} command: {}", command, e);
        }
    }

    /// Gracefully shut the process down.
    ///
    /// 1. Early exit if the process is already gone
    /// 2. Write `q` to stdin
    /// 3. Wait up to `grace` for the exit notification
    /// 4. Terminate the process tree if it is still alive, and wait for
    ///    the leader to be reaped
    ///
    /// Errors are logged, never returned: teardown is best-effort.
    pub async fn shutdown(mut self, grace: Duration) {
        if self.has_exited() {
            debug!("Dev server already exited, skipping shutdown");
            return;
        }

        info!("Stopping dev server, PID: {:?}", self.pid);
        self.send_command(ControlCommand::Quit);

        // Create the `notified()` future before the last `has_exited()` check
        // so a notification between the two cannot be missed.
        let exit_notify = Arc::clone(&self.exit_notify);
        let notified = exit_notify.notified();
        if self.has_exited() {
            info!("Dev server exited gracefully");
            return;
        }

        match tokio::time::timeout(grace, notified).await {
            Ok(()) => info!("Dev server exited gracefully"),
            Err(_) => {
                warn!(
                    "Dev server still running after {:?}, forcefully terminating PID {:?}",
                    grace, self.pid
                );
                let terminated = exit_notify.notified();
                self.force_kill();
                if self.has_exited() {
                    return;
                }
                // The wait task escalates to SIGKILL after KILL_ESCALATION.
                if tokio::time::timeout(KILL_ESCALATION * 2, terminated)
                    .await
                    .is_err()
                {
                    error!("Dev server PID {:?} survived forced termination", self.pid);
                }
            }
        }
    }

    /// Ask the wait task to terminate the process tree.
    fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may already be gone if the process exited.
            let _ = tx.send(());
        }
    }

    /// Synchronous exit check backed by the wait task's atomic flag.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("ServerProcess dropped while process may still be running");
            self.force_kill();
        }
        // kill_on_drop(true) on the Child remains the final safety net.
        debug!("ServerProcess dropped");
    }
}

/// Terminate a process and everything it spawned.
///
/// On unix the child leads its own process group, so the whole group gets
/// SIGTERM. On Windows `taskkill /T /F` walks the process tree.
#[cfg(unix)]
fn terminate_process_tree(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        warn!("PID {} does not fit in pid_t", pid);
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; a stale group id
    // just makes it fail with ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc != 0 {
        debug!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(windows)]
fn terminate_process_tree(pid: u32) {
    match std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T", "/F"])
        .output()
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => debug!(
            "taskkill for PID {} failed: {}",
            pid,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => debug!("Failed to run taskkill for PID {}: {}", pid, e),
    }
}

/// Put a command in its own process group so the tree can be signalled.
pub(crate) fn isolate_process_group(command: &mut std::process::Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = command;
    }
}
