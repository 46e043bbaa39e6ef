//! Process lifecycle controller
//!
//! Owns the dev server session end to end: spawning, serving URL discovery,
//! stdin control commands and graceful-then-forceful shutdown.
//!
//! ## Session state
//!
//! At most one [`ProcessSession`] exists. Its presence *is* the running flag:
//! it is installed right after spawn (before the URL is known) and removed on
//! `stop()`, on process exit, or never created when the spawn fails.
//!
//! ## Concurrent starts
//!
//! Every session publishes its startup outcome on a `watch` channel. A `start`
//! call that finds a session already installed subscribes to that channel, so
//! callers arriving during URL discovery wait for the same outcome instead of
//! receiving an empty URL.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::commands::ControlCommand;
use super::launcher::{web_server_args, FlutterLauncher, ProcessLauncher};
use super::process::ServerProcess;
use fpreview_core::events::ServerEvent;
use fpreview_core::prelude::*;
use fpreview_core::server_url::{extract_server_url, looks_like_url_announcement};

/// How long `start` waits for the serving URL
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(90);

/// How long `stop` waits after `q` before terminating the process tree
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a session failed to produce a serving URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFailure {
    /// Exited with a non-zero (or unknown) code before printing a URL
    Exited { code: Option<i32> },
    /// No URL within the startup timeout; the process keeps running
    TimedOut { after: Duration },
}

impl From<StartupFailure> for Error {
    fn from(failure: StartupFailure) -> Self {
        match failure {
            StartupFailure::Exited { code } => Error::ProcessExit { code },
            StartupFailure::TimedOut { after } => Error::StartupTimeout { timeout: after },
        }
    }
}

/// Startup progress published to `start` callers
#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready(String),
    Failed(StartupFailure),
}

/// One running dev server instance
struct ProcessSession {
    generation: u64,
    process: ServerProcess,
    url: Option<String>,
    readiness: watch::Receiver<Readiness>,
}

#[derive(Default)]
struct ControllerState {
    next_generation: u64,
    session: Option<ProcessSession>,
}

type SharedState = Arc<Mutex<ControllerState>>;

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    // Nothing in the critical sections can leave the state half-updated.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controls the single dev server process of a session.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. The internal
/// lock is never held across an `.await`.
pub struct ProcessController {
    workspace_root: Option<PathBuf>,
    launcher: Arc<dyn ProcessLauncher>,
    startup_timeout: Duration,
    grace_period: Duration,
    state: SharedState,
}

impl ProcessController {
    /// Create a controller that launches `flutter` from `PATH`
    pub fn new(workspace_root: Option<PathBuf>) -> Self {
        Self::with_launcher(workspace_root, Arc::new(FlutterLauncher::default()))
    }

    pub fn with_launcher(
        workspace_root: Option<PathBuf>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            workspace_root,
            launcher,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            state: Arc::new(Mutex::new(ControllerState::default())),
        }
    }

    /// Override the URL discovery timeout
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the grace period between `q` and forced termination
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// Start the dev server and wait for its serving URL.
    ///
    /// If a session is already active nothing is spawned; the call waits for
    /// (or immediately returns) that session's outcome.
    ///
    /// # Errors
    /// - [`Error::NoWorkspaceOpen`] without a workspace root
    /// - [`Error::ProcessSpawn`] if the process could not be started
    /// - [`Error::ProcessExit`] on a non-zero exit before the URL appeared
    /// - [`Error::StartupTimeout`] if no URL appeared in time
    pub async fn start(&self, custom_args: &[String]) -> Result<String> {
        let readiness = self.ensure_session(custom_args)?;
        wait_for_url(readiness).await
    }

    /// Join the active session or spawn a new one
    fn ensure_session(&self, custom_args: &[String]) -> Result<watch::Receiver<Readiness>> {
        let mut state = lock(&self.state);

        if let Some(session) = &state.session {
            debug!(
                "Dev server already running (generation {}), joining its startup",
                session.generation
            );
            return Ok(session.readiness.clone());
        }

        let root = self.workspace_root.as_deref().ok_or(Error::NoWorkspaceOpen)?;
        let args = web_server_args(custom_args);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let process = self.launcher.launch(&args, root, event_tx)?;

        state.next_generation += 1;
        let generation = state.next_generation;
        let (ready_tx, ready_rx) = watch::channel(Readiness::Pending);

        info!(
            "Dev server session {} started, PID: {:?}",
            generation,
            process.id()
        );

        state.session = Some(ProcessSession {
            generation,
            process,
            url: None,
            readiness: ready_rx.clone(),
        });
        drop(state);

        tokio::spawn(monitor_session(
            Arc::clone(&self.state),
            generation,
            event_rx,
            ready_tx,
            self.startup_timeout,
        ));

        Ok(ready_rx)
    }

    /// Stop the dev server.
    ///
    /// Session state is cleared before returning; the quit command, grace
    /// period and forced termination continue in the background. Callers
    /// about to leave the runtime should use [`shutdown`](Self::shutdown).
    pub fn stop(&self) {
        let Some(session) = self.take_session() else {
            return;
        };

        let grace = self.grace_period;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(session.process.shutdown(grace));
            }
            Err(_) => {
                warn!("No async runtime available, terminating dev server immediately");
                session.process.send_command(ControlCommand::Quit);
                drop(session);
            }
        }
    }

    /// Stop the dev server and wait until its process tree is gone.
    ///
    /// Same teardown as [`stop`](Self::stop), awaited in place.
    pub async fn shutdown(&self) {
        let Some(session) = self.take_session() else {
            return;
        };
        session.process.shutdown(self.grace_period).await;
    }

    fn take_session(&self) -> Option<ProcessSession> {
        let session = lock(&self.state).session.take()?;
        info!(
            "Stopping dev server session {}, PID: {:?}",
            session.generation,
            session.process.id()
        );
        Some(session)
    }

    /// Ask the dev server to hot reload. No-op without a session.
    pub fn trigger_reload(&self) {
        self.send_command(ControlCommand::Reload);
    }

    /// Ask the dev server to hot restart. No-op without a session.
    pub fn trigger_restart(&self) {
        self.send_command(ControlCommand::Restart);
    }

    fn send_command(&self, command: ControlCommand) {
        let state = lock(&self.state);
        match &state.session {
            Some(session) => {
                info!("Sending {} command", command);
                session.process.send_command(command);
            }
            None => debug!("Ignoring {} command: no dev server running", command),
        }
    }

    /// Whether a session is active (including during URL discovery)
    pub fn is_running(&self) -> bool {
        lock(&self.state).session.is_some()
    }

    /// The discovered serving URL, if any
    pub fn url(&self) -> Option<String> {
        lock(&self.state)
            .session
            .as_ref()
            .and_then(|session| session.url.clone())
    }

    /// PID of the running dev server
    pub fn pid(&self) -> Option<u32> {
        lock(&self.state)
            .session
            .as_ref()
            .and_then(|session| session.process.id())
    }
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("workspace_root", &self.workspace_root)
            .field("running", &self.is_running())
            .field("url", &self.url())
            .finish()
    }
}

/// Wait until the session publishes a URL or a failure
async fn wait_for_url(mut readiness: watch::Receiver<Readiness>) -> Result<String> {
    loop {
        let current = readiness.borrow_and_update().clone();
        match current {
            Readiness::Ready(url) => return Ok(url),
            Readiness::Failed(failure) => return Err(failure.into()),
            Readiness::Pending => {}
        }

        if readiness.changed().await.is_err() {
            // The monitor always resolves before dropping its sender; treat a
            // vanished monitor like an exit with unknown status.
            return Err(Error::ProcessExit { code: None });
        }
    }
}

/// Background task for one session.
///
/// Scans stdout for the serving URL, logs stderr, enforces the startup
/// timeout and tears the session down when the process exits. The first of
/// URL, failing exit and timeout decides the outcome for waiting callers; a
/// URL printed after the timeout is still recorded and published.
async fn monitor_session(
    state: SharedState,
    generation: u64,
    mut events: mpsc::Receiver<ServerEvent>,
    ready_tx: watch::Sender<Readiness>,
    startup_timeout: Duration,
) {
    let deadline = Instant::now() + startup_timeout;
    let mut resolved = false;
    let mut url_found = false;
    let mut events_open = true;

    while !(resolved && !events_open) {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(ServerEvent::Stdout(line)) => {
                    trace!("Flutter output: {}", line);
                    if url_found {
                        continue;
                    }
                    if let Some(url) = extract_server_url(&line) {
                        if resolved {
                            info!("Detected server URL after startup timeout: {}", url);
                        } else {
                            info!("Detected server URL: {}", url);
                        }
                        record_url(&state, generation, &url);
                        // Replaces a TimedOut outcome so later `start` calls join
                        // the now serving session.
                        ready_tx.send_replace(Readiness::Ready(url));
                        url_found = true;
                        resolved = true;
                    } else if looks_like_url_announcement(&line) {
                        debug!("Potential URL line not matched: {}", line);
                    }
                }
                Some(ServerEvent::Stderr(line)) => {
                    warn!("Flutter process error: {}", line);
                }
                Some(ServerEvent::Exited { code }) => {
                    info!("Flutter process exited with code: {:?}", code);
                    clear_session(&state, generation);
                    if !resolved && code != Some(0) {
                        ready_tx.send_replace(Readiness::Failed(StartupFailure::Exited { code }));
                        resolved = true;
                    }
                }
                None => events_open = false,
            },
            _ = tokio::time::sleep_until(deadline), if !resolved => {
                error!("Server URL not detected within {:?}", startup_timeout);
                ready_tx.send_replace(Readiness::Failed(StartupFailure::TimedOut {
                    after: startup_timeout,
                }));
                resolved = true;
            }
        }
    }

    debug!("Session {} monitor finished", generation);
}

fn record_url(state: &Mutex<ControllerState>, generation: u64, url: &str) {
    let mut state = lock(state);
    if let Some(session) = state.session.as_mut() {
        if session.generation == generation && session.url.is_none() {
            session.url = Some(url.to_string());
        }
    }
}

fn clear_session(state: &Mutex<ControllerState>, generation: u64) {
    let mut state = lock(state);
    if state
        .session
        .as_ref()
        .is_some_and(|session| session.generation == generation)
    {
        debug!("Clearing session {} after process exit", generation);
        state.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptLauncher;

    const SERVE_SCRIPT: &str = r#"
echo "Launching lib/main.dart on Web Server in debug mode..."
echo "A web server is being served at http://127.0.0.1:53182/"
sleep 60
"#;

    fn controller(launcher: &Arc<ScriptLauncher>) -> ProcessController {
        let launcher: Arc<dyn ProcessLauncher> = launcher.clone();
        ProcessController::with_launcher(Some(std::env::temp_dir()), launcher)
            .with_grace_period(Duration::from_millis(200))
    }

    async fn wait_until_stopped(controller: &ProcessController) -> bool {
        for _ in 0..100 {
            if !controller.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_discovers_url() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        let url = controller.start(&[]).await.unwrap();

        assert_eq!(url, "http://127.0.0.1:53182");
        assert_eq!(controller.url().as_deref(), Some("http://127.0.0.1:53182"));
        assert!(controller.is_running());
        assert!(controller.pid().is_some());

        controller.stop();
    }

    #[tokio::test]
    async fn test_start_passes_base_and_custom_args() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        controller
            .start(&["--web-renderer".to_string(), "html".to_string()])
            .await
            .unwrap();

        let args = launcher.last_args();
        assert_eq!(
            args,
            vec!["run", "-d", "web-server", "--web-port", "0", "--web-renderer", "html"]
        );

        controller.stop();
    }

    #[tokio::test]
    async fn test_concurrent_starts_spawn_once() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"sleep 0.3; echo "served at http://localhost:8080/"; sleep 60"#,
        ));
        let controller = controller(&launcher);

        let (first, second) = tokio::join!(controller.start(&[]), controller.start(&[]));

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(first.unwrap(), "http://localhost:8080");
        assert_eq!(second.unwrap(), "http://localhost:8080");

        controller.stop();
    }

    #[tokio::test]
    async fn test_start_while_running_returns_existing_url() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        let first = controller.start(&[]).await.unwrap();
        let second = controller.start(&["--ignored".to_string()]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(launcher.launch_count(), 1);

        controller.stop();
    }

    #[tokio::test]
    async fn test_non_matching_lines_keep_scanning() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"
echo "Compiling lib/main.dart for the Web..."
echo "lib/main.dart is being served at http://0.0.0.0:9000"
echo "Debug service listening on ws://127.0.0.1:4444/abc"
echo "Serving at http://localhost:7357"
sleep 60
"#,
        ));
        let controller = controller(&launcher);

        assert_eq!(controller.start(&[]).await.unwrap(), "http://localhost:7357");

        controller.stop();
    }

    #[tokio::test]
    async fn test_stop_clears_state_synchronously() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);
        controller.start(&[]).await.unwrap();

        controller.stop();

        assert!(!controller.is_running());
        assert_eq!(controller.url(), None);
        assert_eq!(controller.pid(), None);
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        controller.stop();
        controller.stop();

        assert!(!controller.is_running());
        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_after_stop_spawns_new_session() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        controller.start(&[]).await.unwrap();
        controller.stop();
        controller.start(&[]).await.unwrap();

        assert_eq!(launcher.launch_count(), 2);
        assert!(controller.is_running());

        controller.stop();
    }

    #[tokio::test]
    async fn test_exit_before_url_is_process_exit_error() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"echo "Error: No pubspec.yaml file found."; exit 3"#,
        ));
        let controller = controller(&launcher);

        let result = controller.start(&[]).await;

        assert!(matches!(result, Err(Error::ProcessExit { code: Some(3) })));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_startup_timeout_leaves_process_running() {
        let launcher = Arc::new(ScriptLauncher::new("echo still compiling; sleep 60"));
        let controller =
            controller(&launcher).with_startup_timeout(Duration::from_millis(300));

        let result = controller.start(&[]).await;

        assert!(matches!(result, Err(Error::StartupTimeout { .. })));
        assert!(controller.is_running());
        assert_eq!(controller.url(), None);

        controller.stop();
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_url_after_startup_timeout_is_recorded() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"sleep 0.6; echo "served at http://127.0.0.1:5000"; sleep 60"#,
        ));
        let controller =
            controller(&launcher).with_startup_timeout(Duration::from_millis(200));

        let first = controller.start(&[]).await;
        assert!(matches!(first, Err(Error::StartupTimeout { .. })));

        let mut url = None;
        for _ in 0..100 {
            url = controller.url();
            if url.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(url.as_deref(), Some("http://127.0.0.1:5000"));

        let second = controller.start(&[]).await.unwrap();
        assert_eq!(second, "http://127.0.0.1:5000");
        assert_eq!(launcher.launch_count(), 1);

        controller.stop();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_graceful_quit() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"
echo "served at http://127.0.0.1:5000"
read cmd
if [ "$cmd" = "q" ]; then echo quit > quit-received; exit 0; fi
sleep 60
"#,
        ));
        let dir = std::env::temp_dir().join(format!("fpreview-shutdown-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let launcher_dyn: Arc<dyn ProcessLauncher> = launcher.clone();
        let controller = ProcessController::with_launcher(Some(dir.clone()), launcher_dyn)
            .with_grace_period(Duration::from_secs(5));
        controller.start(&[]).await.unwrap();

        controller.shutdown().await;

        assert!(!controller.is_running());
        assert!(dir.join("quit-received").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_shutdown_without_session_is_noop() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        controller.shutdown().await;

        assert_eq!(launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_no_workspace_is_rejected() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let launcher_dyn: Arc<dyn ProcessLauncher> = launcher.clone();
        let controller = ProcessController::with_launcher(None, launcher_dyn);

        let result = controller.start(&[]).await;

        assert!(matches!(result, Err(Error::NoWorkspaceOpen)));
        assert_eq!(launcher.launch_count(), 0);
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_session() {
        let launcher = Arc::new(ScriptLauncher::failing("permission denied"));
        let controller = controller(&launcher);

        let result = controller.start(&[]).await;

        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_commands_without_session_are_ignored() {
        let launcher = Arc::new(ScriptLauncher::new(SERVE_SCRIPT));
        let controller = controller(&launcher);

        controller.trigger_reload();
        controller.trigger_restart();

        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_trigger_reload_writes_to_stdin() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"
echo "served at http://127.0.0.1:5000"
read cmd
if [ "$cmd" = "r" ]; then exit 0; fi
sleep 60
"#,
        ));
        let controller = controller(&launcher);
        controller.start(&[]).await.unwrap();

        controller.trigger_reload();

        assert!(
            wait_until_stopped(&controller).await,
            "script should exit after reading 'r'"
        );
    }

    #[tokio::test]
    async fn test_trigger_restart_writes_to_stdin() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"
echo "served at http://127.0.0.1:5000"
read cmd
if [ "$cmd" = "R" ]; then exit 0; fi
sleep 60
"#,
        ));
        let controller = controller(&launcher);
        controller.start(&[]).await.unwrap();

        controller.trigger_restart();

        assert!(wait_until_stopped(&controller).await);
    }

    #[tokio::test]
    async fn test_process_crash_after_start_clears_session() {
        let launcher = Arc::new(ScriptLauncher::new(
            r#"echo "served at http://127.0.0.1:5000"; sleep 0.2; exit 1"#,
        ));
        let controller = controller(&launcher);

        controller.start(&[]).await.unwrap();

        assert!(wait_until_stopped(&controller).await);
        assert_eq!(controller.url(), None);
    }

    #[test]
    fn test_startup_failure_into_error() {
        let err: Error = StartupFailure::Exited { code: Some(1) }.into();
        assert!(matches!(err, Error::ProcessExit { code: Some(1) }));

        let err: Error = StartupFailure::TimedOut {
            after: Duration::from_secs(90),
        }
        .into();
        assert!(
            matches!(err, Error::StartupTimeout { timeout } if timeout == Duration::from_secs(90))
        );
    }
}
