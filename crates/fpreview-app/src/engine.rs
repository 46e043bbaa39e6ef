//! Engine - the single event loop of a preview session
//!
//! Owns the reload coordinator, the panel state, the process controller and
//! the watchers, and processes one input at a time:
//!
//! - [`Message`]s from the host transport, signal handler and start task
//! - [`ChangeEvent`]s from the file watcher
//! - settings published by the config watcher
//! - the coordinator's next debounce deadline
//!
//! Dev server startup runs in a spawned task that reports back through the
//! message channel, so URL discovery never blocks the loop.

use std::future::pending;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::config::{self, ConfigWatcher, Settings};
use crate::coordinator::{ReloadControl, ReloadCoordinator};
use crate::display::DisplaySurface;
use crate::message::{Message, QuitReason};
use crate::panel::{EmulatorPanel, PanelAction};
use crate::signals;
use crate::watcher::FileWatcher;
use fpreview_core::events::ChangeEvent;
use fpreview_core::prelude::*;
use fpreview_daemon::{FlutterLauncher, ProcessController, ProcessLauncher};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// How an [`Engine`] is wired up
pub struct EngineOptions {
    /// Replaces the `flutter` launcher derived from the settings
    pub launcher: Option<Arc<dyn ProcessLauncher>>,
    /// Appended after `customFlags` from the config file
    pub extra_flags: Vec<String>,
    /// Overrides `autoReload` for this run without persisting it
    pub auto_reload: Option<bool>,
    pub startup_timeout: Option<Duration>,
    /// Time between `q` and forced termination on shutdown
    pub grace_period: Option<Duration>,
    pub watch_files: bool,
    pub watch_config: bool,
    pub handle_signals: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            launcher: None,
            extra_flags: Vec::new(),
            auto_reload: None,
            startup_timeout: None,
            grace_period: None,
            watch_files: true,
            watch_config: true,
            handle_signals: true,
        }
    }
}

/// Orchestration engine for Flutter Preview
pub struct Engine {
    root: PathBuf,
    settings: Settings,
    extra_flags: Vec<String>,
    auto_reload_override: Option<bool>,

    controller: Arc<ProcessController>,
    coordinator: ReloadCoordinator,
    panel: EmulatorPanel,

    msg_tx: mpsc::Sender<Message>,
    msg_rx: mpsc::Receiver<Message>,
    change_tx: mpsc::Sender<ChangeEvent>,
    change_rx: mpsc::Receiver<ChangeEvent>,

    config_watcher: Option<ConfigWatcher>,
    settings_rx: Option<watch::Receiver<Settings>>,

    should_quit: bool,
}

impl Engine {
    /// Create an engine for the workspace at `root`.
    ///
    /// Initializes `.fpreview/`, loads settings and starts the watchers.
    /// Watcher failures are logged and leave the engine without live
    /// reloading rather than failing construction.
    pub fn new(root: &Path, display: Arc<dyn DisplaySurface>, options: EngineOptions) -> Self {
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        if let Err(e) = config::init_config_dir(&root) {
            warn!("Failed to initialize .fpreview directory: {}", e);
        }
        let settings = config::load_settings(&root);

        let launcher = options.launcher.unwrap_or_else(|| {
            Arc::new(FlutterLauncher::new(settings.flutter_path.clone())) as Arc<dyn ProcessLauncher>
        });
        let mut controller = ProcessController::with_launcher(Some(root.clone()), launcher);
        if let Some(timeout) = options.startup_timeout {
            controller = controller.with_startup_timeout(timeout);
        }
        if let Some(grace) = options.grace_period {
            controller = controller.with_grace_period(grace);
        }
        let controller = Arc::new(controller);

        let mut policy = settings.reload_policy();
        if let Some(auto_reload) = options.auto_reload {
            policy.auto_reload = auto_reload;
        }
        let control: Arc<dyn ReloadControl> = controller.clone();
        let mut coordinator =
            ReloadCoordinator::new(root.clone(), policy, control, Arc::clone(&display));
        let panel = EmulatorPanel::new(display, &settings);

        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (change_tx, change_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        if options.handle_signals {
            if let Err(e) = signals::spawn_signal_handler(msg_tx.clone()) {
                warn!("Signals will not trigger a graceful shutdown: {}", e);
            }
        }

        if options.watch_files {
            let mut watcher =
                FileWatcher::new(root.clone()).with_ignore(settings.watcher.ignore.clone());
            match watcher.start(change_tx.clone()) {
                Ok(()) => coordinator.attach_watcher(watcher),
                Err(e) => error!("Failed to start file watcher: {}", e),
            }
        }

        let config_watcher = if options.watch_config {
            match ConfigWatcher::start(&root, settings.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Config changes will not be picked up: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let settings_rx = config_watcher.as_ref().map(ConfigWatcher::subscribe);

        info!("Workspace root: {}", root.display());

        Self {
            root,
            settings,
            extra_flags: options.extra_flags,
            auto_reload_override: options.auto_reload,
            controller,
            coordinator,
            panel,
            msg_tx,
            msg_rx,
            change_tx,
            change_rx,
            config_watcher,
            settings_rx,
            should_quit: false,
        }
    }

    /// Sender for input sources (host transport, tests)
    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    /// Sender for file changes, for sources other than the built-in watcher
    pub fn change_sender(&self) -> mpsc::Sender<ChangeEvent> {
        self.change_tx.clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn controller(&self) -> &Arc<ProcessController> {
        &self.controller
    }

    pub fn coordinator(&self) -> &ReloadCoordinator {
        &self.coordinator
    }

    pub fn panel(&self) -> &EmulatorPanel {
        &self.panel
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Run until quit is requested, then shut down
    pub async fn run(&mut self) -> Result<()> {
        while !self.should_quit {
            let deadline = self.coordinator.next_deadline();

            tokio::select! {
                msg = self.msg_rx.recv() => match msg {
                    Some(msg) => self.process_message(msg),
                    None => {
                        info!("Message channel closed");
                        break;
                    }
                },
                Some(change) = self.change_rx.recv() => {
                    self.coordinator.handle_change(change, Instant::now());
                }
                settings = next_settings(&mut self.settings_rx) => match settings {
                    Some(settings) => self.apply_settings(settings),
                    None => self.settings_rx = None,
                },
                _ = sleep_until(deadline) => {
                    if let Some(outcome) = self.coordinator.on_timer(Instant::now()) {
                        debug!("Settle outcome: {:?}", outcome);
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Process a single message through the update cycle
    pub fn process_message(&mut self, msg: Message) {
        debug!("Processing {:?}", msg);

        match msg {
            Message::Panel(panel_msg) => {
                match self.panel.handle(panel_msg, &self.settings) {
                    Some(PanelAction::StartServer { custom_flags }) => {
                        let mut flags = custom_flags;
                        flags.extend(self.extra_flags.iter().cloned());
                        self.spawn_start(flags);
                    }
                    Some(PanelAction::HotReload) => self.coordinator.trigger_reload(),
                    None => {}
                }
            }
            Message::HotReload => {
                self.panel.reload();
                self.coordinator.trigger_reload();
            }
            Message::HotRestart => self.coordinator.trigger_restart(),
            Message::Rotate => self.panel.rotate(),
            Message::ToggleAutoReload => {
                let enabled = !self.coordinator.auto_reload_enabled();
                // An explicit toggle supersedes the command-line override.
                self.auto_reload_override = None;
                if let Err(e) = self.coordinator.set_auto_reload_enabled(enabled) {
                    warn!("Failed to persist autoReload: {}", e);
                }
                self.settings.auto_reload = enabled;
            }
            Message::StartServer => self.spawn_start(self.launch_flags()),
            Message::ServerStarted { url } => self.panel.on_server_started(&url),
            Message::ServerStartFailed { reason } => self.panel.on_server_failed(&reason),
            Message::Quit(reason) => {
                info!("Shutting down: {}", reason);
                self.should_quit = true;
            }
        }
    }

    fn launch_flags(&self) -> Vec<String> {
        self.settings
            .custom_flags
            .iter()
            .chain(self.extra_flags.iter())
            .cloned()
            .collect()
    }

    fn spawn_start(&self, flags: Vec<String>) {
        let controller = Arc::clone(&self.controller);
        let tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let msg = match controller.start(&flags).await {
                Ok(url) => Message::ServerStarted { url },
                Err(e) => Message::ServerStartFailed {
                    reason: e.to_string(),
                },
            };
            if tx.send(msg).await.is_err() {
                debug!("Engine gone before dev server start finished");
            }
        });
    }

    /// Adopt settings re-read from disk
    fn apply_settings(&mut self, settings: Settings) {
        let mut policy = settings.reload_policy();
        if let Some(auto_reload) = self.auto_reload_override {
            policy.auto_reload = auto_reload;
        }
        self.coordinator.apply_policy(policy);
        self.settings = settings;
    }

    /// Dispose the coordinator, stop watchers, then wait for the dev server
    /// to quit (or be terminated)
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        self.coordinator.dispose();
        if let Some(mut watcher) = self.config_watcher.take() {
            watcher.stop();
        }
        self.settings_rx = None;
        self.controller.shutdown().await;
    }
}

async fn next_settings(rx: &mut Option<watch::Receiver<Settings>>) -> Option<Settings> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}
