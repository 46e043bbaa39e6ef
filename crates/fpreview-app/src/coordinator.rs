//! Change-debounce coordinator
//!
//! Turns bursts of file-change events into at most one hot reload per burst.
//! Every change marks the user as typing and (re)arms two deadlines:
//!
//! - the *typing* deadline (`typing_delay`) clears the typing flag
//! - the *settle* deadline (`debounce`) evaluates the latest change
//!
//! When the settle deadline passes while the user still counts as typing,
//! the latest change is handled again as if it had just arrived. Otherwise
//! it is filtered by location and extension, announced to the display and,
//! with auto reload on, forwarded to the process controller.
//!
//! Deadlines are plain [`Instant`]s; the owner polls [`ReloadCoordinator::next_deadline`]
//! and calls [`ReloadCoordinator::on_timer`] once it passes. No task or lock
//! is involved.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::time::Instant;

use crate::config::{self, ReloadPolicy};
use crate::display::{DisplayMessage, DisplaySurface};
use crate::watcher::FileWatcher;
use fpreview_core::events::ChangeEvent;
use fpreview_core::prelude::*;
use fpreview_daemon::ProcessController;

/// Where the coordinator sends reload requests
#[cfg_attr(test, mockall::automock)]
pub trait ReloadControl: Send + Sync {
    fn trigger_reload(&self);

    fn trigger_restart(&self);
}

impl ReloadControl for ProcessController {
    fn trigger_reload(&self) {
        ProcessController::trigger_reload(self);
    }

    fn trigger_restart(&self) {
        ProcessController::trigger_restart(self);
    }
}

/// Timing state for the current burst of changes
#[derive(Debug, Default)]
pub struct DebounceState {
    last_change: Option<Instant>,
    is_typing: bool,
    typing_deadline: Option<Instant>,
    settle_deadline: Option<Instant>,
    pending: Option<ChangeEvent>,
}

impl DebounceState {
    /// No change waiting to settle
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// Latest change of the current burst
    pub fn pending(&self) -> Option<&ChangeEvent> {
        self.pending.as_ref()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Result of a settle evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The user was still typing; the change was re-armed
    Rescheduled,
    /// Outside the watched files
    Ignored { path: PathBuf },
    /// Announced and a hot reload was requested
    Reloaded { file_name: String },
    /// Announced only, auto reload is off
    Announced { file_name: String },
}

/// Debounces file changes into hot reload requests.
///
/// One instance per preview session, owned by the engine.
pub struct ReloadCoordinator {
    root: PathBuf,
    policy: ReloadPolicy,
    control: Arc<dyn ReloadControl>,
    display: Arc<dyn DisplaySurface>,
    state: DebounceState,
    watcher: Option<FileWatcher>,
    disposed: bool,
}

impl ReloadCoordinator {
    pub fn new(
        root: impl Into<PathBuf>,
        policy: ReloadPolicy,
        control: Arc<dyn ReloadControl>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self {
            root: root.into(),
            policy,
            control,
            display,
            state: DebounceState::default(),
            watcher: None,
            disposed: false,
        }
    }

    /// Hand over the file watcher feeding this coordinator; it is stopped on
    /// [`dispose`](Self::dispose)
    pub fn attach_watcher(&mut self, watcher: FileWatcher) {
        self.watcher = Some(watcher);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &ReloadPolicy {
        &self.policy
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn auto_reload_enabled(&self) -> bool {
        self.policy.auto_reload
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Record a change and restart both deadlines
    pub fn handle_change(&mut self, event: ChangeEvent, now: Instant) {
        if self.disposed {
            return;
        }

        trace!("Change {} {}", event.kind, event.path.display());

        self.state.last_change = Some(now);
        self.state.is_typing = true;
        self.state.typing_deadline = Some(now + self.policy.typing_delay);
        self.state.settle_deadline = Some(now + self.policy.debounce);
        self.state.pending = Some(event);
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.state.typing_deadline, self.state.settle_deadline) {
            (Some(typing), Some(settle)) => Some(typing.min(settle)),
            (typing, settle) => typing.or(settle),
        }
    }

    /// Fire every deadline that has passed at `now`.
    ///
    /// The typing deadline is processed before the settle deadline. Returns
    /// the outcome when a settle evaluation ran.
    pub fn on_timer(&mut self, now: Instant) -> Option<SettleOutcome> {
        if self.state.typing_deadline.is_some_and(|deadline| deadline <= now) {
            self.state.typing_deadline = None;
            self.state.is_typing = false;
        }

        if self.state.settle_deadline.is_some_and(|deadline| deadline <= now) {
            self.state.settle_deadline = None;
            return self.settle(now);
        }

        None
    }

    fn settle(&mut self, now: Instant) -> Option<SettleOutcome> {
        let event = self.state.pending.take()?;

        let recently_changed = self
            .state
            .last_change
            .is_some_and(|last| now.saturating_duration_since(last) < self.policy.typing_delay);

        if self.state.is_typing || recently_changed {
            debug!("User is still typing, delaying hot reload");
            self.handle_change(event, now);
            return Some(SettleOutcome::Rescheduled);
        }

        self.state.clear();

        let relative = event.relative_to(&self.root);
        if !self.is_watched(&relative) {
            debug!("Ignoring file change: {}", relative.display());
            return Some(SettleOutcome::Ignored { path: relative });
        }

        let file_name = relative.to_string_lossy().into_owned();
        let auto_reload = self.policy.auto_reload;
        info!("File changed and user finished typing: {}", file_name);

        self.display.post(DisplayMessage::FileChanged {
            file_name: file_name.clone(),
            auto_reload,
        });

        if auto_reload {
            info!("Triggering hot reload for: {}", file_name);
            self.control.trigger_reload();
            Some(SettleOutcome::Reloaded { file_name })
        } else {
            Some(SettleOutcome::Announced { file_name })
        }
    }

    /// Outside ignored directories and with a watched extension
    fn is_watched(&self, relative: &Path) -> bool {
        let ignored = match relative.components().next() {
            Some(Component::Normal(first)) => {
                self.policy.ignore.iter().any(|dir| first == dir.as_str())
            }
            _ => false,
        };
        if ignored {
            return false;
        }

        relative
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.policy.extensions.iter().any(|e| e == ext))
    }

    /// Hot reload immediately, bypassing the debounce
    pub fn trigger_reload(&self) {
        info!("Manual hot reload requested");
        self.control.trigger_reload();
    }

    /// Hot restart immediately, bypassing the debounce
    pub fn trigger_restart(&self) {
        info!("Manual hot restart requested");
        self.control.trigger_restart();
    }

    /// Switch auto reload and persist the choice to the config file.
    ///
    /// The in-memory value changes even if persisting fails.
    pub fn set_auto_reload_enabled(&mut self, enabled: bool) -> Result<()> {
        self.policy.auto_reload = enabled;
        info!("Auto reload {}", if enabled { "enabled" } else { "disabled" });
        config::save_auto_reload(&self.root, enabled)
    }

    /// Replace the policy; applies from the next settle evaluation
    pub fn apply_policy(&mut self, policy: ReloadPolicy) {
        if policy != self.policy {
            debug!("Reload policy updated: {:?}", policy);
            self.policy = policy;
        }
    }

    /// Drop pending deadlines and stop the attached watcher. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state.clear();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        debug!("Reload coordinator disposed");
    }
}

impl Drop for ReloadCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
