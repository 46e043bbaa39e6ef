//! Live reloading of `.fpreview/config.toml`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use super::settings::{load_settings, CONFIG_FILENAME, FPREVIEW_DIR};
use super::types::Settings;
use fpreview_core::prelude::*;

/// Watches the config directory and publishes re-read [`Settings`].
///
/// Subscribers only see a new value when the parsed settings actually
/// differ from the previous ones.
pub struct ConfigWatcher {
    config_dir: PathBuf,
    settings_tx: Arc<watch::Sender<Settings>>,
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    /// Start watching `<project>/.fpreview/`.
    ///
    /// The directory must exist (see `init_config_dir`).
    pub fn start(project_path: &Path, initial: Settings) -> Result<Self> {
        let project_path = project_path.to_path_buf();
        let config_dir = project_path.join(FPREVIEW_DIR);
        let (settings_tx, _) = watch::channel(initial);
        let settings_tx = Arc::new(settings_tx);

        let tx = Arc::clone(&settings_tx);
        let root = project_path.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if touches_config(&event) => publish(&root, &tx),
                Ok(_) => {}
                Err(e) => warn!("Config watcher error: {}", e),
            }
        })
        .map_err(|e| Error::watcher(format!("Failed to create config watcher: {}", e)))?;

        watcher
            .watch(&config_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::watcher(format!(
                    "Failed to watch {}: {}",
                    config_dir.display(),
                    e
                ))
            })?;

        info!("Watching config: {}", config_dir.display());

        Ok(Self {
            config_dir,
            settings_tx,
            watcher: Some(watcher),
        })
    }

    /// Receiver for settings changes
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    /// Most recently published settings
    pub fn current(&self) -> Settings {
        self.settings_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.config_dir) {
                debug!("Failed to unwatch {}: {}", self.config_dir.display(), e);
            }
            info!("Config watcher stopped");
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn touches_config(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| path.file_name().is_some_and(|name| name == CONFIG_FILENAME))
}

fn publish(project_path: &Path, tx: &watch::Sender<Settings>) {
    let settings = load_settings(project_path);
    let changed = tx.send_if_modified(|current| {
        if *current == settings {
            false
        } else {
            *current = settings;
            true
        }
    });

    if changed {
        info!("Configuration reloaded");
    }
}
