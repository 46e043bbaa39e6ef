//! File watcher feeding the reload coordinator
//!
//! Watches the whole workspace recursively and forwards every file create,
//! modify and remove as a [`ChangeEvent`]. Extension filtering and debouncing
//! happen downstream in the coordinator.

use std::path::{Component, Path, PathBuf};

use notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use fpreview_core::events::{ChangeEvent, ChangeKind};
use fpreview_core::prelude::*;

/// Manages recursive file watching for a workspace
pub struct FileWatcher {
    root: PathBuf,
    /// Top-level directory names dropped before reaching the channel
    ignore: Vec<String>,
    watcher: Option<RecommendedWatcher>,
}

impl FileWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // notify reports canonical paths; the root must match for prefix checks.
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            ignore: Vec::new(),
            watcher: None,
        }
    }

    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching; change events are sent to `change_tx`
    pub fn start(&mut self, change_tx: mpsc::Sender<ChangeEvent>) -> Result<()> {
        if self.is_running() {
            return Err(Error::watcher("Watcher is already running"));
        }

        let root = self.root.clone();
        let ignore = self.ignore.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for change in to_change_events(&event) {
                        if is_ignored(&root, &change.path, &ignore) {
                            continue;
                        }
                        trace!("File {}: {}", change.kind, change.path.display());
                        if change_tx.blocking_send(change).is_err() {
                            debug!("Change receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => warn!("File watcher error: {:?}", e),
            }
        })
        .map_err(|e| Error::watcher(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| {
                Error::watcher(format!("Failed to watch {}: {}", self.root.display(), e))
            })?;

        info!("Watching: {}", self.root.display());
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop the file watcher
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            info!("File watcher stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Translate a raw notify event into zero or more change events
fn to_change_events(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            ChangeKind::Created
        }
        EventKind::Remove(RemoveKind::Folder) => return Vec::new(),
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ChangeKind::Deleted
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Changed,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| !path.is_dir())
        .map(|path| ChangeEvent::new(path.clone(), kind))
        .collect()
}

/// Whether `path` lies under one of the ignored top-level directories
pub(crate) fn is_ignored(root: &Path, path: &Path, ignore: &[String]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    match relative.components().next() {
        Some(Component::Normal(first)) => ignore.iter().any(|dir| first == dir.as_str()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_is_ignored_top_level_only() {
        let root = Path::new("/work/app");
        let ignore = vec![".dart_tool".to_string()];

        assert!(is_ignored(
            root,
            Path::new("/work/app/.dart_tool/build/cache.json"),
            &ignore
        ));
        assert!(!is_ignored(root, Path::new("/work/app/lib/main.dart"), &ignore));
        assert!(!is_ignored(
            root,
            Path::new("/work/app/lib/.dart_tool/x.dart"),
            &ignore
        ));
        assert!(!is_ignored(
            root,
            Path::new("/work/app/.dart_tool_backup/a.dart"),
            &ignore
        ));
    }

    #[test]
    fn test_to_change_events_kinds() {
        let path = PathBuf::from("/definitely/missing/lib/main.dart");

        let created = Event::new(EventKind::Create(notify::event::CreateKind::File))
            .add_path(path.clone());
        assert_eq!(to_change_events(&created), vec![ChangeEvent::created(&path)]);

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(
            notify::event::DataChange::Content,
        )))
        .add_path(path.clone());
        assert_eq!(to_change_events(&modified), vec![ChangeEvent::changed(&path)]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        assert_eq!(to_change_events(&removed), vec![ChangeEvent::deleted(&path)]);
    }

    #[test]
    fn test_to_change_events_skips_access_and_metadata() {
        let path = PathBuf::from("/definitely/missing/lib/main.dart");

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(path.clone());
        assert!(to_change_events(&access).is_empty());

        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(
            notify::event::MetadataKind::Any,
        )))
        .add_path(path);
        assert!(to_change_events(&metadata).is_empty());
    }

    #[test]
    fn test_file_watcher_creation() {
        let watcher = FileWatcher::new("/tmp/fpreview_missing_project");
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_not_started() {
        let mut watcher = FileWatcher::new("/tmp/fpreview_missing_project");

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_double_start_error() {
        let temp = tempdir().unwrap();
        let mut watcher = FileWatcher::new(temp.path());
        let (tx, _rx) = mpsc::channel(32);

        assert!(watcher.start(tx.clone()).is_ok());
        assert!(watcher.is_running());

        let second = watcher.start(tx);
        assert!(matches!(second, Err(Error::Watcher { .. })));

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_forwards_changes_outside_ignored_dirs() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("lib")).unwrap();
        std::fs::create_dir_all(temp.path().join(".dart_tool")).unwrap();

        let mut watcher =
            FileWatcher::new(temp.path()).with_ignore(vec![".dart_tool".to_string()]);
        let root = watcher.root().to_path_buf();
        let (tx, mut rx) = mpsc::channel(256);
        watcher.start(tx).unwrap();

        std::fs::write(temp.path().join(".dart_tool/cache.json"), "{}").unwrap();
        std::fs::write(temp.path().join("lib/main.dart"), "void main() {}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("watcher channel closed");
                assert!(!is_ignored(&root, &event.path, &[".dart_tool".to_string()]));
                if event.path.ends_with("lib/main.dart") {
                    return event;
                }
            }
        })
        .await
        .expect("change for lib/main.dart");

        assert!(matches!(
            event.kind,
            ChangeKind::Created | ChangeKind::Changed
        ));
    }
}
