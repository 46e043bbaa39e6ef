//! Launching the dev server executable

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio::sync::mpsc;

use super::process::{isolate_process_group, ServerProcess};
use fpreview_core::events::ServerEvent;
use fpreview_core::prelude::*;

/// Base arguments: run in web-server mode on an auto-assigned port
pub const WEB_SERVER_ARGS: &[&str] = &["run", "-d", "web-server", "--web-port", "0"];

/// Default executable name, resolved through `PATH`
pub const DEFAULT_FLUTTER_EXECUTABLE: &str = "flutter";

/// Build the full argument list for a dev server launch
pub fn web_server_args(custom_args: &[String]) -> Vec<String> {
    WEB_SERVER_ARGS
        .iter()
        .map(|s| (*s).to_string())
        .chain(custom_args.iter().cloned())
        .collect()
}

/// Starts a dev server process.
///
/// The controller owns the session bookkeeping; implementations only turn an
/// argument list and a working directory into a running [`ServerProcess`].
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        args: &[String],
        cwd: &Path,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<ServerProcess>;
}

/// Launches the real `flutter` tool
#[derive(Debug, Clone)]
pub struct FlutterLauncher {
    executable: String,
}

impl Default for FlutterLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_FLUTTER_EXECUTABLE)
    }
}

impl FlutterLauncher {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Resolve the executable through `PATH` (absolute paths are checked as-is)
    fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.executable).map_err(|e| {
            Error::process_spawn(format!(
                "Flutter SDK not found: '{}' could not be resolved ({}). Ensure 'flutter' is in your PATH.",
                self.executable, e
            ))
        })
    }
}

impl ProcessLauncher for FlutterLauncher {
    fn launch(
        &self,
        args: &[String],
        cwd: &Path,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<ServerProcess> {
        let executable = self.resolve()?;

        info!("Executing Flutter command: {} {}", executable.display(), args.join(" "));
        info!("Workspace root: {}", cwd.display());

        let mut command = std::process::Command::new(&executable);
        command.args(args).current_dir(cwd);
        isolate_process_group(&mut command);

        ServerProcess::spawn(Command::from(command), event_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_server_args_without_custom_flags() {
        assert_eq!(
            web_server_args(&[]),
            vec!["run", "-d", "web-server", "--web-port", "0"]
        );
    }

    #[test]
    fn test_web_server_args_appends_custom_flags() {
        let args = web_server_args(&["--web-renderer".to_string(), "html".to_string()]);
        assert_eq!(args.len(), 7);
        assert_eq!(&args[..5], WEB_SERVER_ARGS);
        assert_eq!(args[5], "--web-renderer");
        assert_eq!(args[6], "html");
    }

    #[test]
    fn test_default_executable() {
        assert_eq!(FlutterLauncher::default().executable(), "flutter");
    }

    #[tokio::test]
    async fn test_launch_unresolvable_executable() {
        let launcher = FlutterLauncher::new("definitely-not-a-real-flutter-binary");
        let (tx, _rx) = mpsc::channel(4);
        let result = launcher.launch(&web_server_args(&[]), Path::new("."), tx);

        match result {
            Err(Error::ProcessSpawn { reason }) => {
                assert!(reason.contains("definitely-not-a-real-flutter-binary"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("launch should fail"),
        }
    }
}
