//! Logging configuration using tracing

use std::ffi::OsString;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable that overrides the log filter
pub const LOG_ENV_VAR: &str = "FPREVIEW_LOG";

/// Environment variable that moves the log directory, e.g. into an editor's
/// extension storage
pub const LOG_DIR_ENV_VAR: &str = "FPREVIEW_LOG_DIR";

const DEFAULT_FILTER: &str = "flutter_preview=info,fpreview_core=info,fpreview_daemon=info,fpreview_app=info,warn";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/flutter-preview/logs/` (or the
/// platform equivalent, or `FPREVIEW_LOG_DIR`). Stdout is never used: it
/// carries the host protocol. Log level is controlled by the `FPREVIEW_LOG` environment variable.
///
/// # Examples
/// ```bash
/// FPREVIEW_LOG=debug fpreview
/// FPREVIEW_LOG=fpreview_app=trace fpreview ~/code/my_app
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "fpreview.log");

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!(
        "Flutter Preview {} starting (pid {}), logging to {}",
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        log_dir.display()
    );

    Ok(())
}

/// Resolve the log directory, honoring `FPREVIEW_LOG_DIR`
fn get_log_directory() -> PathBuf {
    resolve_log_directory(std::env::var_os(LOG_DIR_ENV_VAR), dirs::data_local_dir())
}

fn resolve_log_directory(override_dir: Option<OsString>, data_dir: Option<PathBuf>) -> PathBuf {
    match override_dir.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => data_dir
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flutter-preview")
            .join("logs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_under_platform_data_dir() {
        let dir = resolve_log_directory(None, Some(PathBuf::from("/home/dev/.local/share")));
        assert_eq!(
            dir,
            PathBuf::from("/home/dev/.local/share/flutter-preview/logs")
        );
    }

    #[test]
    fn test_log_dir_override_wins() {
        let dir = resolve_log_directory(
            Some(OsString::from("/tmp/fpreview-logs")),
            Some(PathBuf::from("/home/dev/.local/share")),
        );
        assert_eq!(dir, PathBuf::from("/tmp/fpreview-logs"));
    }

    #[test]
    fn test_empty_override_ignored() {
        let dir = resolve_log_directory(Some(OsString::new()), None);
        assert_eq!(dir, PathBuf::from("./flutter-preview/logs"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
