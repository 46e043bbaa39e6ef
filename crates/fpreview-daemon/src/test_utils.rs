//! Test utilities for process management
//!
//! Provides a [`ProcessLauncher`] that runs a shell script in place of the
//! `flutter` tool, so controller behavior can be exercised without an SDK.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::process::Command;
use tokio::sync::mpsc;

use crate::launcher::ProcessLauncher;
use crate::process::{isolate_process_group, ServerProcess};
use fpreview_core::events::ServerEvent;
use fpreview_core::prelude::*;

/// Launches `sh -c <script>` and records every launch.
///
/// The script sees the dev server arguments as `$@`.
#[derive(Debug)]
pub struct ScriptLauncher {
    script: String,
    failure: Option<String>,
    launches: AtomicUsize,
    last_args: Mutex<Vec<String>>,
}

impl ScriptLauncher {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            failure: None,
            launches: AtomicUsize::new(0),
            last_args: Mutex::new(Vec::new()),
        }
    }

    /// A launcher whose every launch fails with a spawn error
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new("")
        }
    }

    /// Number of launch attempts so far
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent launch
    pub fn last_args(&self) -> Vec<String> {
        self.last_args
            .lock()
            .map(|args| args.clone())
            .unwrap_or_default()
    }
}

impl ProcessLauncher for ScriptLauncher {
    fn launch(
        &self,
        args: &[String],
        cwd: &Path,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<ServerProcess> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_args.lock() {
            *last = args.to_vec();
        }

        if let Some(reason) = &self.failure {
            return Err(Error::process_spawn(reason.clone()));
        }

        let mut command = std::process::Command::new("sh");
        command
            .arg("-c")
            .arg(&self.script)
            .arg("flutter")
            .args(args)
            .current_dir(cwd);
        isolate_process_group(&mut command);

        ServerProcess::spawn(Command::from(command), event_tx)
    }
}

/// Whether `pid` names a live process. Zombies count as gone.
pub fn process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        // State is the first field after the parenthesized command name.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}

/// Poll until `pid` is gone, giving up after about `within`
pub async fn wait_for_process_gone(pid: u32, within: std::time::Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    !process_alive(pid)
}
