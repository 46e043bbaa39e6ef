//! Host transport - NDJSON over stdio
//!
//! The editor side of the preview talks to this process through stdin and
//! stdout, one JSON object per line.
//!
//! # Outbound
//!
//! Frame messages are written as-is; notifications are wrapped so the host can
//! tell them apart:
//!
//! ```json
//! {"command":"setAppUrl","url":"http://127.0.0.1:53182"}
//! {"command":"fileChanged","fileName":"lib/main.dart","autoReload":true}
//! {"notification":{"level":"info","message":"Starting Flutter web server..."},"timestamp":1704700001000}
//! ```
//!
//! # Inbound
//!
//! Either a panel message (`{"command":"webviewReady"}`) or a single-word
//! shortcut: `r` reload, `R` restart, `o` rotate, `a` toggle auto reload,
//! `q` quit.

pub mod runner;

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use fpreview_app::{
    DisplayMessage, DisplaySurface, Message, Notification, PanelMessage, QuitReason,
};
use fpreview_core::prelude::*;

/// One outbound line
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HostEvent {
    Display(DisplayMessage),
    Notification {
        notification: Notification,
        timestamp: i64,
    },
}

impl HostEvent {
    pub fn notification(notification: Notification) -> Self {
        Self::Notification {
            notification,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// [`DisplaySurface`] writing NDJSON lines to a writer (stdout in production)
pub struct NdjsonSurface<W: Write + Send> {
    writer: Mutex<W>,
}

impl NdjsonSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> NdjsonSurface<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: &HostEvent) {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize host event: {}", e);
                return;
            }
        };

        let Ok(mut writer) = self.writer.lock() else {
            error!("Host writer lock poisoned");
            return;
        };

        if let Err(e) = writeln!(writer, "{}", json) {
            error!("Failed to write host event: {}", e);
            return;
        }

        if let Err(e) = writer.flush() {
            error!("Failed to flush host output: {}", e);
        }
    }
}

impl<W: Write + Send> DisplaySurface for NdjsonSurface<W> {
    fn post(&self, message: DisplayMessage) {
        self.emit(&HostEvent::Display(message));
    }

    fn notify(&self, notification: Notification) {
        self.emit(&HostEvent::notification(notification));
    }
}

/// Parse one inbound line.
///
/// Returns `Ok(None)` for blank lines and unknown shortcuts.
pub fn parse_host_line(line: &str) -> Result<Option<Message>> {
    let trimmed = line.trim();

    if trimmed.starts_with('{') {
        let panel: PanelMessage = serde_json::from_str(trimmed)
            .map_err(|e| Error::protocol(format!("Invalid panel message: {}", e)))?;
        return Ok(Some(Message::Panel(panel)));
    }

    let message = match trimmed {
        "r" | "reload" => Message::HotReload,
        "R" | "restart" => Message::HotRestart,
        "o" | "rotate" => Message::Rotate,
        "a" | "auto-reload" => Message::ToggleAutoReload,
        "q" | "quit" => Message::Quit(QuitReason::Requested),
        "" => return Ok(None),
        other => {
            warn!("Unknown stdin command: {}", other);
            return Ok(None);
        }
    };

    Ok(Some(message))
}
