//! Messages exchanged with the device-frame UI
//!
//! The UI itself lives outside this process. Outbound traffic is either a
//! [`DisplayMessage`] for the device frame or a [`Notification`] for the user;
//! inbound traffic is a [`PanelMessage`]. All three are JSON objects, the
//! frame messages tagged by `command`.

#[cfg(any(test, feature = "test-helpers"))]
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Messages posted to the device frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum DisplayMessage {
    /// Load the served application
    SetAppUrl { url: String },
    /// Reload the embedded page
    Reload,
    /// Orientation changed
    #[serde(rename_all = "camelCase")]
    Rotate { is_portrait: bool },
    /// A watched file settled after editing
    #[serde(rename_all = "camelCase")]
    FileChanged { file_name: String, auto_reload: bool },
}

/// Messages received from the device frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelMessage {
    /// The frame finished loading and can display the app
    WebviewReady,
    /// User pressed the reload button
    Reload,
    /// User pressed the rotate button
    Rotate,
    /// User picked another device preset
    DeviceChanged { device: String },
    #[serde(rename_all = "camelCase")]
    FullscreenToggled { is_fullscreen: bool },
    /// Anything this version does not understand
    #[serde(other)]
    Unknown,
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// A message shown to the user by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Error,
            message: message.into(),
        }
    }
}

/// Where display messages and notifications go.
///
/// Posting never fails from the caller's point of view; implementations log
/// their own delivery errors.
pub trait DisplaySurface: Send + Sync {
    fn post(&self, message: DisplayMessage);

    fn notify(&self, notification: Notification);
}

/// Everything a [`RecordingSurface`] received, in order
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Display(DisplayMessage),
    Notification(Notification),
}

/// In-memory surface for tests
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingSurface {
    recorded: Mutex<Vec<Recorded>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<DisplayMessage> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Display(message) => Some(message),
                Recorded::Notification(_) => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Notification(notification) => Some(notification),
                Recorded::Display(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.clear();
        }
    }

    fn push(&self, item: Recorded) {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(item);
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl DisplaySurface for RecordingSurface {
    fn post(&self, message: DisplayMessage) {
        self.push(Recorded::Display(message));
    }

    fn notify(&self, notification: Notification) {
        self.push(Recorded::Notification(notification));
    }
}
