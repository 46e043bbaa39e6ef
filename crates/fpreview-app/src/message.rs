//! Message types for the engine event loop (TEA pattern)

use crate::display::PanelMessage;
use crate::signals::ShutdownSignal;

/// Everything the engine reacts to, apart from file changes, config reloads
/// and debounce deadlines which arrive on their own channels
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Message from the device frame
    Panel(PanelMessage),

    // ─────────────────────────────────────────────────────────
    // Host Shortcuts
    // ─────────────────────────────────────────────────────────
    /// Reload the frame and hot reload (`r`)
    HotReload,
    /// Hot restart (`R`)
    HotRestart,
    /// Rotate the device (`o`)
    Rotate,
    /// Flip and persist auto reload (`a`)
    ToggleAutoReload,
    /// Start the dev server without waiting for the frame
    StartServer,

    // ─────────────────────────────────────────────────────────
    // Dev Server
    // ─────────────────────────────────────────────────────────
    /// The background start task found the serving URL
    ServerStarted { url: String },
    /// The background start task failed
    ServerStartFailed { reason: String },

    /// Stop everything and exit
    Quit(QuitReason),
}

/// What asked the session to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitReason {
    /// `q` from the host
    Requested,
    /// The host closed stdin
    HostClosed,
    Signal(ShutdownSignal),
}

impl std::fmt::Display for QuitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuitReason::Requested => write!(f, "quit requested by host"),
            QuitReason::HostClosed => write!(f, "host closed stdin"),
            QuitReason::Signal(signal) => write!(f, "received {}", signal),
        }
    }
}
