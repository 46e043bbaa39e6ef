//! # fpreview-app - Reload Coordination and Orchestration
//!
//! Turns file edits into debounced hot reloads and wires the dev server, the
//! watchers and the device-frame UI into one event loop.
//!
//! Depends on [`fpreview_core`] for events and errors, and on
//! [`fpreview_daemon`] for the dev server process.
//!
//! ## Public API
//!
//! ### Reload Coordination
//! - [`ReloadCoordinator`] - Typing-aware debounce from file change to hot reload
//! - [`ReloadControl`] - Where reload/restart requests go
//! - [`FileWatcher`] - Recursive workspace watcher producing change events
//!
//! ### Device Frame
//! - [`EmulatorPanel`] - Orientation, device selection, panel message handling
//! - [`DisplayMessage`], [`PanelMessage`], [`Notification`] - Wire messages
//! - [`DisplaySurface`] - Outbound sink implemented by the host transport
//!
//! ### Orchestration
//! - [`Engine`] - The session event loop
//! - [`Message`] - Inputs to the event loop
//!
//! ### Configuration
//! - [`config::Settings`] - `.fpreview/config.toml`
//! - [`config::ConfigWatcher`] - Live settings reload

pub mod config;
pub mod coordinator;
pub mod display;
pub mod engine;
pub mod message;
pub mod panel;
pub mod signals;
pub mod watcher;

pub use coordinator::{DebounceState, ReloadControl, ReloadCoordinator, SettleOutcome};
pub use display::{DisplayMessage, DisplaySurface, Notification, NotifyLevel, PanelMessage};
#[cfg(any(test, feature = "test-helpers"))]
pub use display::{Recorded, RecordingSurface};
pub use engine::{Engine, EngineOptions};
pub use message::{Message, QuitReason};
pub use signals::ShutdownSignal;
pub use panel::{EmulatorPanel, PanelAction};
pub use watcher::FileWatcher;
