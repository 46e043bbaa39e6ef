//! # fpreview-daemon - Dev Server Process Management
//!
//! Spawns `flutter run -d web-server`, discovers its serving URL, drives its
//! interactive stdin (`r`, `R`, `q`) and tears down the whole process tree.
//!
//! Depends on [`fpreview_core`] for events and error handling.
//!
//! ## Public API
//!
//! ### Lifecycle
//! - [`ProcessController`] - Single-session start/stop/reload with URL discovery
//! - [`StartupFailure`] - Why a start did not produce a URL
//!
//! ### Process Plumbing
//! - [`ServerProcess`] - Spawned child with stdout/stderr/exit forwarding
//! - [`ControlCommand`] - Single-character stdin commands
//! - [`ProcessLauncher`], [`FlutterLauncher`] - How the child gets spawned

pub mod commands;
pub mod controller;
pub mod launcher;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use commands::ControlCommand;
pub use controller::{
    ProcessController, StartupFailure, DEFAULT_GRACE_PERIOD, DEFAULT_STARTUP_TIMEOUT,
};
pub use launcher::{web_server_args, FlutterLauncher, ProcessLauncher, WEB_SERVER_ARGS};
pub use process::ServerProcess;
