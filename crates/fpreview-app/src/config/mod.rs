//! Configuration for Flutter Preview
//!
//! Supports:
//! - `.fpreview/config.toml` - Device presets, reload behavior, watcher timings
//! - Live reloading of that file through [`ConfigWatcher`]

pub mod settings;
pub mod types;
pub mod watch;

pub use settings::{
    config_path, init_config_dir, load_settings, save_auto_reload, save_settings,
    validate_settings,
};
pub use types::*;
pub use watch::ConfigWatcher;
