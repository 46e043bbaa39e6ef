//! Configuration types for Flutter Preview
//!
//! Defines:
//! - `Settings` - Everything read from `.fpreview/config.toml`
//! - `DevicePreset` - Logical screen size of a simulated device
//! - `WatcherSettings` - File watching and debounce timings
//! - `ReloadPolicy` - The subset the reload coordinator consumes

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Device used when `defaultDevice` names no known preset
pub const FALLBACK_DEVICE: DevicePreset = DevicePreset {
    width: 390,
    height: 844,
    pixel_ratio: 3.0,
};

pub const DEFAULT_DEVICE_NAME: &str = "iPhone 14";

/// Minimum gap enforced between typing delay and debounce delay
pub const MIN_SETTLE_MARGIN_MS: u64 = 500;

/// Logical screen dimensions of a simulated device
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePreset {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
}

impl DevicePreset {
    pub fn new(width: u32, height: u32, pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    /// Swap width and height
    pub fn rotated(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
            pixel_ratio: self.pixel_ratio,
        }
    }
}

impl std::fmt::Display for DevicePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @{}x", self.width, self.height, self.pixel_ratio)
    }
}

/// Global settings from `.fpreview/config.toml`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Preset name shown when the preview opens
    #[serde(default = "default_device_name")]
    pub default_device: String,

    /// Hot reload automatically once edits settle
    #[serde(default = "default_true")]
    pub auto_reload: bool,

    /// Deprecated. Hot reload is always on; only produces a warning.
    #[serde(default)]
    pub experimental_hot_reload: bool,

    /// Extra arguments appended to `flutter run`
    #[serde(default)]
    pub custom_flags: Vec<String>,

    /// Flutter executable, resolved through `PATH` when not absolute
    #[serde(default = "default_flutter_path")]
    pub flutter_path: String,

    #[serde(default = "default_device_presets")]
    pub device_presets: BTreeMap<String, DevicePreset>,

    #[serde(default)]
    pub watcher: WatcherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_device: default_device_name(),
            auto_reload: true,
            experimental_hot_reload: false,
            custom_flags: Vec::new(),
            flutter_path: default_flutter_path(),
            device_presets: default_device_presets(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve `defaultDevice` against the presets
    pub fn default_device_preset(&self) -> DevicePreset {
        self.device_preset(&self.default_device)
    }

    /// Look up a preset by name, falling back to a 390x844 @3x phone
    pub fn device_preset(&self, name: &str) -> DevicePreset {
        self.device_presets
            .get(name)
            .copied()
            .unwrap_or(FALLBACK_DEVICE)
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        ReloadPolicy {
            auto_reload: self.auto_reload,
            debounce: Duration::from_millis(self.watcher.debounce_ms),
            typing_delay: Duration::from_millis(self.watcher.typing_delay_ms),
            extensions: self.watcher.extensions.clone(),
            ignore: self.watcher.ignore.clone(),
        }
    }
}

/// File watcher and debounce settings (`[watcher]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSettings {
    /// Quiet period after the last change before a reload
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// A change younger than this means the user is still typing
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,

    /// File extensions that trigger a reload (without the dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Top-level directories never watched, relative to the workspace root
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            typing_delay_ms: default_typing_delay_ms(),
            extensions: default_extensions(),
            ignore: default_ignore(),
        }
    }
}

/// What the reload coordinator needs from the settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadPolicy {
    pub auto_reload: bool,
    pub debounce: Duration,
    pub typing_delay: Duration,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
}

impl Default for ReloadPolicy {
    fn default() -> Self {
        Settings::default().reload_policy()
    }
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_device_presets() -> BTreeMap<String, DevicePreset> {
    BTreeMap::from([
        (DEFAULT_DEVICE_NAME.to_string(), FALLBACK_DEVICE),
        ("Pixel 7".to_string(), DevicePreset::new(412, 915, 2.625)),
        ("iPad Air".to_string(), DevicePreset::new(820, 1180, 2.0)),
    ])
}

fn default_pixel_ratio() -> f64 {
    1.0
}

fn default_flutter_path() -> String {
    fpreview_daemon::launcher::DEFAULT_FLUTTER_EXECUTABLE.to_string()
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_typing_delay_ms() -> u64 {
    1500
}

fn default_extensions() -> Vec<String> {
    vec!["dart".to_string()]
}

fn default_ignore() -> Vec<String> {
    vec![".dart_tool".to_string()]
}

fn default_true() -> bool {
    true
}
