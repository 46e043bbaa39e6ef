//! Settings parser for .fpreview/config.toml

use std::path::{Path, PathBuf};

use toml_edit::{value, DocumentMut};

use super::types::{Settings, MIN_SETTLE_MARGIN_MS};
use fpreview_core::prelude::*;

pub const CONFIG_FILENAME: &str = "config.toml";
pub const FPREVIEW_DIR: &str = ".fpreview";

/// Location of the config file for a workspace
pub fn config_path(project_path: &Path) -> PathBuf {
    project_path.join(FPREVIEW_DIR).join(CONFIG_FILENAME)
}

/// Load settings from `.fpreview/config.toml`.
///
/// Missing or unparsable files yield defaults. The result is always
/// validated.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = config_path(project_path);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    let settings = match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    };

    validate_settings(settings)
}

/// Repair settings the coordinator cannot work with.
///
/// The settle check requires the debounce delay to exceed the typing delay;
/// otherwise the debounce is raised to `typing_delay + 500ms`.
pub fn validate_settings(mut settings: Settings) -> Settings {
    let watcher = &mut settings.watcher;
    if watcher.debounce_ms <= watcher.typing_delay_ms {
        let corrected = watcher.typing_delay_ms + MIN_SETTLE_MARGIN_MS;
        warn!(
            "watcher.debounceMs ({}) must exceed watcher.typingDelayMs ({}), using {}",
            watcher.debounce_ms, watcher.typing_delay_ms, corrected
        );
        watcher.debounce_ms = corrected;
    }

    if watcher.extensions.is_empty() {
        warn!("watcher.extensions is empty, no change will trigger a reload");
    }

    settings
}

/// Create a commented default config in `.fpreview/` if none exists
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let fpreview_dir = project_path.join(FPREVIEW_DIR);

    if !fpreview_dir.exists() {
        std::fs::create_dir_all(&fpreview_dir)
            .map_err(|e| Error::config(format!("Failed to create .fpreview dir: {}", e)))?;
    }

    let config_path = fpreview_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# Flutter Preview Configuration

defaultDevice = "iPhone 14"
autoReload = true          # Hot reload once edits settle
customFlags = []           # Extra arguments for `flutter run`
flutterPath = "flutter"    # Resolved through PATH

[watcher]
debounceMs = 2000          # Quiet period before a reload
typingDelayMs = 1500       # Changes closer than this count as typing
extensions = ["dart"]
ignore = [".dart_tool"]

[devicePresets."iPhone 14"]
width = 390
height = 844
pixelRatio = 3.0

[devicePresets."Pixel 7"]
width = 412
height = 915
pixelRatio = 2.625

[devicePresets."iPad Air"]
width = 820
height = 1180
pixelRatio = 2.0
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

/// Save settings to `.fpreview/config.toml`.
///
/// Writes to a temp file first, then renames for atomicity.
pub fn save_settings(project_path: &Path, settings: &Settings) -> Result<()> {
    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    write_config(project_path, &format!("{}{}", CONFIG_HEADER, content))?;

    info!("Saved settings to {:?}", config_path(project_path));
    Ok(())
}

/// Persist a new `autoReload` value.
///
/// Only that key is rewritten; comments, formatting and every other value
/// stay as the user left them. A file that is not valid TOML is left alone
/// and reported as an error.
pub fn save_auto_reload(project_path: &Path, enabled: bool) -> Result<()> {
    let path = config_path(project_path);

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let settings = Settings {
                auto_reload: enabled,
                ..Settings::default()
            };
            return save_settings(project_path, &settings)
                .context("Failed to persist autoReload");
        }
        Err(e) => {
            return Err(Error::config(format!("Failed to read {:?}: {}", path, e)));
        }
    };

    let mut doc: DocumentMut = content.parse().map_err(|e| {
        Error::config(format!(
            "Not saving autoReload, {:?} is not valid TOML: {}",
            path, e
        ))
    })?;
    doc["autoReload"] = value(enabled);

    write_config(project_path, &doc.to_string()).context("Failed to persist autoReload")?;
    info!("Saved autoReload = {} to {:?}", enabled, path);
    Ok(())
}

/// Replace config.toml through a temp file and rename
fn write_config(project_path: &Path, content: &str) -> Result<()> {
    let fpreview_dir = project_path.join(FPREVIEW_DIR);

    if !fpreview_dir.exists() {
        std::fs::create_dir_all(&fpreview_dir)
            .map_err(|e| Error::config(format!("Failed to create .fpreview dir: {}", e)))?;
    }

    let config_path = fpreview_dir.join(CONFIG_FILENAME);
    let temp_path = fpreview_dir.join(".config.toml.tmp");

    std::fs::write(&temp_path, content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;

    std::fs::rename(&temp_path, &config_path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    Ok(())
}

const CONFIG_HEADER: &str = "# Flutter Preview Configuration\n# Generated by fpreview\n\n";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert!(settings.auto_reload);
        assert_eq!(settings.watcher.debounce_ms, 2000);
        assert_eq!(settings.watcher.typing_delay_ms, 1500);
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();

        let config = r#"
autoReload = false
customFlags = ["--release"]

[watcher]
debounceMs = 4000
"#;
        std::fs::write(dir.join("config.toml"), config).unwrap();

        let settings = load_settings(temp.path());

        assert!(!settings.auto_reload);
        assert_eq!(settings.custom_flags, vec!["--release"]);
        assert_eq!(settings.watcher.debounce_ms, 4000);
        assert_eq!(settings.watcher.typing_delay_ms, 1500);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(dir.join("config.toml"), "not valid toml {{{{").unwrap();

        assert_eq!(load_settings(temp.path()), Settings::default());
    }

    #[test]
    fn test_debounce_not_above_typing_delay_is_corrected() {
        let mut settings = Settings::default();
        settings.watcher.debounce_ms = 1000;
        settings.watcher.typing_delay_ms = 1500;

        let settings = validate_settings(settings);

        assert_eq!(settings.watcher.debounce_ms, 2000);
    }

    #[test]
    fn test_equal_delays_are_corrected() {
        let mut settings = Settings::default();
        settings.watcher.debounce_ms = 800;
        settings.watcher.typing_delay_ms = 800;

        assert_eq!(validate_settings(settings).watcher.debounce_ms, 1300);
    }

    #[test]
    fn test_valid_delays_untouched() {
        let settings = validate_settings(Settings::default());
        assert_eq!(settings.watcher.debounce_ms, 2000);
    }

    #[test]
    fn test_init_config_dir() {
        let temp = tempdir().unwrap();

        init_config_dir(temp.path()).unwrap();

        assert!(config_path(temp.path()).exists());
        let settings = load_settings(temp.path());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_config_dir_keeps_existing_file() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "autoReload = false\n").unwrap();

        init_config_dir(temp.path()).unwrap();

        assert!(!load_settings(temp.path()).auto_reload);
    }

    #[test]
    fn test_save_and_load_settings() {
        let temp = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.custom_flags = vec!["--web-renderer".to_string(), "html".to_string()];
        settings.default_device = "Pixel 7".to_string();

        save_settings(temp.path(), &settings).unwrap();

        let content = std::fs::read_to_string(config_path(temp.path())).unwrap();
        assert!(content.starts_with("# Flutter Preview Configuration"));
        assert!(content.contains("customFlags"));
        assert!(!temp.path().join(".fpreview/.config.toml.tmp").exists());
        assert_eq!(load_settings(temp.path()), settings);
    }

    #[test]
    fn test_save_auto_reload_preserves_other_keys() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "customFlags = [\"--profile\"]\nautoReload = true\n",
        )
        .unwrap();

        save_auto_reload(temp.path(), false).unwrap();

        let settings = load_settings(temp.path());
        assert!(!settings.auto_reload);
        assert_eq!(settings.custom_flags, vec!["--profile"]);
    }

    #[test]
    fn test_save_auto_reload_keeps_comments_and_raw_values() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();
        let original = r#"# my preview setup
defaultDevice = "Pixel 7"
autoReload = true

[watcher]
# deliberately short, corrected on load
debounceMs = 100
typingDelayMs = 1500
"#;
        std::fs::write(dir.join("config.toml"), original).unwrap();

        save_auto_reload(temp.path(), false).unwrap();

        let written = std::fs::read_to_string(dir.join("config.toml")).unwrap();
        assert_eq!(written, original.replace("autoReload = true", "autoReload = false"));
    }

    #[test]
    fn test_save_auto_reload_adds_missing_key() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "defaultDevice = \"iPad Air\"\n\n[watcher]\ndebounceMs = 3000\n",
        )
        .unwrap();

        save_auto_reload(temp.path(), false).unwrap();

        let settings = load_settings(temp.path());
        assert!(!settings.auto_reload);
        assert_eq!(settings.default_device, "iPad Air");
        assert_eq!(settings.watcher.debounce_ms, 3000);
    }

    #[test]
    fn test_save_auto_reload_refuses_invalid_file() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".fpreview");
        std::fs::create_dir_all(&dir).unwrap();
        let broken = "customFlags = [\"--release\"]\ndefaultDevice = \"Pixel 7\"\nautoReload = tru\n";
        std::fs::write(dir.join("config.toml"), broken).unwrap();

        let result = save_auto_reload(temp.path(), false);

        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(
            std::fs::read_to_string(dir.join("config.toml")).unwrap(),
            broken
        );
    }

    #[test]
    fn test_save_auto_reload_without_file_writes_defaults() {
        let temp = tempdir().unwrap();

        save_auto_reload(temp.path(), false).unwrap();

        let settings = load_settings(temp.path());
        assert!(!settings.auto_reload);
        assert_eq!(settings.default_device, Settings::default().default_device);
    }
}
