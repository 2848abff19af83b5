use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use shared::domain::Settings;
use tracing::{debug, warn};

const APP_DIR: &str = "colorizer";
const SETTINGS_FILE: &str = "settings.json";

/// Persists the three user toggles between runs. A store without a path keeps
/// everything in memory.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: Option<PathBuf>,
}

impl PreferencesStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Per-user config dir, e.g. `~/.config/colorizer/settings.json`.
    pub fn user_default() -> anyhow::Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("unable to resolve user config dir"))?;
        Ok(Self::at(base.join(APP_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Missing files yield defaults; unreadable ones are logged and ignored.
    pub fn load(&self) -> Settings {
        let Some(path) = &self.path else {
            return Settings::default();
        };
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved settings; using defaults");
                return Settings::default();
            }
            Err(err) => {
                warn!(path = %path.display(), "failed to read saved settings: {err}");
                return Settings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), "ignoring corrupt settings file: {err}");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings dir '{}'", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write settings '{}'", path.display()))?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("colorizer-prefs-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn saved_settings_load_back() {
        let path = scratch("roundtrip").join(SETTINGS_FILE);
        let store = PreferencesStore::at(&path);
        let settings = Settings {
            high_quality: false,
            auto_save: true,
            dark_mode: false,
        };
        store.save(&settings).expect("save");
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let path = scratch("corrupt").join(SETTINGS_FILE);
        fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        fs::write(&path, "{ not json").expect("write");
        assert_eq!(PreferencesStore::at(&path).load(), Settings::default());
    }

    #[test]
    fn ephemeral_store_never_touches_disk() {
        let store = PreferencesStore::ephemeral();
        assert!(store.path().is_none());
        store.save(&Settings::default()).expect("noop save");
        assert_eq!(store.load(), Settings::default());
    }
}
