//! Settings store: the three user toggles plus theme propagation.

use std::sync::{Arc, RwLock};

use shared::domain::{Settings, Theme};
use tracing::debug;

use crate::{read_lock, write_lock};

/// Presentation-layer hook that receives every theme change.
pub trait ThemeSink: Send + Sync {
    fn apply_theme(&self, theme: Theme);
}

/// Theme sink for sessions with no presentation layer attached.
pub struct DetachedThemeSink;

impl ThemeSink for DetachedThemeSink {
    fn apply_theme(&self, _theme: Theme) {}
}

pub struct SettingsStore {
    values: RwLock<Settings>,
    theme_sink: Arc<dyn ThemeSink>,
}

impl SettingsStore {
    /// Creates the store and pushes the initial theme to the sink so the
    /// presentation layer starts out consistent with `initial.dark_mode`.
    pub fn new(initial: Settings, theme_sink: Arc<dyn ThemeSink>) -> Self {
        theme_sink.apply_theme(initial.theme());
        Self {
            values: RwLock::new(initial),
            theme_sink,
        }
    }

    pub fn snapshot(&self) -> Settings {
        *read_lock(&self.values)
    }

    pub fn high_quality(&self) -> bool {
        read_lock(&self.values).high_quality
    }

    pub fn set_high_quality(&self, enabled: bool) {
        write_lock(&self.values).high_quality = enabled;
        debug!(enabled, "high quality output toggled");
    }

    pub fn auto_save(&self) -> bool {
        read_lock(&self.values).auto_save
    }

    pub fn set_auto_save(&self, enabled: bool) {
        write_lock(&self.values).auto_save = enabled;
        debug!(enabled, "auto-save toggled");
    }

    pub fn dark_mode(&self) -> bool {
        read_lock(&self.values).dark_mode
    }

    /// Updates the flag, then notifies the theme sink outside the lock.
    pub fn set_dark_mode(&self, enabled: bool) -> Theme {
        write_lock(&self.values).dark_mode = enabled;
        let theme = Theme::from_dark_mode(enabled);
        self.theme_sink.apply_theme(theme);
        debug!(?theme, "theme applied");
        theme
    }

    pub fn theme(&self) -> Theme {
        read_lock(&self.values).theme()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<Theme>>,
    }

    impl ThemeSink for RecordingSink {
        fn apply_theme(&self, theme: Theme) {
            self.applied.lock().expect("sink lock").push(theme);
        }
    }

    #[test]
    fn setters_are_immediately_visible() {
        let store = SettingsStore::new(Settings::default(), Arc::new(DetachedThemeSink));
        store.set_high_quality(false);
        store.set_auto_save(false);
        assert!(!store.high_quality());
        assert!(!store.auto_save());
        assert!(store.dark_mode());
    }

    #[test]
    fn theme_changes_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let store = SettingsStore::new(Settings::default(), sink.clone());
        store.set_dark_mode(false);
        store.set_dark_mode(true);

        let applied = sink.applied.lock().expect("sink lock").clone();
        assert_eq!(applied, vec![Theme::Dark, Theme::Light, Theme::Dark]);
        assert_eq!(store.theme(), Theme::Dark);
    }
}
