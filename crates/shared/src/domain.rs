use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one submission attempt so a completed result can be bound to the
/// request that produced it rather than to whatever is selected when it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark_mode(dark_mode: bool) -> Self {
        if dark_mode {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }
}

/// Which top-level view the presentation layer routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionView {
    #[default]
    Colorize,
    History,
    Settings,
}

impl SessionView {
    pub fn label(self) -> &'static str {
        match self {
            Self::Colorize => "colorize",
            Self::History => "history",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for SessionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SessionView {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "colorize" => Ok(Self::Colorize),
            "history" | "gallery" => Ok(Self::History),
            "settings" => Ok(Self::Settings),
            other => Err(format!("unknown view '{other}'")),
        }
    }
}

/// User-facing toggles. Defaults mirror a fresh session: everything on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub high_quality: bool,
    pub auto_save: bool,
    pub dark_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            high_quality: true,
            auto_save: true,
            dark_mode: true,
        }
    }
}

impl Settings {
    pub fn theme(&self) -> Theme {
        Theme::from_dark_mode(self.dark_mode)
    }
}
