use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::ProgressConfig;
use serde::Deserialize;
use shared::protocol::DEFAULT_SERVICE_URL;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "colorizer.toml";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub service_url: String,
    /// `None` disables the client-side timeout.
    pub request_timeout: Option<Duration>,
    pub progress: ProgressConfig,
    /// Advisory: larger uploads are sent anyway, with a warning.
    pub max_upload_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.into(),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            progress: ProgressConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    service_url: Option<String>,
    request_timeout_secs: Option<u64>,
    progress_step: Option<u8>,
    progress_interval_ms: Option<u64>,
    progress_ceiling: Option<u8>,
    max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct ProgressParts {
    step: u8,
    interval_ms: u64,
    ceiling: u8,
}

impl ProgressParts {
    fn from_config(config: ProgressConfig) -> Self {
        Self {
            step: config.step(),
            interval_ms: u64::try_from(config.interval().as_millis()).unwrap_or(u64::MAX),
            ceiling: config.ceiling(),
        }
    }

    fn build(self) -> ProgressConfig {
        ProgressConfig::new(
            self.step,
            Duration::from_millis(self.interval_ms),
            self.ceiling,
        )
    }
}

/// Defaults, then `colorizer.toml` (or `path`), then the environment.
/// Command-line flags are layered on top by the caller.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    load_config_from(path, |key| std::env::var(key).ok())
}

pub fn load_config_from(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::default();
    let mut progress = ProgressParts::from_config(config.progress);

    let file = match path {
        Some(path) => Some(read_file_config(path)?),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Some(read_file_config(&default_path)?)
            } else {
                None
            }
        }
    };
    if let Some(file) = file {
        if let Some(v) = file.service_url {
            config.service_url = v;
        }
        if let Some(v) = file.request_timeout_secs {
            config.request_timeout = timeout_from_secs(v);
        }
        if let Some(v) = file.progress_step {
            progress.step = v;
        }
        if let Some(v) = file.progress_interval_ms {
            progress.interval_ms = v;
        }
        if let Some(v) = file.progress_ceiling {
            progress.ceiling = v;
        }
        if let Some(v) = file.max_upload_bytes {
            config.max_upload_bytes = v;
        }
    }

    if let Some(v) = env("COLORIZER_SERVICE_URL") {
        config.service_url = v;
    }
    if let Some(v) = env("APP__SERVICE_URL") {
        config.service_url = v;
    }
    if let Some(v) = parsed_env::<u64>(&env, "APP__REQUEST_TIMEOUT_SECS") {
        config.request_timeout = timeout_from_secs(v);
    }
    if let Some(v) = parsed_env::<u8>(&env, "APP__PROGRESS_STEP") {
        progress.step = v;
    }
    if let Some(v) = parsed_env::<u64>(&env, "APP__PROGRESS_INTERVAL_MS") {
        progress.interval_ms = v;
    }
    if let Some(v) = parsed_env::<u8>(&env, "APP__PROGRESS_CEILING") {
        progress.ceiling = v;
    }
    if let Some(v) = parsed_env::<u64>(&env, "APP__MAX_UPLOAD_BYTES") {
        config.max_upload_bytes = v;
    }

    config.progress = progress.build();
    Ok(config)
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

fn parsed_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("colorizer-config-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("config dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.service_url, "http://127.0.0.1:8000");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.progress.step(), 10);
        assert_eq!(config.progress.interval(), Duration::from_millis(500));
        assert_eq!(config.progress.ceiling(), 90);
    }

    #[test]
    fn file_values_apply_and_env_wins() {
        let path = write_config(
            "layered.toml",
            "service_url = \"http://file:9000\"\nprogress_step = 5\nrequest_timeout_secs = 0\n",
        );
        let config = load_config_from(
            Some(&path),
            env_of(&[("APP__SERVICE_URL", "http://env:7000"), ("APP__PROGRESS_CEILING", "80")]),
        )
        .expect("config");

        assert_eq!(config.service_url, "http://env:7000");
        assert_eq!(config.progress.step(), 5);
        assert_eq!(config.progress.ceiling(), 80);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn app_prefixed_url_overrides_short_form() {
        let config = load_config_from(
            Some(&write_config("empty.toml", "")),
            env_of(&[
                ("COLORIZER_SERVICE_URL", "http://short:1"),
                ("APP__SERVICE_URL", "http://long:2"),
            ]),
        )
        .expect("config");
        assert_eq!(config.service_url, "http://long:2");
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let config = load_config_from(
            Some(&write_config("plain.toml", "")),
            env_of(&[("APP__PROGRESS_STEP", "lots"), ("APP__MAX_UPLOAD_BYTES", "-1")]),
        )
        .expect("config");
        assert_eq!(config.progress.step(), 10);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn out_of_range_progress_falls_back() {
        let config = load_config_from(
            Some(&write_config("ceiling.toml", "progress_ceiling = 100\n")),
            env_of(&[]),
        )
        .expect("config");
        assert_eq!(config.progress, ProgressConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let missing = std::env::temp_dir().join("colorizer-config-does-not-exist.toml");
        assert!(load_config_from(Some(&missing), env_of(&[])).is_err());
    }
}
