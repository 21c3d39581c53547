use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dispatcher::DispatcherConfig;

/// Daemon settings from `config.toml`. Every field is optional; CLI flags
/// override file values, file values override built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonSettings {
    /// Listen address for the daemon (e.g. "0.0.0.0:2223")
    pub listen_address: Option<String>,
    /// Capacity of the fast job lane
    pub queue_fast: Option<usize>,
    /// Capacity of the slow job lane
    pub queue_slow: Option<usize>,
    /// Maximum simultaneously executing jobs
    pub concurrent: Option<usize>,
    /// Capacity of the duplicate-suppression window
    pub track_duplicate_ids: Option<usize>,
}

impl DaemonSettings {
    /// $CASK_CONFIG_DIR/config.toml or ~/.config/cask/config.toml
    pub fn config_path() -> PathBuf {
        crate::clienv::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        tracing::trace!(path = %path.display(), "Loading daemon settings");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        tracing::trace!(?settings, "Daemon settings loaded");
        Ok(settings)
    }

    /// Dispatcher tuning with unset fields filled from the defaults.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let defaults = DispatcherConfig::default();
        DispatcherConfig {
            queue_fast: self.queue_fast.unwrap_or(defaults.queue_fast),
            queue_slow: self.queue_slow.unwrap_or(defaults.queue_slow),
            concurrent: self.concurrent.unwrap_or(defaults.concurrent),
            track_duplicate_ids: self
                .track_duplicate_ids
                .unwrap_or(defaults.track_duplicate_ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_yield_default_dispatcher_config() {
        let config = DaemonSettings::default().dispatcher_config();
        let defaults = DispatcherConfig::default();
        assert_eq!(config.queue_fast, defaults.queue_fast);
        assert_eq!(config.queue_slow, defaults.queue_slow);
        assert_eq!(config.concurrent, defaults.concurrent);
        assert_eq!(config.track_duplicate_ids, defaults.track_duplicate_ids);
    }

    #[test]
    fn file_values_override_defaults() {
        let settings: DaemonSettings = toml::from_str(
            r#"
            listen_address = "127.0.0.1:9000"
            concurrent = 8
            "#,
        )
        .unwrap();
        let config = settings.dispatcher_config();
        assert_eq!(config.concurrent, 8);
        assert_eq!(config.queue_fast, DispatcherConfig::default().queue_fast);
        assert_eq!(settings.listen_address.as_deref(), Some("127.0.0.1:9000"));
    }
}
