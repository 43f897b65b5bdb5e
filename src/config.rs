use std::{collections::HashMap, sync::RwLock};

use tracing::{debug, warn};

use crate::{
    error::{Result, ThermostatError},
    types::{PollingConfig, TimeoutConfig},
    DEFAULT_BASE_URL,
};

/// Settings key holding the controller URL
pub const URL_KEY: &str = "url";
/// Settings key holding the pre-shared password
pub const PASSWORD_KEY: &str = "password";

/// Persistent key-value settings the client is configured from
pub trait SettingsStore: Send + Sync {
    /// Read `key`, falling back to `default` when it is unset
    fn get(&self, key: &str, default: &str) -> String;

    /// Persist `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process settings store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with URL and password
    #[must_use]
    pub fn with_settings(url: &str, password: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(URL_KEY.to_string(), url.to_string());
        values.insert(PASSWORD_KEY.to_string(), password.to_string());
        Self {
            values: RwLock::new(values),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(key).cloned())
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| ThermostatError::InvalidConfig("settings store poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read-only store backed by `THERMOSTAT_*` environment variables
///
/// `url` reads `THERMOSTAT_URL`, `password` reads `THERMOSTAT_PASSWORD`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvStore;

impl EnvStore {
    fn variable(key: &str) -> String {
        format!("THERMOSTAT_{}", key.to_ascii_uppercase())
    }
}

impl SettingsStore for EnvStore {
    fn get(&self, key: &str, default: &str) -> String {
        match std::env::var(Self::variable(key)) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => default.to_string(),
        }
    }

    fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(ThermostatError::InvalidConfig(format!(
            "environment settings are read-only ({})",
            Self::variable(key)
        )))
    }
}

/// Everything needed to construct a [`crate::ThermostatClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Normalised controller URL
    pub base_url: String,
    /// Plaintext password, hashed when the client is built
    pub password: String,
    /// Request deadlines
    pub timeouts: TimeoutConfig,
    /// Polling cadence
    pub polling: PollingConfig,
}

impl ClientConfig {
    /// Create a configuration with default timeouts and cadence
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the URL is empty.
    pub fn new(base_url: &str, password: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            password: password.into(),
            timeouts: TimeoutConfig::default(),
            polling: PollingConfig::default(),
        })
    }

    /// Load URL and password from a settings store
    ///
    /// # Errors
    ///
    /// Returns [`ThermostatError::InvalidConfig`] if the stored URL is empty.
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self> {
        let url = store.get(URL_KEY, DEFAULT_BASE_URL);
        let password = store.get(PASSWORD_KEY, "");
        if password.is_empty() {
            warn!("No password configured; requests will be anonymous until one is set");
        }
        debug!("Loaded settings for {}", url);
        Self::new(&url, password)
    }

    /// Override the timeouts
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Override the polling cadence
    #[must_use]
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }
}

/// Add a missing `http://` scheme and strip trailing slashes
///
/// # Errors
///
/// Returns [`ThermostatError::InvalidConfig`] if the URL is blank.
pub fn normalize_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ThermostatError::InvalidConfig(
            "controller URL is empty".to_string(),
        ));
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}

/// Persist new settings, normalising the URL first
///
/// Returns the normalised URL that was stored.
///
/// # Errors
///
/// Returns [`ThermostatError::InvalidConfig`] if the URL is blank or the
/// store rejects the write.
pub fn save_settings(store: &dyn SettingsStore, url: &str, password: &str) -> Result<String> {
    let url = normalize_base_url(url)?;
    store.set(PASSWORD_KEY, password)?;
    store.set(URL_KEY, &url)?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("192.168.1.20:5000").unwrap(),
            "http://192.168.1.20:5000"
        );
        assert_eq!(
            normalize_base_url("https://thermostat.local/").unwrap(),
            "https://thermostat.local"
        );
        assert_eq!(
            normalize_base_url("  http://pi  ").unwrap(),
            "http://pi"
        );
        assert_err!(normalize_base_url(""));
        assert_err!(normalize_base_url(" / "));
    }

    #[test]
    fn test_from_store_defaults() {
        let store = MemoryStore::new();
        let config = ClientConfig::from_store(&store).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.password.is_empty());
        assert_eq!(config.timeouts.request_timeout_ms, 1_000);
        assert_eq!(config.polling.no_data_interval_ms, 5_000);
    }

    #[test]
    fn test_from_store_values() {
        let store = MemoryStore::with_settings("pi.local:8080", "secret");
        let config = ClientConfig::from_store(&store).unwrap();
        assert_eq!(config.base_url, "http://pi.local:8080");
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_save_settings_round_trip() {
        let store = MemoryStore::new();
        let stored = assert_ok!(save_settings(&store, "thermostat:5000/", "pw"));
        assert_eq!(stored, "http://thermostat:5000");
        assert_eq!(store.get(URL_KEY, ""), "http://thermostat:5000");
        assert_eq!(store.get(PASSWORD_KEY, ""), "pw");
    }

    #[test]
    fn test_env_store_is_read_only() {
        let store = EnvStore;
        assert_err!(store.set(URL_KEY, "http://x"));
        assert_eq!(EnvStore::variable("url"), "THERMOSTAT_URL");
    }
}
