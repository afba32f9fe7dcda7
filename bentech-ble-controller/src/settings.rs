//! Local settings store
//!
//! String key-value persistence for WiFi credentials: read by the UI before
//! a connect attempt, written by the session once the hub has accepted the
//! credentials.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Keys the session writes on a successful WiFi handshake.
pub const WIFI_SSID_KEY: &str = "wifi_ssid";
pub const WIFI_PASSWORD_KEY: &str = "wifi_password";

/// String key-value persistence.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> io::Result<()>;
}

/// File-backed settings at `$BENTECH_HOME/settings.json`.
pub struct JsonSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonSettings {
    /// Resolve the settings directory: `BENTECH_HOME`, or `~/.bentech`.
    pub fn home_dir() -> PathBuf {
        std::env::var("BENTECH_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .expect("Could not determine home directory")
                    .join(".bentech")
            })
    }

    pub fn open(home: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(home)?;
        let path = home.join("settings.json");

        let values = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, values })
    }

    fn save(&self) -> io::Result<()> {
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.values).unwrap())
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }
}
