use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::PreferenceSync`] instance. Every field has a default, so hosts only need to
/// pass what they override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub cache_ttl_ms: u64,
    pub debounce_ms: u64,
    /// A logout flag older than this is treated as left over from a crashed logout and cleared.
    pub logout_flag_timeout_ms: u64,
    pub keys: StorageKeys,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60_000,
            debounce_ms: 100,
            logout_flag_timeout_ms: 30_000,
            keys: StorageKeys::default(),
        }
    }
}

impl SyncConfig {
    pub fn cache_ttl(&self) -> TimeDelta {
        millis(self.cache_ttl_ms)
    }

    pub fn debounce_window(&self) -> TimeDelta {
        millis(self.debounce_ms)
    }

    pub fn debounce_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }

    pub fn logout_flag_timeout(&self) -> TimeDelta {
        millis(self.logout_flag_timeout_ms)
    }
}

fn millis(ms: u64) -> TimeDelta {
    i64::try_from(ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .unwrap_or(TimeDelta::MAX)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageKeys {
    pub user_config: String,
    pub guest_config: String,
    /// Session-storage key holding `{ "id": ... }` for the logged-in user.
    pub session: String,
    pub logout_flag: String,
    /// Holds the owner id while the durable user record has changes the remote has not confirmed.
    pub unsynced: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            user_config: "user_config".to_string(),
            guest_config: "guest_userconfig".to_string(),
            session: "user".to_string(),
            logout_flag: "is_logging_out".to_string(),
            unsynced: "user_config_unsynced".to_string(),
        }
    }
}

impl StorageKeys {
    pub fn is_config_key(&self, key: &str) -> bool {
        key == self.user_config || key == self.guest_config
    }
}
