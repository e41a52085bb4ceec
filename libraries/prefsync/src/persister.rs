use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StorageKeys;
use crate::data_model::ConfigRecord;
use crate::host::KeyValueStore;

/// Reads and writes the durable configuration records: one for the authenticated user, one for the
/// guest, plus the logout-in-progress flag and the unsynced mark.
pub struct DurablePersister {
    store: Rc<dyn KeyValueStore>,
    keys: StorageKeys,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutFlag {
    started_at: DateTime<Utc>,
}

impl DurablePersister {
    pub fn new(store: Rc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    /// Returns the stored user record, but only if it may be used for `user_id`.
    pub fn load_user(&self, user_id: &str) -> Option<ConfigRecord> {
        let record = self.read(&self.keys.user_config)?;
        if record.trusted_for(user_id) {
            Some(record)
        } else {
            log::debug!(
                "Ignoring stored user config owned by {:?} while resolving {user_id}",
                record.owner_id
            );
            None
        }
    }

    /// Returns true if anything was written.
    pub fn save_user(&self, record: &ConfigRecord) -> bool {
        debug_assert!(record.owner_id.is_some(), "user records must be tagged");
        self.write(&self.keys.user_config, record)
    }

    pub fn remove_user(&self) {
        self.store.remove(&self.keys.user_config);
        self.clear_unsynced();
    }

    /// Records that the user record for `owner_id` is ahead of the remote one.
    pub fn mark_unsynced(&self, owner_id: &str) {
        if self.store.get(&self.keys.unsynced).as_deref() == Some(owner_id) {
            return;
        }
        if let Err(e) = self.store.set(&self.keys.unsynced, owner_id) {
            log::warn!("Failed to mark config of {owner_id} as unsynced: {e}");
        }
    }

    pub fn clear_unsynced(&self) {
        self.store.remove(&self.keys.unsynced);
    }

    pub fn is_unsynced(&self, owner_id: &str) -> bool {
        self.store.get(&self.keys.unsynced).as_deref() == Some(owner_id)
    }

    pub fn load_guest(&self) -> Option<ConfigRecord> {
        self.read(&self.keys.guest_config)
    }

    pub fn save_guest(&self, record: &ConfigRecord) -> bool {
        self.write(&self.keys.guest_config, record)
    }

    pub fn remove_guest(&self) {
        self.store.remove(&self.keys.guest_config);
    }

    pub fn begin_logout(&self, now: DateTime<Utc>) {
        self.write_logout_flag(now);
    }

    pub fn clear_logout(&self) {
        self.store.remove(&self.keys.logout_flag);
    }

    /// A flag older than `timeout` is left over from a logout that never finished; it is removed here.
    pub fn logout_in_progress(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        let Some(raw) = self.store.get(&self.keys.logout_flag) else {
            return false;
        };
        let started_at = match serde_json::from_str::<LogoutFlag>(&raw) {
            Ok(flag) => flag.started_at,
            Err(_) if raw == "true" => {
                // Bare boolean written without a timestamp: start the clock now so it still expires.
                self.write_logout_flag(now);
                now
            }
            Err(_) => {
                self.clear_logout();
                return false;
            }
        };
        if started_at > now {
            log::warn!("Clearing logout flag set in the future ({started_at}); the clock moved back");
            self.clear_logout();
            return false;
        }
        if now - started_at >= timeout {
            log::warn!("Clearing logout flag set at {started_at}; the logout never completed");
            self.clear_logout();
            return false;
        }
        true
    }

    fn write_logout_flag(&self, now: DateTime<Utc>) {
        let flag = LogoutFlag { started_at: now };
        match serde_json::to_string(&flag) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.keys.logout_flag, &raw) {
                    log::error!("Failed to set logout flag: {e}");
                }
            }
            Err(e) => log::error!("Failed to serialize logout flag: {e}"),
        }
    }

    fn read(&self, key: &str) -> Option<ConfigRecord> {
        let raw = self.store.get(key)?;
        ConfigRecord::from_json_str(&raw)
            .inspect_err(|e| log::warn!("Treating malformed record under {key} as absent: {e}"))
            .ok()
    }

    fn write(&self, key: &str, record: &ConfigRecord) -> bool {
        let serialized = match record.to_json_string() {
            Ok(serialized) => serialized,
            Err(e) => {
                log::error!("Failed to serialize config record for {key}: {e}");
                return false;
            }
        };
        if self.store.get(key).as_deref() == Some(serialized.as_str()) {
            return false;
        }
        match self.store.set(key, &serialized) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Keeping in-memory config only: {e}");
                false
            }
        }
    }
}
