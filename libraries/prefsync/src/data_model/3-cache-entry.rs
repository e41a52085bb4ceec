//! # CacheEntry
//! The remote fetcher keeps a single cache slot rather than a map: only one identity is ever current in a
//! tab, so a second slot would only ever hold data for someone who is no longer logged in.

use chrono::{DateTime, TimeDelta, Utc};

use crate::data_model::ConfigRecord;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub owner_id: String,
    pub data: ConfigRecord,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh_for(&self, owner_id: &str, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.owner_id == owner_id && now - self.fetched_at < ttl
    }
}
