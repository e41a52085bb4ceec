//! Keeps a user's UI preferences (theme, language, notification opt-ins) consistent across logins,
//! logouts, page reloads and several open tabs.
//!
//! Syncing strategy:
//! 1. There are two durable records: one for the guest and one for the authenticated user, which carries its
//!    owner id so that it is never applied to somebody else.
//! 2. The server holds the authoritative record per user. Reads go through a short-lived cache and
//!    concurrent reads for the same user share one request.
//! 3. Local changes are applied and persisted immediately, then written to the server in the background.
//! 4. Whenever the identity or a durable record may have changed (this tab or another one), a reconciliation
//!    pass decides which record wins:
//!   1. On login the server's record wins over the local one, which wins over the default. The guest record
//!      is discarded.
//!   2. On logout the guest record (or the default) comes back, unless a logout is still being carried out.
//!   3. Otherwise the durable record is diff-applied.
//!
//! Sounds simple, but the passes race with each other, with local changes and with the network, and this
//! library handles that.

pub mod config;
pub mod data_model;
pub mod error;
pub mod fetcher;
pub mod guard;
pub mod host;
pub mod identity;
pub mod persister;
pub mod reconciler;
pub mod signal;
pub mod sync;

#[cfg(feature = "http")]
pub mod http;

#[cfg(test)]
mod testing;

pub use config::{StorageKeys, SyncConfig};
pub use data_model::{ConfigPatch, ConfigRecord, Identity, ListenerKey, Theme};
pub use error::{RemoteError, StoreError};
pub use fetcher::{ConfigApi, RemoteConfigFetcher, WriteOutcome};
pub use guard::{GuardOutcome, OperationGuard, Scope, ScopeToken, delete_op, mark_read_op};
pub use host::{Clock, Host, KeyValueStore, MemoryStore, Spawn, SystemClock, Timer};
pub use reconciler::ReconcileOutcome;
pub use signal::{Signal, SignalKind, SignalSource, SubscriptionKey};
pub use sync::{PreferenceSync, SetOptions};
