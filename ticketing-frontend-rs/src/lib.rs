//! Browser bindings for `prefsync`: storage, timers and event listeners come from the page, the remote
//! endpoints are reached over HTTP.

mod endpoints;
mod error;
mod utils;

#[cfg(target_arch = "wasm32")]
mod preferences;
#[cfg(target_arch = "wasm32")]
mod web;

pub use endpoints::{DEFAULT_API_BASE_URL, api_base_url};
pub use error::BindingError;
#[cfg(target_arch = "wasm32")]
pub use preferences::{MountScope, Preferences};

use prefsync::{ReconcileOutcome, SignalKind};

/// Window event carrying in-page signals between consumers that each hold their own handle.
pub const SIGNAL_EVENT: &str = "prefsync:signal";

pub fn outcome_label(outcome: ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Applied => "applied",
        ReconcileOutcome::Unchanged => "unchanged",
        ReconcileOutcome::IdentityRace => "identityRace",
        ReconcileOutcome::Superseded => "superseded",
        ReconcileOutcome::LogoutInProgress => "logoutInProgress",
    }
}

pub fn parse_signal_kind(kind: &str) -> Result<SignalKind, BindingError> {
    match kind {
        "identityChanged" => Ok(SignalKind::IdentityChanged),
        "configChanged" => Ok(SignalKind::ConfigChanged),
        other => Err(BindingError::UnknownSignal(other.to_string())),
    }
}
