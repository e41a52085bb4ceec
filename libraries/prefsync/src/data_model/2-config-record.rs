//! # ConfigRecord
//! The durable preference payload. The same JSON shape is stored under the durable keys and exchanged with
//! the remote endpoint, so field names are camelCase.
//!
//! A record may carry the id of the identity it belongs to (`ownerId`). A record read back for identity `X`
//! is only trusted if it has no owner or is owned by `X`. This keeps a stale record from a previous user on a
//! shared device from leaking into the next session.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: u32 = 0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("theme must be 0 (light) or 1 (dark), got {0}")]
pub struct InvalidTheme(pub u8);

impl From<Theme> for u8 {
    fn from(theme: Theme) -> Self {
        match theme {
            Theme::Light => 0,
            Theme::Dark => 1,
        }
    }
}

impl TryFrom<u8> for Theme {
    type Error = InvalidTheme;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Theme::Light),
            1 => Ok(Theme::Dark),
            other => Err(InvalidTheme(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub theme: Theme,
    pub language: u32,
    pub receive_email: bool,
    pub receive_notify: bool,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            owner_id: None,
            theme: Theme::Light,
            language: DEFAULT_LANGUAGE,
            receive_email: true,
            receive_notify: true,
        }
    }
}

impl ConfigRecord {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn owned_by(self, owner_id: Option<String>) -> Self {
        Self { owner_id, ..self }
    }

    /// True if this record may be used for `user_id`.
    pub fn trusted_for(&self, user_id: &str) -> bool {
        self.owner_id.as_deref().is_none_or(|owner| owner == user_id)
    }

    /// Compares the user-visible preferences, ignoring the owner tag.
    pub fn same_preferences(&self, other: &ConfigRecord) -> bool {
        self.theme == other.theme
            && self.language == other.language
            && self.receive_email == other.receive_email
            && self.receive_notify == other.receive_notify
    }

    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(receive_email) = patch.receive_email {
            self.receive_email = receive_email;
        }
        if let Some(receive_notify) = patch.receive_notify {
            self.receive_notify = receive_notify;
        }
    }
}

/// A partial update, as produced by a single settings toggle in the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    pub theme: Option<Theme>,
    pub language: Option<u32>,
    pub receive_email: Option<bool>,
    pub receive_notify: Option<bool>,
}

impl ConfigPatch {
    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.language.is_none()
            && self.receive_email.is_none()
            && self.receive_notify.is_none()
    }
}
