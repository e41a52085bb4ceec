use std::rc::Rc;

use crate::data_model::Identity;
use crate::host::KeyValueStore;

/// Derives the current principal from the ambient session store.
pub struct IdentityResolver {
    session: Rc<dyn KeyValueStore>,
    session_key: String,
}

impl IdentityResolver {
    pub fn new(session: Rc<dyn KeyValueStore>, session_key: impl Into<String>) -> Self {
        Self {
            session,
            session_key: session_key.into(),
        }
    }

    pub fn resolve(&self) -> Identity {
        let Some(raw) = self.session.get(&self.session_key) else {
            return Identity::Guest;
        };
        match parse_session_id(&raw) {
            Some(id) => Identity::Authenticated(id),
            None => Identity::Guest,
        }
    }
}

/// The session record is `{ "id": ... }`, where the id may be a string or a number.
fn parse_session_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .inspect_err(|e| log::warn!("Ignoring unreadable session record: {e}"))
        .ok()?;
    match value.get("id")? {
        serde_json::Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
