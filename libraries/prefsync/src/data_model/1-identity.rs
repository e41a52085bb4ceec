//! # Identity
//! The principal whose configuration namespace is authoritative right now: either a guest or a specific
//! authenticated user. An identity is never persisted. It is recomputed from the session store every time
//! a reconciliation pass runs, so a login or logout in another tab is picked up on the next tick.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Guest,
    Authenticated(String),
}

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Guest => None,
            Identity::Authenticated(id) => Some(id),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Guest => write!(f, "guest"),
            Identity::Authenticated(id) => write!(f, "user {id}"),
        }
    }
}
