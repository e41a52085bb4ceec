//! # SignalBus
//! One logical pub/sub channel fed by two physical ones: in-page publishes (several mounted consumers in the
//! same tab) and the host's cross-tab storage notifications (another tab committed a durable key).
//!
//! Login typically fires three or four related signals at once. The [`Debouncer`] turns such a burst into a
//! single reconciliation pass on the leading edge, plus at most one trailing pass once the window closes so
//! the last committed value is never missed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::StorageKeys;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    IdentityChanged,
    ConfigChanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalSource {
    InPage,
    CrossTab,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub source: SignalSource,
}

slotmap::new_key_type! {
    /// Handle of a [`SignalBus`] subscription. Distinct from config-listener keys, which index another map.
    pub struct SubscriptionKey;
}

struct Subscriber {
    kind: SignalKind,
    handler: Rc<dyn Fn(Signal)>,
}

#[derive(Default)]
pub struct SignalBus {
    subscribers: RefCell<slotmap::SlotMap<SubscriptionKey, Subscriber>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SignalKind, handler: impl Fn(Signal) + 'static) -> SubscriptionKey {
        self.subscribers.borrow_mut().insert(Subscriber {
            kind,
            handler: Rc::new(handler),
        })
    }

    pub fn unsubscribe(&self, key: SubscriptionKey) {
        self.subscribers.borrow_mut().remove(key);
    }

    pub fn publish(&self, kind: SignalKind) {
        self.dispatch(Signal {
            kind,
            source: SignalSource::InPage,
        });
    }

    /// Relays a host storage-change notification. Returns the signal kind it mapped to, if any.
    pub fn relay_storage_event(&self, keys: &StorageKeys, key: Option<&str>) -> Option<SignalKind> {
        let kind = classify_storage_key(keys, key)?;
        self.dispatch(Signal {
            kind,
            source: SignalSource::CrossTab,
        });
        Some(kind)
    }

    fn dispatch(&self, signal: Signal) {
        // Collect first: handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Rc<dyn Fn(Signal)>> = self
            .subscribers
            .borrow()
            .values()
            .filter(|s| s.kind == signal.kind)
            .map(|s| Rc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(signal);
        }
    }
}

/// A `None` key means the whole store was cleared, which can only be treated as an identity change.
pub fn classify_storage_key(keys: &StorageKeys, key: Option<&str>) -> Option<SignalKind> {
    match key {
        None => Some(SignalKind::IdentityChanged),
        Some(key) if key == keys.session || key == keys.logout_flag => {
            Some(SignalKind::IdentityChanged)
        }
        Some(key) if keys.is_config_key(key) => Some(SignalKind::ConfigChanged),
        Some(_) => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Debounced {
    /// Leading edge: run a pass now.
    Fire,
    /// Inside the window. `schedule_trailing` is true for the first such signal only.
    Coalesced { schedule_trailing: bool },
}

pub struct Debouncer {
    window: TimeDelta,
    last_fired: Cell<Option<DateTime<Utc>>>,
    trailing_pending: Cell<bool>,
}

impl Debouncer {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            last_fired: Cell::new(None),
            trailing_pending: Cell::new(false),
        }
    }

    pub fn offer(&self, now: DateTime<Utc>) -> Debounced {
        match self.last_fired.get() {
            Some(fired) if now - fired < self.window => Debounced::Coalesced {
                schedule_trailing: !self.trailing_pending.replace(true),
            },
            _ => {
                self.last_fired.set(Some(now));
                Debounced::Fire
            }
        }
    }

    /// Called when the window closes. Returns true if coalesced signals are waiting for a pass.
    pub fn take_trailing(&self, now: DateTime<Utc>) -> bool {
        if self.trailing_pending.replace(false) {
            self.last_fired.set(Some(now));
            true
        } else {
            false
        }
    }
}
