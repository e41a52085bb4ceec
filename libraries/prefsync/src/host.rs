//! # Host
//! Everything the core needs from its environment: durable and session key-value stores, a wall clock,
//! a timer and a way to spawn local tasks. In the browser these are localStorage, sessionStorage,
//! `setTimeout` and `spawn_local`. Natively (and in tests) they are [`MemoryStore`], [`SystemClock`] and a
//! `futures` [`LocalSpawner`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use crate::error::StoreError;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str);
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub trait Timer {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// Fire-and-forget execution of a task on the current thread.
pub trait Spawn {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

/// The environment a [`crate::PreferenceSync`] runs in.
#[derive(Clone)]
pub struct Host {
    pub durable: Rc<dyn KeyValueStore>,
    pub session: Rc<dyn KeyValueStore>,
    pub clock: Rc<dyn Clock>,
    pub timer: Rc<dyn Timer>,
    pub spawner: Rc<dyn Spawn>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Spawn for LocalSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = LocalSpawnExt::spawn_local(self, task) {
            log::error!("Failed to spawn local task: {e:?}");
        }
    }
}

/// In-memory store. Clones share the same entries, which is how tests model two tabs looking at the same
/// localStorage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}
