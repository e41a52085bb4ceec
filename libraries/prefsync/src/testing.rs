//! Test doubles for the host and the remote endpoints.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use crate::data_model::ConfigRecord;
use crate::error::{RemoteError, StoreError};
use crate::fetcher::ConfigApi;
use crate::host::{Clock, KeyValueStore, MemoryStore, Timer};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

#[derive(Default)]
struct FakeApiState {
    records: RefCell<HashMap<String, ConfigRecord>>,
    reads: Cell<usize>,
    written: RefCell<Vec<(String, ConfigRecord)>>,
    hold_reads: Cell<bool>,
    held_reads_for: RefCell<Option<String>>,
    hold_writes: Cell<bool>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    waiting: RefCell<Vec<oneshot::Sender<()>>>,
}

/// Remote endpoint double. Counts calls, and can hold calls open until [`FakeApi::release`].
#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    state: Rc<FakeApiState>,
}

impl FakeApi {
    pub fn insert(&self, owner_id: &str, record: ConfigRecord) {
        self.state
            .records
            .borrow_mut()
            .insert(owner_id.to_string(), record);
    }

    pub fn reads(&self) -> usize {
        self.state.reads.get()
    }

    pub fn written(&self) -> Vec<(String, ConfigRecord)> {
        self.state.written.borrow().clone()
    }

    pub fn hold_reads(&self) {
        self.state.hold_reads.set(true);
    }

    /// Holds only reads for `owner_id`; others resolve immediately.
    pub fn hold_reads_for(&self, owner_id: &str) {
        *self.state.held_reads_for.borrow_mut() = Some(owner_id.to_string());
    }

    pub fn hold_writes(&self) {
        self.state.hold_writes.set(true);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.set(fail);
    }

    /// Lets every call currently held open continue. Holding stays enabled for later calls.
    pub fn release(&self) {
        for waiter in self.state.waiting.borrow_mut().drain(..) {
            let _ = waiter.send(());
        }
    }

    async fn wait(&self) {
        let (tx, rx) = oneshot::channel();
        self.state.waiting.borrow_mut().push(tx);
        let _ = rx.await;
    }
}

impl ConfigApi for FakeApi {
    async fn read(&self, owner_id: &str) -> Result<ConfigRecord, RemoteError> {
        self.state.reads.set(self.state.reads.get() + 1);
        let held = self.state.hold_reads.get()
            || self.state.held_reads_for.borrow().as_deref() == Some(owner_id);
        if held {
            self.wait().await;
        }
        if self.state.fail_reads.get() {
            return Err(RemoteError::Unavailable("offline".to_string()));
        }
        self.state
            .records
            .borrow()
            .get(owner_id)
            .cloned()
            .ok_or(RemoteError::Status(404))
    }

    async fn write(&self, owner_id: &str, record: &ConfigRecord) -> Result<(), RemoteError> {
        self.state
            .written
            .borrow_mut()
            .push((owner_id.to_string(), record.clone()));
        if self.state.hold_writes.get() {
            self.wait().await;
        }
        if self.state.fail_writes.get() {
            return Err(RemoteError::Status(503));
        }
        self.insert(owner_id, record.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Rc::new(Cell::new(t0())),
        }
    }
}

impl ManualClock {
    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + TimeDelta::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Timer whose sleeps only complete on [`ManualTimer::fire`].
#[derive(Clone, Default)]
pub(crate) struct ManualTimer {
    sleepers: Rc<RefCell<Vec<oneshot::Sender<()>>>>,
}

impl ManualTimer {
    pub fn pending(&self) -> usize {
        self.sleepers.borrow().len()
    }

    pub fn fire(&self) {
        for sleeper in self.sleepers.borrow_mut().drain(..) {
            let _ = sleeper.send(());
        }
    }
}

impl Timer for ManualTimer {
    fn sleep(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        self.sleepers.borrow_mut().push(tx);
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}

/// Memory store that counts successful writes.
#[derive(Clone, Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    sets: Rc<Cell<usize>>,
}

impl CountingStore {
    pub fn sets(&self) -> usize {
        self.sets.get()
    }
}

impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.sets.set(self.sets.get() + 1);
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) {
        self.inner.remove(key);
    }
}
