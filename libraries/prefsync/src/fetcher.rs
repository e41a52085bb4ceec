//! # RemoteConfigFetcher
//! Wraps the remote read/write endpoints.
//!
//! Reads go through a single-slot TTL cache and are deduplicated per owner: any number of callers asking
//! for the same owner while a read is outstanding share that one read. The in-flight entry is removed the
//! moment the read settles, whatever the outcome.
//!
//! Writes are coalesced per owner: while one write is outstanding, newer records queue up behind it and
//! only the newest is sent once the outstanding write settles. While a write is pending, reads for that
//! owner answer with the record being written.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use chrono::TimeDelta;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::data_model::{CacheEntry, ConfigRecord};
use crate::error::RemoteError;
use crate::host::Clock;

/// The remote configuration endpoints. Both calls are idempotent; `write` is a full replace.
#[allow(async_fn_in_trait)]
pub trait ConfigApi: 'static {
    async fn read(&self, owner_id: &str) -> Result<ConfigRecord, RemoteError>;
    async fn write(&self, owner_id: &str, record: &ConfigRecord) -> Result<(), RemoteError>;
}

type PendingRead = Shared<LocalBoxFuture<'static, Option<ConfigRecord>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Another write for the same owner was in flight; this record will be sent after it.
    Queued,
    Failed,
}

struct WriteSlot {
    /// Newest record handed to `write` for this owner, sent or not.
    latest: ConfigRecord,
    queued: Option<ConfigRecord>,
}

pub struct RemoteConfigFetcher<A> {
    inner: Rc<FetcherInner<A>>,
}

impl<A> Clone for RemoteConfigFetcher<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct FetcherInner<A> {
    api: A,
    clock: Rc<dyn Clock>,
    ttl: TimeDelta,
    cache: RefCell<Option<CacheEntry>>,
    in_flight: RefCell<HashMap<String, PendingRead>>,
    writes: RefCell<HashMap<String, WriteSlot>>,
    /// Bumped whenever the cache slot is replaced or a write starts. A read that overlaps either must
    /// not populate the cache.
    cache_generation: Cell<u64>,
}

impl<A: ConfigApi> RemoteConfigFetcher<A> {
    pub fn new(api: A, clock: Rc<dyn Clock>, ttl: TimeDelta) -> Self {
        Self {
            inner: Rc::new(FetcherInner {
                api,
                clock,
                ttl,
                cache: RefCell::new(None),
                in_flight: RefCell::new(HashMap::new()),
                writes: RefCell::new(HashMap::new()),
                cache_generation: Cell::new(0),
            }),
        }
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Never fails: any error is logged and reported as `None`, leaving the cache untouched.
    pub async fn get(&self, owner_id: &str) -> Option<ConfigRecord> {
        if let Some(hit) = self.cached(owner_id) {
            log::debug!("Config cache hit for {owner_id}");
            return Some(hit);
        }
        if let Some(pending) = self.pending_write(owner_id) {
            return Some(pending);
        }

        let pending = {
            let mut in_flight = self.inner.in_flight.borrow_mut();
            match in_flight.get(owner_id) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = Rc::clone(&self.inner)
                        .read_remote(owner_id.to_string())
                        .boxed_local()
                        .shared();
                    in_flight.insert(owner_id.to_string(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// The cached record for `owner_id`, if one exists and is younger than the TTL.
    pub fn cached(&self, owner_id: &str) -> Option<ConfigRecord> {
        let now = self.inner.clock.now();
        self.inner
            .cache
            .borrow()
            .as_ref()
            .filter(|entry| entry.is_fresh_for(owner_id, now, self.inner.ttl))
            .map(|entry| entry.data.clone())
    }

    /// Replaces the cache slot with a record known to be current for `owner_id`.
    pub fn prime(&self, owner_id: &str, record: ConfigRecord) {
        self.inner.prime(owner_id, record);
    }

    pub fn invalidate(&self) {
        self.inner.bump_generation();
        self.inner.cache.borrow_mut().take();
    }

    pub fn reads_in_flight(&self) -> usize {
        self.inner.in_flight.borrow().len()
    }

    fn pending_write(&self, owner_id: &str) -> Option<ConfigRecord> {
        self.inner
            .writes
            .borrow()
            .get(owner_id)
            .map(|slot| slot.latest.clone())
    }

    pub async fn write(&self, owner_id: &str, record: ConfigRecord) -> WriteOutcome {
        let record = record.owned_by(Some(owner_id.to_string()));
        {
            let mut writes = self.inner.writes.borrow_mut();
            if let Some(slot) = writes.get_mut(owner_id) {
                slot.latest = record.clone();
                slot.queued = Some(record);
                return WriteOutcome::Queued;
            }
            writes.insert(
                owner_id.to_string(),
                WriteSlot {
                    latest: record.clone(),
                    queued: None,
                },
            );
        }

        let mut outcome = WriteOutcome::Written;
        let mut next = Some(record);
        while let Some(record) = next.take() {
            self.inner.bump_generation();
            outcome = match self.inner.api.write(owner_id, &record).await {
                Ok(()) => {
                    self.inner.prime(owner_id, record);
                    WriteOutcome::Written
                }
                Err(e) => {
                    log::error!("Remote config write for {owner_id} failed: {e}");
                    WriteOutcome::Failed
                }
            };

            let mut writes = self.inner.writes.borrow_mut();
            next = writes
                .get_mut(owner_id)
                .and_then(|slot| slot.queued.take());
            if next.is_none() {
                writes.remove(owner_id);
            }
        }
        outcome
    }
}

impl<A: ConfigApi> FetcherInner<A> {
    async fn read_remote(self: Rc<Self>, owner_id: String) -> Option<ConfigRecord> {
        let generation = self.cache_generation.get();
        let result = self.api.read(&owner_id).await;
        self.in_flight.borrow_mut().remove(&owner_id);

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Remote config read for {owner_id} failed, keeping local state: {e}");
                return None;
            }
        };
        if !record.trusted_for(&owner_id) {
            log::warn!(
                "Remote returned a config owned by {:?} for {owner_id}; ignoring it",
                record.owner_id
            );
            return None;
        }
        let record = record.owned_by(Some(owner_id.clone()));
        if generation == self.cache_generation.get() && !self.writes.borrow().contains_key(&owner_id)
        {
            self.prime(&owner_id, record.clone());
        }
        Some(record)
    }

    fn bump_generation(&self) {
        self.cache_generation.set(self.cache_generation.get() + 1);
    }

    fn prime(&self, owner_id: &str, record: ConfigRecord) {
        self.bump_generation();
        *self.cache.borrow_mut() = Some(CacheEntry {
            owner_id: owner_id.to_string(),
            data: record.owned_by(Some(owner_id.to_string())),
            fetched_at: self.clock.now(),
        });
    }
}
