//! # Reconciler
//! Decides which of {guest record, local durable record, remote record, compiled-in default} becomes the
//! live configuration, and is the only writer of the applied value, the durable records and the cache.
//!
//! | from              | to                | action                                                   |
//! |-------------------|-------------------|----------------------------------------------------------|
//! | Guest             | Authenticated(id) | remote, else local tagged `id`, else default; drop guest |
//! | Authenticated(id) | Guest             | guest record, else default; purge user record            |
//! | Authenticated(id) | Guest (logging out) | nothing                                                |
//! | same identity     | same identity     | diff-apply                                               |
//!
//! Passes only suspend while fetching. Each pass takes a ticket when it starts; when it resumes it checks
//! that the identity it fetched for is still current and that nothing newer has been applied in the
//! meantime. Late results failing either check are discarded.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::TimeDelta;

use crate::data_model::{ConfigPatch, ConfigRecord, Identity, ListenerKey};
use crate::fetcher::{ConfigApi, RemoteConfigFetcher};
use crate::host::Clock;
use crate::identity::IdentityResolver;
use crate::persister::DurablePersister;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The live configuration changed.
    Applied,
    Unchanged,
    /// The pass finished for an identity that is no longer current.
    IdentityRace,
    /// Something newer was applied while the pass was fetching.
    Superseded,
    /// The identity read as guest while a logout was still running; nothing was reset.
    LogoutInProgress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassMode {
    /// Explicit reconciliation: for an unchanged identity, consult the remote (through the cache).
    Explicit,
    /// Triggered by a signal: for an unchanged identity, only diff-apply the durable record.
    Signal,
}

pub struct Reconciler<A> {
    identity: IdentityResolver,
    persister: DurablePersister,
    fetcher: RemoteConfigFetcher<A>,
    clock: Rc<dyn Clock>,
    logout_timeout: TimeDelta,

    state: RefCell<Identity>,
    applied: RefCell<ConfigRecord>,
    next_ticket: Cell<u64>,
    /// Ticket of the newest pass or local mutation that committed a decision.
    committed_ticket: Cell<u64>,

    listeners: RefCell<slotmap::SlotMap<slotmap::DefaultKey, Rc<dyn Fn(&ConfigRecord)>>>,
    dirty: Cell<bool>,
}

impl<A: ConfigApi> Reconciler<A> {
    pub fn new(
        identity: IdentityResolver,
        persister: DurablePersister,
        fetcher: RemoteConfigFetcher<A>,
        clock: Rc<dyn Clock>,
        logout_timeout: TimeDelta,
    ) -> Self {
        // Start from whatever is durable for the session's identity so a reload shows the right values
        // before the first pass completes.
        let (state, applied) = match identity.resolve() {
            Identity::Authenticated(id) => {
                let record = persister
                    .load_user(&id)
                    .unwrap_or_default()
                    .owned_by(Some(id.clone()));
                (Identity::Authenticated(id), record)
            }
            Identity::Guest => {
                let record = persister.load_guest().unwrap_or_default().owned_by(None);
                (Identity::Guest, record)
            }
        };
        Self {
            identity,
            persister,
            fetcher,
            clock,
            logout_timeout,
            state: RefCell::new(state),
            applied: RefCell::new(applied),
            next_ticket: Cell::new(0),
            committed_ticket: Cell::new(0),
            listeners: RefCell::new(slotmap::SlotMap::new()),
            dirty: Cell::new(false),
        }
    }

    pub fn current(&self) -> ConfigRecord {
        self.applied.borrow().clone()
    }

    /// The identity whose namespace the applied configuration belongs to.
    pub fn state(&self) -> Identity {
        self.state.borrow().clone()
    }

    pub fn persister(&self) -> &DurablePersister {
        &self.persister
    }

    pub fn fetcher(&self) -> &RemoteConfigFetcher<A> {
        &self.fetcher
    }

    pub async fn reconcile(&self, mode: PassMode) -> ReconcileOutcome {
        let ticket = self.take_ticket();
        let target = self.identity.resolve();
        let current = self.state();
        log::debug!("Reconciling {current} -> {target} ({mode:?}, ticket {ticket})");

        match (current, target) {
            (Identity::Guest, Identity::Guest) => self.refresh_guest(ticket),
            (Identity::Authenticated(from), Identity::Guest) => self.logout(&from, ticket),
            (Identity::Authenticated(from), Identity::Authenticated(to)) if from == to => {
                self.refresh_user(to, mode, ticket).await
            }
            (_, Identity::Authenticated(to)) => self.login(to, ticket).await,
        }
    }

    /// Optimistically applies a local mutation. Returns the owner and record to send to the remote when the
    /// current namespace is an authenticated user.
    pub fn set_local(&self, patch: &ConfigPatch) -> Option<(String, ConfigRecord)> {
        let ticket = self.take_ticket();
        let owner = self.state.borrow().user_id().map(str::to_string);
        let mut record = self.current().owned_by(owner.clone());
        record.apply_patch(patch);

        match &owner {
            Some(id) => {
                self.persister.save_user(&record);
                self.fetcher.prime(id, record.clone());
            }
            None => {
                self.persister.save_guest(&record);
            }
        }
        self.commit(record.clone(), ticket);
        owner.map(|id| (id, record))
    }

    async fn login(&self, id: String, ticket: u64) -> ReconcileOutcome {
        let target = Identity::Authenticated(id.clone());
        let remote = self.fetcher.get(&id).await;
        if let Some(discarded) = self.check_still_current(&target, ticket) {
            return discarded;
        }

        let (winner, source) = match remote {
            Some(remote) => (remote, "remote"),
            None => match self.persister.load_user(&id) {
                Some(local) => (local, "local"),
                None => (ConfigRecord::default(), "default"),
            },
        };
        log::info!("Logged in as {id}; applying {source} configuration");

        let winner = winner.owned_by(Some(id.clone()));
        if source == "remote" {
            self.persister.clear_unsynced();
        }
        self.persister.remove_guest();
        self.persister.save_user(&winner);
        *self.state.borrow_mut() = target;
        self.commit(winner, ticket)
    }

    fn logout(&self, from: &str, ticket: u64) -> ReconcileOutcome {
        if self
            .persister
            .logout_in_progress(self.clock.now(), self.logout_timeout)
        {
            log::info!("Logout of {from} in progress; leaving visible configuration in place");
            return ReconcileOutcome::LogoutInProgress;
        }

        let record = self
            .persister
            .load_guest()
            .unwrap_or_default()
            .owned_by(None);
        self.persister.remove_user();
        self.fetcher.invalidate();
        *self.state.borrow_mut() = Identity::Guest;
        log::info!("Logged out {from}; applying guest configuration");
        self.commit(record, ticket)
    }

    fn refresh_guest(&self, ticket: u64) -> ReconcileOutcome {
        let record = self
            .persister
            .load_guest()
            .unwrap_or_default()
            .owned_by(None);
        self.commit(record, ticket)
    }

    async fn refresh_user(&self, id: String, mode: PassMode, ticket: u64) -> ReconcileOutcome {
        let candidate = match mode {
            // The durable record holds a change the remote never confirmed; it stays the newest value.
            PassMode::Explicit if self.persister.is_unsynced(&id) => {
                log::info!("Keeping unsynced local configuration of {id} over the remote one");
                self.persister.load_user(&id)
            }
            PassMode::Explicit => {
                let target = Identity::Authenticated(id.clone());
                let remote = self.fetcher.get(&id).await;
                if let Some(discarded) = self.check_still_current(&target, ticket) {
                    return discarded;
                }
                remote.or_else(|| self.persister.load_user(&id))
            }
            PassMode::Signal => self.persister.load_user(&id),
        };
        let Some(candidate) = candidate else {
            // Nothing better known: keep what is applied. Nothing was committed, so the ticket stays.
            return ReconcileOutcome::Unchanged;
        };

        let candidate = candidate.owned_by(Some(id));
        self.persister.save_user(&candidate);
        self.commit(candidate, ticket)
    }

    fn check_still_current(&self, target: &Identity, ticket: u64) -> Option<ReconcileOutcome> {
        let now_current = self.identity.resolve();
        if &now_current != target {
            log::debug!("Discarding reconciliation for {target}: {now_current} is current now");
            return Some(ReconcileOutcome::IdentityRace);
        }
        if self.committed_ticket.get() > ticket {
            log::debug!("Discarding reconciliation ticket {ticket}: superseded");
            return Some(ReconcileOutcome::Superseded);
        }
        None
    }

    fn take_ticket(&self) -> u64 {
        let ticket = self.next_ticket.get() + 1;
        self.next_ticket.set(ticket);
        ticket
    }

    /// Makes `record` the applied value. Listeners are only notified if a visible preference changed.
    fn commit(&self, record: ConfigRecord, ticket: u64) -> ReconcileOutcome {
        self.committed_ticket.set(self.committed_ticket.get().max(ticket));
        let mut applied = self.applied.borrow_mut();
        let changed = !applied.same_preferences(&record);
        *applied = record;
        if changed {
            self.dirty.set(true);
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::Unchanged
        }
    }

    pub fn register_listener(&self, listener: impl Fn(&ConfigRecord) + 'static) -> ListenerKey {
        ListenerKey(self.listeners.borrow_mut().insert(Rc::new(listener)))
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.listeners.borrow_mut().remove(key.0);
    }

    /// Takes the pending change notification, if any, as closures to call once no borrow is held.
    pub fn drain_due_notifications(&self) -> Vec<Box<dyn FnOnce()>> {
        if !self.dirty.replace(false) {
            return Vec::new();
        }
        let record = self.current();
        self.listeners
            .borrow()
            .values()
            .map(|listener| {
                let listener = Rc::clone(listener);
                let record = record.clone();
                Box::new(move || listener(&record)) as Box<dyn FnOnce()>
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::*;
    use crate::config::StorageKeys;
    use crate::data_model::Theme;
    use crate::host::{KeyValueStore, MemoryStore};
    use crate::testing::{CountingStore, FakeApi, ManualClock};

    struct Fixture {
        reconciler: Rc<Reconciler<FakeApi>>,
        api: FakeApi,
        durable: CountingStore,
        session: MemoryStore,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        fixture_with(CountingStore::default())
    }

    fn fixture_with(durable: CountingStore) -> Fixture {
        fixture_from(durable, MemoryStore::new())
    }

    fn fixture_from(durable: CountingStore, session: MemoryStore) -> Fixture {
        let api = FakeApi::default();
        let clock = ManualClock::default();
        let fetcher =
            RemoteConfigFetcher::new(api.clone(), Rc::new(clock.clone()), TimeDelta::seconds(60));
        let reconciler = Reconciler::new(
            IdentityResolver::new(Rc::new(session.clone()), "user"),
            DurablePersister::new(Rc::new(durable.clone()), StorageKeys::default()),
            fetcher,
            Rc::new(clock.clone()),
            TimeDelta::seconds(30),
        );
        Fixture {
            reconciler: Rc::new(reconciler),
            api,
            durable,
            session,
            clock,
        }
    }

    fn login(session: &MemoryStore, id: &str) {
        session.set("user", &format!(r#"{{"id":"{id}"}}"#)).unwrap();
    }

    fn record(theme: Theme, language: u32) -> ConfigRecord {
        ConfigRecord {
            theme,
            language,
            ..Default::default()
        }
    }

    fn store_json(store: &impl KeyValueStore, key: &str, record: &ConfigRecord) {
        store.set(key, &record.to_json_string().unwrap()).unwrap();
    }

    #[test]
    fn test_login_prefers_remote_over_local_over_guest() {
        let f = fixture();
        let remote = record(Theme::Dark, 1);
        let local = record(Theme::Light, 2).owned_by(Some("u1".to_string()));
        let guest = record(Theme::Dark, 3);
        f.api.insert("u1", remote.clone());
        store_json(&f.durable, "user_config", &local);
        store_json(&f.durable, "guest_userconfig", &guest);

        login(&f.session, "u1");
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Explicit)),
            ReconcileOutcome::Applied
        );
        assert_eq!(
            f.reconciler.current(),
            remote.clone().owned_by(Some("u1".to_string()))
        );
        assert_eq!(f.reconciler.state(), Identity::Authenticated("u1".to_string()));
        assert_eq!(f.durable.get("guest_userconfig"), None);
        assert_eq!(
            f.reconciler.persister().load_user("u1").map(|r| r.language),
            Some(1)
        );
    }

    #[test]
    fn test_login_falls_back_to_local_then_default() {
        let f = fixture();
        f.api.fail_reads(true);
        let local = record(Theme::Dark, 2).owned_by(Some("u1".to_string()));
        store_json(&f.durable, "user_config", &local);

        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));
        assert_eq!(f.reconciler.current(), local);

        let g = fixture();
        g.api.fail_reads(true);
        store_json(&g.durable, "guest_userconfig", &record(Theme::Dark, 5));
        login(&g.session, "u2");
        block_on(g.reconciler.reconcile(PassMode::Explicit));
        assert!(g.reconciler.current().same_preferences(&ConfigRecord::default()));
    }

    #[test]
    fn test_local_record_of_other_user_is_not_used() {
        let f = fixture();
        f.api.fail_reads(true);
        store_json(
            &f.durable,
            "user_config",
            &record(Theme::Dark, 9).owned_by(Some("someone-else".to_string())),
        );
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));
        assert_eq!(f.reconciler.current().language, ConfigRecord::default().language);
        assert_eq!(
            f.reconciler.persister().load_user("u1").map(|r| r.owner_id),
            Some(Some("u1".to_string()))
        );
    }

    #[test]
    fn test_second_identical_pass_is_a_no_op() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Dark, 1));
        login(&f.session, "u1");

        block_on(f.reconciler.reconcile(PassMode::Explicit));
        let first = f.reconciler.current();
        let writes = f.durable.sets();

        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Explicit)),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(f.reconciler.current(), first);
        assert_eq!(f.durable.sets(), writes);
        assert_eq!(f.api.reads(), 1);
    }

    #[test]
    fn test_stale_fetch_for_previous_identity_is_discarded() {
        let f = fixture();
        f.api.insert("a", record(Theme::Dark, 1));
        f.api.insert("b", record(Theme::Light, 2));
        f.api.hold_reads_for("a");

        let mut pool = LocalPool::new();
        let outcome_a = Rc::new(Cell::new(None));
        login(&f.session, "a");
        {
            let reconciler = Rc::clone(&f.reconciler);
            let outcome_a = Rc::clone(&outcome_a);
            pool.spawner()
                .spawn_local(async move {
                    outcome_a.set(Some(reconciler.reconcile(PassMode::Explicit).await));
                })
                .unwrap();
        }
        pool.run_until_stalled();

        login(&f.session, "b");
        assert_eq!(
            pool.run_until(f.reconciler.reconcile(PassMode::Explicit)),
            ReconcileOutcome::Applied
        );

        f.api.release();
        pool.run_until_stalled();
        assert_eq!(outcome_a.get(), Some(ReconcileOutcome::IdentityRace));
        assert_eq!(f.reconciler.current().language, 2);
        assert_eq!(f.reconciler.state(), Identity::Authenticated("b".to_string()));
    }

    #[test]
    fn test_local_mutation_supersedes_in_flight_refresh() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Light, 1));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));

        // Expire the cache so the next explicit pass goes to the network and can be held.
        f.clock.advance_ms(60_000);
        f.api.hold_reads();
        let mut pool = LocalPool::new();
        let outcome = Rc::new(Cell::new(None));
        {
            let reconciler = Rc::clone(&f.reconciler);
            let outcome = Rc::clone(&outcome);
            pool.spawner()
                .spawn_local(async move {
                    outcome.set(Some(reconciler.reconcile(PassMode::Explicit).await));
                })
                .unwrap();
        }
        pool.run_until_stalled();

        f.reconciler.set_local(&ConfigPatch::theme(Theme::Dark));
        f.api.release();
        pool.run_until_stalled();

        assert_eq!(outcome.get(), Some(ReconcileOutcome::Superseded));
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
    }

    #[test]
    fn test_logout_restores_guest_record_and_purges_user() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Light, 4));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));
        store_json(&f.durable, "guest_userconfig", &record(Theme::Dark, 0));

        f.session.remove("user");
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::Applied
        );
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
        assert_eq!(f.reconciler.current().owner_id, None);
        assert_eq!(f.durable.get("user_config"), None);
        assert!(f.reconciler.fetcher().cached("u1").is_none());
    }

    #[test]
    fn test_logout_flag_suppresses_reset_until_it_expires() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Dark, 4));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));

        f.reconciler.persister().begin_logout(f.clock.now());
        f.session.remove("user");
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::LogoutInProgress
        );
        assert_eq!(f.reconciler.current().theme, Theme::Dark);

        f.clock.advance_ms(30_000);
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::Applied
        );
        assert_eq!(f.reconciler.current().theme, Theme::Light);
    }

    #[test]
    fn test_signal_pass_diff_applies_durable_record() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Light, 1));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));

        // Another tab committed a new theme.
        store_json(
            &f.durable,
            "user_config",
            &record(Theme::Dark, 1).owned_by(Some("u1".to_string())),
        );
        let reads = f.api.reads();
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::Applied
        );
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(f.api.reads(), reads);
    }

    #[test]
    fn test_guest_mutation_is_stored_as_guest_record() {
        let f = fixture();
        assert_eq!(f.reconciler.set_local(&ConfigPatch::theme(Theme::Dark)), None);
        let stored = f.reconciler.persister().load_guest().unwrap();
        assert_eq!(stored.theme, Theme::Dark);
        assert_eq!(stored.owner_id, None);
    }

    #[test]
    fn test_user_mutation_returns_remote_write() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Light, 1));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));

        let (owner, written) = f
            .reconciler
            .set_local(&ConfigPatch::theme(Theme::Dark))
            .unwrap();
        assert_eq!(owner, "u1");
        assert_eq!(written.theme, Theme::Dark);
        assert_eq!(written.owner_id.as_deref(), Some("u1"));
        assert_eq!(f.reconciler.fetcher().cached("u1"), Some(written));
    }

    #[test]
    fn test_listeners_notified_only_on_visible_change() {
        let f = fixture();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_by_listener = Rc::clone(&seen);
        f.reconciler
            .register_listener(move |record| seen_by_listener.borrow_mut().push(record.theme));

        f.reconciler.set_local(&ConfigPatch::theme(Theme::Dark));
        for notify in f.reconciler.drain_due_notifications() {
            notify();
        }
        f.reconciler.set_local(&ConfigPatch::theme(Theme::Dark));
        assert!(f.reconciler.drain_due_notifications().is_empty());
        assert_eq!(*seen.borrow(), vec![Theme::Dark]);
    }

    #[test]
    fn test_starts_from_guest_record() {
        let durable = CountingStore::default();
        store_json(&durable, "guest_userconfig", &record(Theme::Dark, 3));
        let f = fixture_with(durable);
        assert_eq!(f.reconciler.current().language, 3);
        assert!(f.reconciler.state().is_guest());
    }

    #[test]
    fn test_starts_from_user_record_when_session_is_authenticated() {
        let durable = CountingStore::default();
        let session = MemoryStore::new();
        store_json(&durable, "guest_userconfig", &record(Theme::Light, 3));
        store_json(
            &durable,
            "user_config",
            &record(Theme::Dark, 2).owned_by(Some("u1".to_string())),
        );
        login(&session, "u1");

        let f = fixture_from(durable, session);
        assert_eq!(f.reconciler.state(), Identity::Authenticated("u1".to_string()));
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
        assert_eq!(f.reconciler.current().language, 2);
        assert_eq!(f.api.reads(), 0);

        // A change made before the first pass belongs to the user, not the guest.
        let (owner, _) = f
            .reconciler
            .set_local(&ConfigPatch {
                language: Some(5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(owner, "u1");
        assert_eq!(
            f.reconciler.persister().load_guest().map(|r| r.language),
            Some(3)
        );
    }

    #[test]
    fn test_authenticated_start_ignores_foreign_user_record() {
        let durable = CountingStore::default();
        let session = MemoryStore::new();
        store_json(
            &durable,
            "user_config",
            &record(Theme::Dark, 2).owned_by(Some("someone-else".to_string())),
        );
        login(&session, "u1");

        let f = fixture_from(durable, session);
        assert_eq!(
            f.reconciler.current(),
            ConfigRecord::default().owned_by(Some("u1".to_string()))
        );
    }

    #[test]
    fn test_explicit_pass_keeps_unsynced_local_change() {
        let f = fixture();
        f.api.insert("u1", record(Theme::Light, 1));
        login(&f.session, "u1");
        block_on(f.reconciler.reconcile(PassMode::Explicit));

        // The write of this change never reached the remote.
        f.reconciler.set_local(&ConfigPatch::theme(Theme::Dark));
        f.reconciler.persister().mark_unsynced("u1");
        f.clock.advance_ms(60_000);
        let reads = f.api.reads();

        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Explicit)),
            ReconcileOutcome::Unchanged
        );
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
        assert_eq!(
            f.reconciler.persister().load_user("u1").map(|r| r.theme),
            Some(Theme::Dark)
        );
        assert_eq!(f.api.reads(), reads);

        // Once confirmed, the remote is consulted again.
        f.reconciler.persister().clear_unsynced();
        assert_eq!(
            block_on(f.reconciler.reconcile(PassMode::Explicit)),
            ReconcileOutcome::Applied
        );
        assert_eq!(f.reconciler.current().theme, Theme::Light);
    }

    #[test]
    fn test_empty_signal_pass_does_not_supersede_explicit_pass() {
        let session = MemoryStore::new();
        login(&session, "u1");
        let f = fixture_from(CountingStore::default(), session);
        f.api.insert("u1", record(Theme::Dark, 1));
        f.api.hold_reads();

        let mut pool = LocalPool::new();
        let outcome = Rc::new(Cell::new(None));
        {
            let reconciler = Rc::clone(&f.reconciler);
            let outcome = Rc::clone(&outcome);
            pool.spawner()
                .spawn_local(async move {
                    outcome.set(Some(reconciler.reconcile(PassMode::Explicit).await));
                })
                .unwrap();
        }
        pool.run_until_stalled();

        // No durable record yet: the signal pass has nothing to apply.
        assert_eq!(
            pool.run_until(f.reconciler.reconcile(PassMode::Signal)),
            ReconcileOutcome::Unchanged
        );

        f.api.release();
        pool.run_until_stalled();
        assert_eq!(outcome.get(), Some(ReconcileOutcome::Applied));
        assert_eq!(f.reconciler.current().theme, Theme::Dark);
    }
}
