use std::future::Future;
use std::rc::{Rc, Weak};

use crate::config::SyncConfig;
use crate::data_model::{ConfigPatch, ConfigRecord, Identity, ListenerKey};
use crate::fetcher::{ConfigApi, RemoteConfigFetcher, WriteOutcome};
use crate::guard::{GuardOutcome, OperationGuard, Scope, ScopeToken};
use crate::host::Host;
use crate::identity::IdentityResolver;
use crate::persister::DurablePersister;
use crate::reconciler::{PassMode, ReconcileOutcome, Reconciler};
use crate::signal::{Debounced, Debouncer, Signal, SignalBus, SignalKind, SubscriptionKey};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Apply and persist locally only, e.g. for a value that just arrived from the server.
    pub skip_remote_write: bool,
}

/// Handle to one synchronization core. Cloning is cheap and every clone drives the same state; a host
/// creates one per browsing context.
pub struct PreferenceSync<A: ConfigApi> {
    inner: Rc<SyncInner<A>>,
}

impl<A: ConfigApi> Clone for PreferenceSync<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct SyncInner<A: ConfigApi> {
    reconciler: Reconciler<A>,
    guard: OperationGuard,
    bus: SignalBus,
    debouncer: Debouncer,
    host: Host,
    config: SyncConfig,
}

impl<A: ConfigApi> PreferenceSync<A> {
    pub fn new(api: A, host: Host, config: SyncConfig) -> Self {
        let fetcher = RemoteConfigFetcher::new(api, Rc::clone(&host.clock), config.cache_ttl());
        let reconciler = Reconciler::new(
            IdentityResolver::new(Rc::clone(&host.session), config.keys.session.clone()),
            DurablePersister::new(Rc::clone(&host.durable), config.keys.clone()),
            fetcher,
            Rc::clone(&host.clock),
            config.logout_flag_timeout(),
        );
        let inner = Rc::new(SyncInner {
            reconciler,
            guard: OperationGuard::new(),
            bus: SignalBus::new(),
            debouncer: Debouncer::new(config.debounce_window()),
            host,
            config,
        });

        for kind in [SignalKind::IdentityChanged, SignalKind::ConfigChanged] {
            let weak = Rc::downgrade(&inner);
            inner.bus.subscribe(kind, move |_| {
                if let Some(inner) = weak.upgrade() {
                    SyncInner::on_signal(&inner);
                }
            });
        }

        Self { inner }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn api(&self) -> &A {
        self.inner.reconciler.fetcher().api()
    }

    /// The last applied configuration. Never blocks.
    pub fn current_config(&self) -> ConfigRecord {
        self.inner.reconciler.current()
    }

    pub fn identity(&self) -> Identity {
        self.inner.reconciler.state()
    }

    pub fn set_config(&self, patch: ConfigPatch, options: SetOptions) {
        if patch.is_empty() {
            return;
        }
        {
            let _flusher = FlushLater::new(&self.inner.reconciler);
            let pending_write = self.inner.reconciler.set_local(&patch);

            if let Some((owner_id, record)) = pending_write.filter(|_| !options.skip_remote_write) {
                // Until the remote confirms, explicit passes must not let its older record win.
                self.inner.reconciler.persister().mark_unsynced(&owner_id);
                let inner = Rc::clone(&self.inner);
                self.inner.host.spawner.spawn_local(Box::pin(async move {
                    let outcome = inner.reconciler.fetcher().write(&owner_id, record).await;
                    let persister = inner.reconciler.persister();
                    if outcome == WriteOutcome::Written && persister.is_unsynced(&owner_id) {
                        persister.clear_unsynced();
                    }
                }));
            }
        }
        self.inner.bus.publish(SignalKind::ConfigChanged);
    }

    pub fn on_config_changed(&self, handler: impl Fn(&ConfigRecord) + 'static) -> ListenerKey {
        self.inner.reconciler.register_listener(handler)
    }

    pub fn unsubscribe_config(&self, key: ListenerKey) {
        self.inner.reconciler.unregister_listener(key)
    }

    pub fn subscribe(&self, kind: SignalKind, handler: impl Fn(Signal) + 'static) -> SubscriptionKey {
        self.inner.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, key: SubscriptionKey) {
        self.inner.bus.unsubscribe(key)
    }

    /// Same-tab notification from another consumer, e.g. the login form after storing the session.
    pub fn publish(&self, kind: SignalKind) {
        self.inner.bus.publish(kind)
    }

    /// Entry point for the host's cross-tab "storage changed" notification. The new value itself is not
    /// trusted: the pass re-reads the durable store, which holds whatever was actually committed.
    pub fn handle_storage_event(&self, key: Option<&str>, new_value: Option<&str>) {
        match self
            .inner
            .bus
            .relay_storage_event(&self.inner.config.keys, key)
        {
            Some(kind) => log::debug!(
                "Storage event for {key:?} ({} bytes) relayed as {kind:?}",
                new_value.map_or(0, str::len)
            ),
            None => log::trace!("Ignoring storage event for {key:?}"),
        }
    }

    /// Explicit reconciliation, called by the login/logout flow.
    pub async fn reset_for_identity_change(&self) -> ReconcileOutcome {
        self.inner.run_pass(PassMode::Explicit).await
    }

    /// First phase of logout: from now on, the identity reading as guest does not reset anything.
    pub fn begin_logout(&self) {
        self.inner
            .reconciler
            .persister()
            .begin_logout(self.inner.host.clock.now());
    }

    /// Second phase of logout, once the session has been cleared.
    pub async fn finish_logout(&self) -> ReconcileOutcome {
        self.inner.reconciler.persister().clear_logout();
        self.reset_for_identity_change().await
    }

    pub fn mount(&self) -> Scope {
        Scope::new()
    }

    /// Runs `op` unless an operation with the same id is already in flight.
    pub async fn guarded_operation<T, E, F, Fut>(
        &self,
        op_id: &str,
        scope: &ScopeToken,
        op: F,
    ) -> GuardOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.inner.guard.run(op_id, scope, op).await
    }

    pub fn operation_in_flight(&self, op_id: &str) -> bool {
        self.inner.guard.is_held(op_id)
    }
}

impl<A: ConfigApi> SyncInner<A> {
    async fn run_pass(&self, mode: PassMode) -> ReconcileOutcome {
        let _flusher = FlushLater::new(&self.reconciler);
        self.reconciler.reconcile(mode).await
    }

    fn on_signal(self: &Rc<Self>) {
        match self.debouncer.offer(self.host.clock.now()) {
            Debounced::Fire => {
                let inner = Rc::clone(self);
                self.host.spawner.spawn_local(Box::pin(async move {
                    inner.run_pass(PassMode::Signal).await;
                }));
            }
            Debounced::Coalesced {
                schedule_trailing: true,
            } => {
                let weak: Weak<Self> = Rc::downgrade(self);
                let window_closed = self.host.timer.sleep(self.config.debounce_duration());
                self.host.spawner.spawn_local(Box::pin(async move {
                    window_closed.await;
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.debouncer.take_trailing(inner.host.clock.now()) {
                        inner.run_pass(PassMode::Signal).await;
                    }
                }));
            }
            Debounced::Coalesced { .. } => log::debug!("Coalescing signal into pending pass"),
        }
    }
}

/// Flushes config-change listeners when dropped, whatever path the enclosing function takes.
struct FlushLater<'a, A: ConfigApi> {
    reconciler: &'a Reconciler<A>,
}

impl<'a, A: ConfigApi> FlushLater<'a, A> {
    fn new(reconciler: &'a Reconciler<A>) -> Self {
        Self { reconciler }
    }
}

impl<'a, A: ConfigApi> Drop for FlushLater<'a, A> {
    fn drop(&mut self) {
        // Listeners may call straight back into the API, so no borrow may be held while they run.
        let notifications = self.reconciler.drain_due_notifications();
        for notification in notifications {
            notification();
        }
    }
}
