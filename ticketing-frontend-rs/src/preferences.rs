use std::rc::Rc;
use std::sync::LazyLock;

use prefsync::http::HttpConfigApi;
use prefsync::{
    ConfigPatch, ConfigRecord, GuardOutcome, Host, ListenerKey, PreferenceSync, Scope, ScopeToken,
    SetOptions, SyncConfig, SystemClock,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::BindingError;
use crate::web::{BrowserSpawner, BrowserTimer, EventListener, WebStorage};
use crate::{SIGNAL_EVENT, api_base_url, outcome_label, parse_signal_kind, utils};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

/// One synchronization core per page. Dropping it (`free()` from JS) detaches its event listeners.
#[wasm_bindgen]
pub struct Preferences {
    // we never hold a borrow across an .await inside `sync`, so sharing it with the listeners is fine
    sync: PreferenceSync<HttpConfigApi>,
    window: web_sys::Window,
    _storage_listener: EventListener,
    _signal_listener: EventListener,
}

#[wasm_bindgen]
impl Preferences {
    /// `options` is an optional `SyncConfig` object; omitted fields keep their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(api_base: Option<String>, options: JsValue) -> Result<Preferences, JsValue> {
        LazyLock::force(&LOGGER);

        let config: SyncConfig = if options.is_undefined() || options.is_null() {
            SyncConfig::default()
        } else {
            serde_wasm_bindgen::from_value(options).map_err(BindingError::from)?
        };
        let window = web_sys::window().ok_or(BindingError::NoWindow)?;
        let host = Host {
            durable: Rc::new(WebStorage::local(&window)?),
            session: Rc::new(WebStorage::session(&window)?),
            clock: Rc::new(SystemClock),
            timer: Rc::new(BrowserTimer::new(window.clone())),
            spawner: Rc::new(BrowserSpawner),
        };
        let base_url = api_base_url(api_base);
        let api = HttpConfigApi::new(&base_url).map_err(BindingError::from)?;
        let sync = PreferenceSync::new(api, host, config);

        let storage_listener = {
            let sync = sync.clone();
            EventListener::new(window.as_ref(), "storage", move |event| {
                let Some(event) = event.dyn_ref::<web_sys::StorageEvent>() else {
                    return;
                };
                sync.handle_storage_event(event.key().as_deref(), event.new_value().as_deref());
            })?
        };
        let signal_listener = {
            let sync = sync.clone();
            EventListener::new(window.as_ref(), SIGNAL_EVENT, move |event| {
                let Some(event) = event.dyn_ref::<web_sys::CustomEvent>() else {
                    return;
                };
                let detail = event.detail().as_string();
                match detail.as_deref().map(parse_signal_kind) {
                    Some(Ok(kind)) => sync.publish(kind),
                    _ => log::warn!("Ignoring {SIGNAL_EVENT} event with detail {detail:?}"),
                }
            })?
        };

        {
            let sync = sync.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let outcome = sync.reset_for_identity_change().await;
                log::debug!("Initial reconciliation: {}", outcome_label(outcome));
            });
        }

        log::info!("Preferences initialized against {base_url}");
        Ok(Self {
            sync,
            window,
            _storage_listener: storage_listener,
            _signal_listener: signal_listener,
        })
    }

    pub fn get_current_config(&self) -> Result<JsValue, JsValue> {
        record_to_js(&self.sync.current_config())
    }

    /// Applies and persists a partial update immediately; the remote write happens in the background.
    pub fn set_config(&self, patch: JsValue, skip_remote_write: Option<bool>) -> Result<(), JsValue> {
        let patch: ConfigPatch = serde_wasm_bindgen::from_value(patch).map_err(BindingError::from)?;
        self.sync.set_config(
            patch,
            SetOptions {
                skip_remote_write: skip_remote_write.unwrap_or(false),
            },
        );
        Ok(())
    }

    pub fn on_config_changed(&self, callback: js_sys::Function) -> ListenerKey {
        self.sync.on_config_changed(move |record| match record_to_js(record) {
            Ok(value) => {
                if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                    log::error!("Config listener threw: {e:?}");
                }
            }
            Err(e) => log::error!("Failed to convert config for listener: {e:?}"),
        })
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.sync.unsubscribe_config(key)
    }

    /// Announces `identityChanged` or `configChanged` to every consumer on this page.
    pub fn notify(&self, kind: &str) -> Result<(), JsValue> {
        parse_signal_kind(kind)?;
        let init = web_sys::CustomEventInit::new();
        init.set_detail(&JsValue::from_str(kind));
        let event = web_sys::CustomEvent::new_with_event_init_dict(SIGNAL_EVENT, &init)?;
        self.window.dispatch_event(&event)?;
        Ok(())
    }

    pub async fn reset_for_identity_change(&self) -> String {
        outcome_label(self.sync.reset_for_identity_change().await).to_string()
    }

    pub fn begin_logout(&self) {
        self.sync.begin_logout()
    }

    pub async fn finish_logout(&self) -> String {
        outcome_label(self.sync.finish_logout().await).to_string()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        self.sync.api().set_access_token(token)
    }

    pub fn mount(&self) -> MountScope {
        let scope = self.sync.mount();
        MountScope {
            token: scope.token(),
            scope: Some(scope),
        }
    }

    /// Runs `op` (a function returning a promise) unless the same `op_id` is already in flight. Resolves to
    /// `{ status: "skipped" | "completed" | "detached", value?, error? }`.
    pub fn guarded_operation(
        &self,
        op_id: String,
        scope: &MountScope,
        op: js_sys::Function,
    ) -> js_sys::Promise {
        let sync = self.sync.clone();
        let token = scope.token.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            let outcome = sync
                .guarded_operation(&op_id, &token, || async move {
                    let pending = op.call0(&JsValue::NULL)?;
                    JsFuture::from(js_sys::Promise::resolve(&pending)).await
                })
                .await;
            outcome_to_js(outcome)
        })
    }
}

/// Liveness handle of a mounted component.
#[wasm_bindgen]
pub struct MountScope {
    scope: Option<Scope>,
    token: ScopeToken,
}

#[wasm_bindgen]
impl MountScope {
    pub fn unmount(&mut self) {
        self.scope.take();
    }

    #[wasm_bindgen(getter)]
    pub fn mounted(&self) -> bool {
        self.token.is_alive()
    }
}

fn record_to_js(record: &ConfigRecord) -> Result<JsValue, JsValue> {
    Ok(serde_wasm_bindgen::to_value(record).map_err(BindingError::from)?)
}

fn outcome_to_js(outcome: GuardOutcome<JsValue, JsValue>) -> Result<JsValue, JsValue> {
    let (status, settled) = match outcome {
        GuardOutcome::Skipped => ("skipped", None),
        GuardOutcome::Completed(result) => ("completed", Some(result)),
        GuardOutcome::Detached(result) => ("detached", Some(result)),
    };
    let obj = js_sys::Object::new();
    js_sys::Reflect::set(&obj, &"status".into(), &status.into())?;
    match settled {
        Some(Ok(value)) => js_sys::Reflect::set(&obj, &"value".into(), &value)?,
        Some(Err(error)) => js_sys::Reflect::set(&obj, &"error".into(), &error)?,
        None => true,
    };
    Ok(obj.into())
}
