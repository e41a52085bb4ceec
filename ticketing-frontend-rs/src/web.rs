//! Browser implementations of the host traits.

use std::time::Duration;

use futures::future::LocalBoxFuture;
use prefsync::{KeyValueStore, Spawn, StoreError, Timer};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::BindingError;

pub(crate) struct WebStorage {
    storage: web_sys::Storage,
}

impl WebStorage {
    pub fn local(window: &web_sys::Window) -> Result<Self, BindingError> {
        let storage = window
            .local_storage()
            .ok()
            .flatten()
            .ok_or(BindingError::StorageUnavailable("localStorage"))?;
        Ok(Self { storage })
    }

    pub fn session(window: &web_sys::Window) -> Result<Self, BindingError> {
        let storage = window
            .session_storage()
            .ok()
            .flatten()
            .ok_or(BindingError::StorageUnavailable("sessionStorage"))?;
        Ok(Self { storage })
    }
}

impl KeyValueStore for WebStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    // Fails when the quota is exceeded or storage is disabled (e.g. some private browsing modes).
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StoreError::WriteRejected {
                key: key.to_string(),
                reason: format!("{e:?}"),
            })
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.storage.remove_item(key) {
            log::warn!("Failed to remove {key}: {e:?}");
        }
    }
}

pub(crate) struct BrowserTimer {
    window: web_sys::Window,
}

impl BrowserTimer {
    pub fn new(window: web_sys::Window) -> Self {
        Self { window }
    }
}

impl Timer for BrowserTimer {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let timeout = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        let window = self.window.clone();
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            if let Err(e) =
                window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
            {
                log::error!("setTimeout failed: {e:?}");
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        Box::pin(async move {
            let _ = JsFuture::from(promise).await;
        })
    }
}

pub(crate) struct BrowserSpawner;

impl Spawn for BrowserSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// An event listener that is removed again when dropped.
pub(crate) struct EventListener {
    target: web_sys::EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl EventListener {
    pub fn new(
        target: &web_sys::EventTarget,
        event: &'static str,
        handler: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<Self, BindingError> {
        let callback = Closure::<dyn FnMut(web_sys::Event)>::wrap(Box::new(handler));
        target
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
            .map_err(|e| BindingError::Listener {
                event,
                reason: format!("{e:?}"),
            })?;
        Ok(Self {
            target: target.clone(),
            event,
            callback,
        })
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}
