use wasm_bindgen::JsValue;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("no window: not running in a browser page")]
    NoWindow,
    #[error("{0} is not available")]
    StorageUnavailable(&'static str),
    #[error("invalid configuration patch: {0}")]
    InvalidPatch(#[from] serde_wasm_bindgen::Error),
    #[error("unknown signal kind {0:?}")]
    UnknownSignal(String),
    #[error(transparent)]
    Remote(#[from] prefsync::RemoteError),
    #[error("failed to listen for {event}: {reason}")]
    Listener { event: &'static str, reason: String },
}

impl From<BindingError> for JsValue {
    fn from(e: BindingError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
