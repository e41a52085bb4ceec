#[path = "1-identity.rs"]
mod identity;

#[path = "2-config-record.rs"]
mod config_record;

#[path = "3-cache-entry.rs"]
mod cache_entry;

pub use cache_entry::*;
pub use config_record::*;
pub use identity::*;

#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ListenerKey(pub(crate) slotmap::DefaultKey);
