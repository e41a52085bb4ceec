#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub const DEFAULT_API_BASE_URL: &str = "https://api.ticketing.app/v1";

/// Base URL of the configuration endpoints. An empty or missing override falls back to the default; a
/// trailing slash is dropped so that paths join predictably.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn api_base_url(override_url: Option<String>) -> String {
    let url = override_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL);
    url.trim_end_matches('/').to_string()
}
