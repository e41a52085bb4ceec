//! [`ConfigApi`] over HTTP: `GET` and `PUT {base}/user-config/{ownerId}` with a bearer token.

use std::cell::RefCell;

use reqwest::Url;

use crate::data_model::ConfigRecord;
use crate::error::RemoteError;
use crate::fetcher::ConfigApi;

pub struct HttpConfigApi {
    client: reqwest::Client,
    base_url: Url,
    access_token: RefCell<Option<String>>,
}

impl HttpConfigApi {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RemoteError::Unavailable(format!("invalid base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Unavailable(format!(
                "{base_url} cannot be used as a base url"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            access_token: RefCell::new(None),
        })
    }

    /// Token sent with every request from now on. `None` sends no `Authorization` header.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.borrow_mut() = token;
    }

    pub fn endpoint(&self, owner_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("user-config").push(owner_id);
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token.borrow().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn unavailable(e: reqwest::Error) -> RemoteError {
    RemoteError::Unavailable(e.to_string())
}

impl ConfigApi for HttpConfigApi {
    async fn read(&self, owner_id: &str) -> Result<ConfigRecord, RemoteError> {
        let request = self.authorize(self.client.get(self.endpoint(owner_id)));
        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        let body = response.text().await.map_err(unavailable)?;
        Ok(ConfigRecord::from_json_str(&body)?)
    }

    async fn write(&self, owner_id: &str, record: &ConfigRecord) -> Result<(), RemoteError> {
        let request = self.authorize(self.client.put(self.endpoint(owner_id)).json(record));
        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        Ok(())
    }
}
