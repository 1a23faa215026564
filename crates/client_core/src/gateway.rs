//! Boundary with the remote store.
//!
//! Every call is a single attempt. Nothing here retries or times out; recovery
//! is the engine's job.

use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{Item, ItemId},
    error::RemoteFailure,
    protocol::ItemBody,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self) -> RemoteResult<Vec<Item>>;
    /// The store assigns the final identifier.
    async fn create(&self, body: ItemBody) -> RemoteResult<Item>;
    /// Full replacement of the item stored under `id`.
    async fn update(&self, id: ItemId, body: ItemBody) -> RemoteResult<Item>;
    async fn delete(&self, id: ItemId) -> RemoteResult<()>;
}

/// Placeholder used when no store is configured. Every call fails.
pub struct UnavailableRemoteStore;

#[async_trait]
impl RemoteStore for UnavailableRemoteStore {
    async fn list(&self) -> RemoteResult<Vec<Item>> {
        Err(RemoteFailure::new("remote store is unavailable"))
    }

    async fn create(&self, _body: ItemBody) -> RemoteResult<Item> {
        Err(RemoteFailure::new("remote store is unavailable"))
    }

    async fn update(&self, id: ItemId, _body: ItemBody) -> RemoteResult<Item> {
        Err(RemoteFailure::new(format!(
            "remote store is unavailable for item {id}"
        )))
    }

    async fn delete(&self, id: ItemId) -> RemoteResult<()> {
        Err(RemoteFailure::new(format!(
            "remote store is unavailable for item {id}"
        )))
    }
}

#[derive(Debug, Error)]
pub enum StoreUrlError {
    #[error("invalid store url '{url}': {source}")]
    Parse {
        url: String,
        source: url::ParseError,
    },
    #[error("store url '{0}' cannot carry a collection path")]
    NotABase(String),
    #[error("collection name must not be empty")]
    EmptyCollection,
}

/// JSON-over-HTTP store exposing `<base>/<collection>` and `<base>/<collection>/<id>`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    http: Client,
    collection_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, collection: &str) -> Result<Self, StoreUrlError> {
        Self::with_client(Client::new(), base_url, collection)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        collection: &str,
    ) -> Result<Self, StoreUrlError> {
        let collection = collection.trim().trim_matches('/').trim();
        if collection.is_empty() {
            return Err(StoreUrlError::EmptyCollection);
        }

        let mut base = Url::parse(base_url.trim()).map_err(|source| StoreUrlError::Parse {
            url: base_url.to_string(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreUrlError::NotABase(base_url.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let collection_url = base
            .join(collection)
            .map_err(|source| StoreUrlError::Parse {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            collection_url: collection_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn item_url(&self, id: ItemId) -> String {
        format!("{}/{id}", self.collection_url)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self) -> RemoteResult<Vec<Item>> {
        debug!(url = %self.collection_url, "GET collection");
        let response = self
            .http
            .get(&self.collection_url)
            .send()
            .await
            .map_err(transport_failure)?;
        successful(response)
            .await?
            .json()
            .await
            .map_err(transport_failure)
    }

    async fn create(&self, body: ItemBody) -> RemoteResult<Item> {
        debug!(url = %self.collection_url, task = %body.task, "POST item");
        let response = self
            .http
            .post(&self.collection_url)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;
        successful(response)
            .await?
            .json()
            .await
            .map_err(transport_failure)
    }

    async fn update(&self, id: ItemId, body: ItemBody) -> RemoteResult<Item> {
        let url = self.item_url(id);
        debug!(%url, completed = body.completed, "PUT item");
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;
        successful(response)
            .await?
            .json()
            .await
            .map_err(transport_failure)
    }

    async fn delete(&self, id: ItemId) -> RemoteResult<()> {
        let url = self.item_url(id);
        debug!(%url, "DELETE item");
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(transport_failure)?;
        successful(response).await?;
        Ok(())
    }
}

fn transport_failure(err: reqwest::Error) -> RemoteFailure {
    RemoteFailure::new(err.to_string())
}

async fn successful(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            warn!(%status, %error, "failed to read store error body");
            String::new()
        }
    };
    let body = body.trim();
    if body.is_empty() {
        Err(RemoteFailure::new(format!("store returned {status}")))
    } else {
        Err(RemoteFailure::new(format!("store returned {status}: {body}")))
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
