//! Remote data service client.
//!
//! The remote service owns the authoritative copy of every record. It is
//! reachable only when online; errors distinguish the transient kind (worth
//! retrying on a later trigger) from the permanent kind (the operation can
//! never succeed as submitted).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Collection;

/// Default client-side timeout for one remote operation
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The record does not exist on the server (permanent)
    #[error("record not found: {0}")]
    NotFound(String),
    /// The server rejected the payload (permanent)
    #[error("rejected by server: {0}")]
    Rejected(String),
    /// The service could not be reached or failed server-side (transient)
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The request exceeded the client-side timeout (transient)
    #[error("request timed out")]
    Timeout,
    /// The client itself is misconfigured
    #[error("invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// Whether retrying the same operation later may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Per-collection operations exposed by the remote data service.
///
/// Payloads and responses are JSON values in the wire shape (`_id` key);
/// the sync engine deserializes responses into typed records per collection.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    async fn list(&self, collection: Collection) -> RemoteResult<Vec<serde_json::Value>>;

    async fn get(&self, collection: Collection, id: &str) -> RemoteResult<serde_json::Value>;

    async fn create(
        &self,
        collection: Collection,
        payload: &serde_json::Value,
    ) -> RemoteResult<serde_json::Value>;

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        payload: &serde_json::Value,
    ) -> RemoteResult<serde_json::Value>;

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()>;
}

/// reqwest-backed implementation over `{base}/api/{collection}[/{id}]`
#[derive(Clone)]
pub struct HttpDataService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDataService {
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::InvalidConfiguration(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/api/{collection}", self.base_url)
    }

    fn record_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/api/{collection}/{id}", self.base_url)
    }

    async fn handle<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> RemoteResult<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(classify_reqwest_error);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }

    async fn handle_empty(response: reqwest::Response) -> RemoteResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl RemoteDataService for HttpDataService {
    async fn list(&self, collection: Collection) -> RemoteResult<Vec<serde_json::Value>> {
        let response = self
            .client
            .get(self.collection_url(collection))
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Self::handle(response).await
    }

    async fn get(&self, collection: Collection, id: &str) -> RemoteResult<serde_json::Value> {
        let response = self
            .client
            .get(self.record_url(collection, id))
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Self::handle(response).await
    }

    async fn create(
        &self,
        collection: Collection,
        payload: &serde_json::Value,
    ) -> RemoteResult<serde_json::Value> {
        let response = self
            .client
            .post(self.collection_url(collection))
            .json(payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Self::handle(response).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        payload: &serde_json::Value,
    ) -> RemoteResult<serde_json::Value> {
        let response = self
            .client
            .put(self.record_url(collection, id))
            .json(payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Self::handle(response).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.record_url(collection, id))
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Self::handle_empty(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let detail = parse_api_error(status, body);
    if status == StatusCode::NOT_FOUND {
        RemoteError::NotFound(detail)
    } else if status.is_server_error() {
        RemoteError::Unavailable(detail)
    } else {
        RemoteError::Rejected(detail)
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unavailable(error.to_string())
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> RemoteResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
