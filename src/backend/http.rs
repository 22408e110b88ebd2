//! reqwest client for the drawing REST endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::domain::{SessionId, Snapshot};

use super::{BackendError, DrawingBackend};

const LOG_TARGET: &str = "backend::http";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    pub base_url: Url,
    #[serde(with = "crate::config::duration_ms", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl HttpBackendConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct HttpDrawingBackend {
    client: Client,
    base_url: Url,
}

impl HttpDrawingBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let mut base_url = config.base_url;
        // Url::join replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, session: SessionId, action: &str) -> Result<Url, BackendError> {
        Ok(self.base_url.join(&format!("drawings/{session}/{action}"))?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Snapshot, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<Snapshot>().await?)
    }

    async fn post(&self, session: SessionId, action: &str) -> Result<Snapshot, BackendError> {
        let url = self.endpoint(session, action)?;
        debug!(target = LOG_TARGET, %url, "issuing drawing command");
        self.send(self.client.post(url)).await
    }
}

#[async_trait]
impl DrawingBackend for HttpDrawingBackend {
    async fn drawing_state(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        let url = self.endpoint(session, "state")?;
        self.send(self.client.get(url)).await
    }

    async fn start_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.post(session, "start").await
    }

    async fn reveal_next(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.post(session, "reveal-next").await
    }

    async fn reset_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.post(session, "reset").await
    }
}
