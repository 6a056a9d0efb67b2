//! AnkiConnect over HTTP.

use anki_sync_core::anki::{AnkiError, AnkiTransport, Request, Response};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

/// POSTs request envelopes to an AnkiConnect endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, AnkiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AnkiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AnkiTransport for HttpTransport {
    async fn invoke(&self, request: &Request) -> Result<Value, AnkiError> {
        trace!("AnkiConnect {} {}", request.action, request.params);
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AnkiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnkiError::Transport(format!(
                "{} answered {}",
                self.url, status
            )));
        }

        let envelope: Response = response
            .json()
            .await
            .map_err(|e| AnkiError::Decode(format!("{}: {}", request.action, e)))?;
        envelope.into_result()
    }
}
