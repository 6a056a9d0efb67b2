//! AnkiConnect protocol: request/response envelopes and the transport seam.
//!
//! Every call is a JSON object `{action, version: 6, params}` answered with
//! `{error, result}`. A non-null `error` becomes [`AnkiError::Remote`]; it is
//! never treated as fatal by itself; callers decide whether to recover.
//!
//! Implementations of [`AnkiTransport`]:
//! - `InMemoryAnki` - Fake collection for testing
//! - `HttpTransport` (in anki-sync) - POSTs to AnkiConnect with reqwest

pub mod client;
pub mod memory;

pub use client::{AnkiClient, NewNote, NoteInfo, NoteOptions};
pub use memory::InMemoryAnki;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// AnkiConnect API version spoken by this client.
pub const API_VERSION: u8 = 6;

/// Start of AnkiConnect's error message for an unknown deck.
const MISSING_DECK_PREFIX: &str = "deck was not found";

/// Default AnkiConnect endpoint.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8765";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnkiError {
    /// AnkiConnect could not be reached or answered with an HTTP failure
    #[error("transport error: {0}")]
    Transport(String),

    /// AnkiConnect processed the request and reported an error
    #[error("{0}")]
    Remote(String),

    /// The response did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl AnkiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AnkiError::Transport(_))
    }

    /// Whether the error reports that the target deck does not exist.
    ///
    /// AnkiConnect words this as `deck was not found: <name>`.
    pub fn is_missing_deck(&self) -> bool {
        match self {
            AnkiError::Remote(message) => message
                .trim_start()
                .to_lowercase()
                .starts_with(MISSING_DECK_PREFIX),
            _ => false,
        }
    }
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    pub version: u8,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(action: &str, params: Value) -> Self {
        Self {
            action: action.to_string(),
            version: API_VERSION,
            params,
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Value,
}

impl Response {
    pub fn success(result: Value) -> Self {
        Self {
            error: None,
            result,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            result: Value::Null,
        }
    }

    /// Unwrap the envelope into the result value or a remote error.
    pub fn into_result(self) -> Result<Value, AnkiError> {
        match self.error {
            Some(message) => Err(AnkiError::Remote(message)),
            None => Ok(self.result),
        }
    }
}

/// Sends one request envelope and returns the unwrapped result.
#[async_trait]
pub trait AnkiTransport: Send + Sync {
    async fn invoke(&self, request: &Request) -> Result<Value, AnkiError>;
}

#[async_trait]
impl<T: AnkiTransport + ?Sized> AnkiTransport for std::sync::Arc<T> {
    async fn invoke(&self, request: &Request) -> Result<Value, AnkiError> {
        (**self).invoke(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let request = Request::new("createDeck", json!({"deck": "a::b"}));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action": "createDeck", "version": 6, "params": {"deck": "a::b"}})
        );
    }

    #[test]
    fn response_error_becomes_remote_error() {
        let response: Response =
            serde_json::from_str(r#"{"result": null, "error": "deck was not found: x"}"#).unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err, AnkiError::Remote("deck was not found: x".into()));
        assert!(err.is_missing_deck());
    }

    #[test]
    fn missing_deck_classification() {
        assert!(AnkiError::Remote("Deck was not found: Spanish".into()).is_missing_deck());
        assert!(!AnkiError::Remote("model was not found: Deck Cards".into()).is_missing_deck());
        assert!(!AnkiError::Remote("cannot create note because it is a duplicate".into())
            .is_missing_deck());
        assert!(!AnkiError::Transport("deck not found".into()).is_missing_deck());
    }
}
