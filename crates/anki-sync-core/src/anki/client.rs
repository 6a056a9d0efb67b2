//! Typed AnkiConnect operations on top of an [`AnkiTransport`].

use super::{AnkiError, AnkiTransport, Request, Response};
use crate::note::{NoteId, NoteTypeId};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Payload of `addNote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub options: NoteOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

impl Default for NoteOptions {
    fn default() -> Self {
        Self {
            allow_duplicate: false,
            duplicate_scope: "deck".to_string(),
        }
    }
}

/// The part of a `notesInfo` entry the synchronizer needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    #[serde(default)]
    pub note_id: Option<NoteId>,
    #[serde(default)]
    pub cards: Vec<i64>,
}

/// AnkiConnect client.
pub struct AnkiClient<T> {
    transport: T,
}

impl<T: AnkiTransport> AnkiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn call<R: DeserializeOwned>(&self, action: &str, params: Value) -> Result<R, AnkiError> {
        let value = self.transport.invoke(&Request::new(action, params)).await?;
        serde_json::from_value(value).map_err(|e| AnkiError::Decode(format!("{}: {}", action, e)))
    }

    /// AnkiConnect API version; doubles as a reachability check.
    pub async fn version(&self) -> Result<u32, AnkiError> {
        self.call("version", Value::Null).await
    }

    /// All note types by name.
    pub async fn model_names_and_ids(&self) -> Result<BTreeMap<String, NoteTypeId>, AnkiError> {
        self.call("modelNamesAndIds", Value::Null).await
    }

    /// Run several requests in one round trip; results come back in order.
    pub async fn multi(&self, requests: Vec<Request>) -> Result<Vec<Result<Value, AnkiError>>, AnkiError> {
        let expected = requests.len();
        let responses: Vec<Response> = self.call("multi", json!({ "actions": requests })).await?;
        if responses.len() != expected {
            return Err(AnkiError::Decode(format!(
                "multi: expected {} results, got {}",
                expected,
                responses.len()
            )));
        }
        Ok(responses.into_iter().map(Response::into_result).collect())
    }

    /// Field names of each named note type, fetched in a single `multi` call.
    pub async fn model_field_names(&self, models: &[String]) -> Result<Vec<Vec<String>>, AnkiError> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let requests = models
            .iter()
            .map(|name| Request::new("modelFieldNames", json!({ "modelName": name })))
            .collect();

        self.multi(requests)
            .await?
            .into_iter()
            .zip(models)
            .map(|(result, name)| {
                let value = result?;
                serde_json::from_value(value)
                    .map_err(|e| AnkiError::Decode(format!("modelFieldNames {}: {}", name, e)))
            })
            .collect()
    }

    pub async fn add_note(&self, note: &NewNote) -> Result<NoteId, AnkiError> {
        let id: Option<NoteId> = self.call("addNote", json!({ "note": note })).await?;
        id.ok_or_else(|| AnkiError::Remote("note was not created".to_string()))
    }

    pub async fn update_note_fields(
        &self,
        id: NoteId,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), AnkiError> {
        self.call::<Value>("updateNoteFields", json!({ "note": { "id": id, "fields": fields } }))
            .await
            .map(drop)
    }

    pub async fn add_tags(&self, notes: &[NoteId], tags: &[String]) -> Result<(), AnkiError> {
        self.call::<Value>("addTags", json!({ "notes": notes, "tags": tags.join(" ") }))
            .await
            .map(drop)
    }

    pub async fn remove_tags(&self, notes: &[NoteId], tags: &[String]) -> Result<(), AnkiError> {
        self.call::<Value>("removeTags", json!({ "notes": notes, "tags": tags.join(" ") }))
            .await
            .map(drop)
    }

    pub async fn delete_notes(&self, notes: &[NoteId]) -> Result<(), AnkiError> {
        self.call::<Value>("deleteNotes", json!({ "notes": notes }))
            .await
            .map(drop)
    }

    pub async fn notes_info(&self, notes: &[NoteId]) -> Result<Vec<NoteInfo>, AnkiError> {
        self.call("notesInfo", json!({ "notes": notes })).await
    }

    pub async fn change_deck(&self, cards: &[i64], deck: &str) -> Result<(), AnkiError> {
        self.call::<Value>("changeDeck", json!({ "cards": cards, "deck": deck }))
            .await
            .map(drop)
    }

    pub async fn create_deck(&self, deck: &str) -> Result<i64, AnkiError> {
        self.call("createDeck", json!({ "deck": deck })).await
    }

    /// Upload a file into Anki's media folder; returns the stored file name.
    pub async fn store_media_file(&self, filename: &str, data: &[u8]) -> Result<String, AnkiError> {
        self.call(
            "storeMediaFile",
            json!({ "filename": filename, "data": STANDARD.encode(data) }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::InMemoryAnki;
    use std::sync::Arc;

    #[tokio::test]
    async fn field_names_are_fetched_in_one_round_trip() {
        let anki = Arc::new(InMemoryAnki::new());
        anki.add_model(NoteTypeId(1), "Basic", &["Front", "Back"]);
        anki.add_model(NoteTypeId(2), "Cloze", &["Text", "Back Extra"]);
        let client = AnkiClient::new(Arc::clone(&anki));

        let names = client
            .model_field_names(&["Cloze".to_string(), "Basic".to_string()])
            .await
            .unwrap();

        assert_eq!(names, vec![vec!["Text", "Back Extra"], vec!["Front", "Back"]]);
        assert_eq!(anki.count_calls("modelFieldNames"), 2);
    }

    #[tokio::test]
    async fn sub_request_errors_surface() {
        let anki = Arc::new(InMemoryAnki::new());
        let client = AnkiClient::new(Arc::clone(&anki));

        let err = client
            .model_field_names(&["Missing".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, AnkiError::Remote("model was not found: Missing".into()));
    }

    #[tokio::test]
    async fn add_note_returns_identity() {
        let anki = Arc::new(InMemoryAnki::new());
        anki.add_model(NoteTypeId(1), "Basic", &["Front", "Back"]);
        anki.add_deck("Default");
        anki.set_next_note_id(NoteId(555));
        let client = AnkiClient::new(Arc::clone(&anki));

        let note = NewNote {
            deck_name: "Default".into(),
            model_name: "Basic".into(),
            fields: BTreeMap::from([("Front".into(), "q".into()), ("Back".into(), "a".into())]),
            tags: vec!["t".into()],
            options: NoteOptions::default(),
        };
        assert_eq!(client.add_note(&note).await.unwrap(), NoteId(555));

        let info = client.notes_info(&[NoteId(555)]).await.unwrap();
        assert_eq!(info[0].note_id, Some(NoteId(555)));
        assert_eq!(info[0].cards.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_anki_is_a_transport_error() {
        let anki = Arc::new(InMemoryAnki::new());
        anki.set_offline(true);
        let client = AnkiClient::new(Arc::clone(&anki));

        assert!(client.version().await.unwrap_err().is_transport());
    }
}
