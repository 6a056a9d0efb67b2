//! In-memory AnkiConnect for tests.
//!
//! Models the small part of a collection the synchronizer touches: note
//! types, decks, notes with their cards, and the media folder. Every leaf
//! request is recorded so tests can assert exactly which mutations a pass
//! performed.

use super::{AnkiError, AnkiTransport, Request, Response};
use crate::note::{NoteId, NoteTypeId};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Actions that never change the collection.
const READ_ONLY_ACTIONS: &[&str] = &["version", "modelNamesAndIds", "modelFieldNames", "notesInfo"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    pub model: String,
    pub deck: String,
    pub fields: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub cards: Vec<i64>,
}

#[derive(Debug, Default)]
struct Collection {
    models: BTreeMap<String, (NoteTypeId, Vec<String>)>,
    decks: BTreeSet<String>,
    notes: BTreeMap<NoteId, StoredNote>,
    media: BTreeMap<String, Vec<u8>>,
    next_note_id: i64,
}

/// Fake AnkiConnect backed by a `Mutex`.
pub struct InMemoryAnki {
    collection: Mutex<Collection>,
    calls: Mutex<Vec<Request>>,
    failures: Mutex<HashMap<String, VecDeque<String>>>,
    offline: AtomicBool,
}

impl Default for InMemoryAnki {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAnki {
    pub fn new() -> Self {
        Self {
            collection: Mutex::new(Collection {
                next_note_id: 1_000,
                ..Collection::default()
            }),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn add_model(&self, id: NoteTypeId, name: &str, fields: &[&str]) {
        let fields = fields.iter().map(|f| f.to_string()).collect();
        self.collection
            .lock()
            .unwrap()
            .models
            .insert(name.to_string(), (id, fields));
    }

    pub fn remove_model(&self, name: &str) {
        self.collection.lock().unwrap().models.remove(name);
    }

    pub fn add_deck(&self, name: &str) {
        self.collection.lock().unwrap().decks.insert(name.to_string());
    }

    pub fn has_deck(&self, name: &str) -> bool {
        self.collection.lock().unwrap().decks.contains(name)
    }

    /// The identity handed out by the next successful `addNote`.
    pub fn set_next_note_id(&self, id: NoteId) {
        self.collection.lock().unwrap().next_note_id = id.0;
    }

    /// Make every request fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Queue a remote error for the next call of `action`.
    pub fn fail_next(&self, action: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    pub fn note(&self, id: NoteId) -> Option<StoredNote> {
        self.collection.lock().unwrap().notes.get(&id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.collection.lock().unwrap().notes.len()
    }

    pub fn media(&self, filename: &str) -> Option<Vec<u8>> {
        self.collection.lock().unwrap().media.get(filename).cloned()
    }

    /// Every recorded request, in order.
    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded requests that change the collection.
    pub fn mutations(&self) -> Vec<Request> {
        self.calls()
            .into_iter()
            .filter(|r| !READ_ONLY_ACTIONS.contains(&r.action.as_str()))
            .collect()
    }

    pub fn count_calls(&self, action: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.action == action).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn dispatch(&self, request: &Request) -> Result<Value, AnkiError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AnkiError::Transport("connection refused".to_string()));
        }
        if request.action == "multi" {
            let actions: Vec<Request> = param(&request.params, "actions")?;
            let responses: Vec<Response> = actions
                .iter()
                .map(|sub| match self.dispatch(sub) {
                    Ok(result) => Response::success(result),
                    Err(err) => Response::failure(err.to_string()),
                })
                .collect();
            return serde_json::to_value(responses).map_err(|e| AnkiError::Decode(e.to_string()));
        }

        self.calls.lock().unwrap().push(request.clone());
        if let Some(message) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&request.action)
            .and_then(VecDeque::pop_front)
        {
            return Err(AnkiError::Remote(message));
        }

        let mut collection = self.collection.lock().unwrap();
        collection.apply(&request.action, &request.params)
    }
}

impl Collection {
    fn apply(&mut self, action: &str, params: &Value) -> Result<Value, AnkiError> {
        match action {
            "version" => Ok(json!(6)),
            "modelNamesAndIds" => Ok(json!(
                self.models
                    .iter()
                    .map(|(name, (id, _))| (name.clone(), id.0))
                    .collect::<BTreeMap<_, _>>()
            )),
            "modelFieldNames" => {
                let name: String = param(params, "modelName")?;
                let (_, fields) = self
                    .models
                    .get(&name)
                    .ok_or_else(|| remote(format!("model was not found: {}", name)))?;
                Ok(json!(fields))
            }
            "createDeck" => {
                let deck: String = param(params, "deck")?;
                self.decks.insert(deck.clone());
                let id = self.decks.iter().position(|d| *d == deck).unwrap_or(0) as i64 + 1;
                Ok(json!(id))
            }
            "addNote" => {
                let note: super::NewNote = param(params, "note")?;
                let (_, field_names) = self
                    .models
                    .get(&note.model_name)
                    .ok_or_else(|| remote(format!("model was not found: {}", note.model_name)))?;
                if !self.decks.contains(&note.deck_name) {
                    return Err(remote(format!("deck was not found: {}", note.deck_name)));
                }
                if let Some(unknown) = note.fields.keys().find(|f| !field_names.contains(f)) {
                    return Err(remote(format!("unknown field: {}", unknown)));
                }
                let id = NoteId(self.next_note_id);
                self.next_note_id += 1;
                self.notes.insert(
                    id,
                    StoredNote {
                        model: note.model_name,
                        deck: note.deck_name,
                        fields: note.fields,
                        tags: note.tags.into_iter().collect(),
                        cards: vec![id.0 * 10 + 1],
                    },
                );
                Ok(json!(id))
            }
            "updateNoteFields" => {
                let note: Value = param(params, "note")?;
                let id: NoteId = param(&note, "id")?;
                let fields: BTreeMap<String, String> = param(&note, "fields")?;
                let stored = self
                    .notes
                    .get_mut(&id)
                    .ok_or_else(|| remote(format!("Note was not found: {}", id)))?;
                stored.fields.extend(fields);
                Ok(Value::Null)
            }
            "addTags" | "removeTags" => {
                let notes: Vec<NoteId> = param(params, "notes")?;
                let tags: String = param(params, "tags")?;
                for id in notes {
                    if let Some(stored) = self.notes.get_mut(&id) {
                        for tag in tags.split_whitespace() {
                            if action == "addTags" {
                                stored.tags.insert(tag.to_string());
                            } else {
                                stored.tags.remove(tag);
                            }
                        }
                    }
                }
                Ok(Value::Null)
            }
            "deleteNotes" => {
                let notes: Vec<NoteId> = param(params, "notes")?;
                for id in notes {
                    self.notes.remove(&id);
                }
                Ok(Value::Null)
            }
            "notesInfo" => {
                let notes: Vec<NoteId> = param(params, "notes")?;
                Ok(Value::Array(
                    notes
                        .iter()
                        .map(|id| match self.notes.get(id) {
                            Some(stored) => json!({
                                "noteId": id,
                                "modelName": stored.model,
                                "tags": stored.tags,
                                "cards": stored.cards,
                            }),
                            None => json!({}),
                        })
                        .collect(),
                ))
            }
            "changeDeck" => {
                let cards: Vec<i64> = param(params, "cards")?;
                let deck: String = param(params, "deck")?;
                if !self.decks.contains(&deck) {
                    return Err(remote(format!("deck was not found: {}", deck)));
                }
                for stored in self.notes.values_mut() {
                    if stored.cards.iter().any(|c| cards.contains(c)) {
                        stored.deck = deck.clone();
                    }
                }
                Ok(Value::Null)
            }
            "storeMediaFile" => {
                let filename: String = param(params, "filename")?;
                let data: String = param(params, "data")?;
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| remote(format!("invalid media data: {}", e)))?;
                self.media.insert(filename.clone(), bytes);
                Ok(json!(filename))
            }
            other => Err(remote(format!("unsupported action: {}", other))),
        }
    }
}

#[async_trait]
impl AnkiTransport for InMemoryAnki {
    async fn invoke(&self, request: &Request) -> Result<Value, AnkiError> {
        self.dispatch(request)
    }
}

fn remote(message: String) -> AnkiError {
    AnkiError::Remote(message)
}

fn param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, AnkiError> {
    let value = params.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| remote(format!("invalid parameter {}: {}", key, e)))
}
