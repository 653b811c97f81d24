//! In-memory AnkiConnect stand-in and a recording notifier for tests.

use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    anki::{
        api::AnkiApi,
        types::{
            AddNoteParams,
            Field,
            ModelSpec,
            Note,
            StoreMediaParams,
            UpdateNoteParams,
            DB_ID_FIELD,
        },
    },
    core::AnkiError,
    notify::Notifier,
};

#[derive(Debug, Default, Clone)]
pub struct FakeState {
    pub decks: Vec<String>,
    pub models: Vec<String>,
    pub notes: Vec<Note>,
    pub media: Vec<String>,
    pub calls: Vec<String>,
    next_note_id: u64,
}

/// Failures are keyed by `action:key`, `key` being the dbID, note id or filename the
/// call is about, or `*` for every call of that action. Offline calls fail like an
/// unreachable endpoint instead of a rejected request.
#[derive(Default)]
pub struct FakeAnki {
    state: Mutex<FakeState>,
    failures: Mutex<HashSet<String>>,
    offline: Mutex<bool>,
    update_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeAnki {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update calls sleep for `delay`, which makes overlapping calls observable.
    pub fn with_update_delay(delay: Duration) -> Self {
        Self { update_delay: delay, ..Self::default() }
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn fail(&self, action: &str, key: &str) {
        self.failures.lock().unwrap().insert(format!("{action}:{key}"));
    }

    pub fn recover(&self, action: &str, key: &str) {
        self.failures.lock().unwrap().remove(&format!("{action}:{key}"));
    }

    pub fn snapshot(&self) -> FakeState {
        self.state.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Inserts an existing note with the given fields and returns its id.
    pub fn insert_note(&self, fields: &[(&str, &str)]) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_note_id += 1;
        let note_id = 1000 + state.next_note_id;
        let fields = fields
            .iter()
            .enumerate()
            .map(|(order, (name, value))| {
                (name.to_string(), Field { value: value.to_string(), order: order as u32 })
            })
            .collect();
        state.notes.push(Note {
            note_id,
            model_name: "Custom: Vocab Builder".to_string(),
            tags: Vec::new(),
            fields,
            cards: Vec::new(),
        });
        note_id
    }

    pub fn note_by_db_id(&self, db_id: &str) -> Option<Note> {
        self.state.lock().unwrap().notes.iter().find(|n| n.db_id() == Some(db_id)).cloned()
    }

    fn record(&self, action: &str, key: &str) -> Result<(), AnkiError> {
        if *self.offline.lock().unwrap() {
            return Err(AnkiError::Http(StatusCode::SERVICE_UNAVAILABLE));
        }
        self.state.lock().unwrap().calls.push(action.to_string());

        let failures = self.failures.lock().unwrap();
        let rejected = failures.contains(&format!("{action}:{key}"))
            || failures.contains(&format!("{action}:*"));
        if rejected {
            return Err(AnkiError::Api(format!("{action} failed for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AnkiApi for FakeAnki {
    async fn version(&self) -> Result<u32, AnkiError> {
        self.record("version", "")?;
        Ok(6)
    }

    async fn deck_names(&self) -> Result<Vec<String>, AnkiError> {
        self.record("deckNames", "")?;
        Ok(self.state.lock().unwrap().decks.clone())
    }

    async fn create_deck(&self, deck: &str) -> Result<(), AnkiError> {
        self.record("createDeck", deck)?;
        self.state.lock().unwrap().decks.push(deck.to_string());
        Ok(())
    }

    async fn model_names(&self) -> Result<Vec<String>, AnkiError> {
        self.record("modelNames", "")?;
        Ok(self.state.lock().unwrap().models.clone())
    }

    async fn create_model(&self, spec: &ModelSpec) -> Result<(), AnkiError> {
        self.record("createModel", &spec.model_name)?;
        self.state.lock().unwrap().models.push(spec.model_name.clone());
        Ok(())
    }

    async fn store_media_file(&self, params: &StoreMediaParams) -> Result<(), AnkiError> {
        self.record("storeMediaFile", &params.filename)?;
        self.state.lock().unwrap().media.push(params.filename.clone());
        Ok(())
    }

    async fn notes_info(&self, query: &str) -> Result<Vec<Note>, AnkiError> {
        self.record("notesInfo", query)?;
        Ok(self.state.lock().unwrap().notes.clone())
    }

    async fn add_note(&self, note: &AddNoteParams) -> Result<u64, AnkiError> {
        self.record("addNote", &note.fields.db_id)?;

        let value = serde_json::to_value(&note.fields)
            .map_err(|source| AnkiError::Decode { action: "addNote".to_string(), source })?;
        let fields: HashMap<String, String> = serde_json::from_value(value)
            .map_err(|source| AnkiError::Decode { action: "addNote".to_string(), source })?;
        let pairs: Vec<(&str, &str)> =
            fields.iter().map(|(name, value)| (name.as_str(), value.as_str())).collect();
        let note_id = self.insert_note(&pairs);

        let mut state = self.state.lock().unwrap();
        for attachment in &note.audio {
            state.media.push(attachment.filename.clone());
        }
        Ok(note_id)
    }

    async fn update_note_fields(&self, note: &UpdateNoteParams) -> Result<(), AnkiError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.update_delay.is_zero() {
            tokio::time::sleep(self.update_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.record("updateNoteFields", &note.id.to_string())?;
        let mut state = self.state.lock().unwrap();
        let stored = state
            .notes
            .iter_mut()
            .find(|n| n.note_id == note.id)
            .ok_or_else(|| AnkiError::Api(format!("note {} not found", note.id)))?;
        for (name, value) in &note.fields {
            stored
                .fields
                .entry(name.clone())
                .or_insert_with(|| Field { value: String::new(), order: 0 })
                .value = value.clone();
        }
        Ok(())
    }

    async fn delete_notes(&self, note_ids: &[u64]) -> Result<(), AnkiError> {
        self.record("deleteNotes", "")?;
        self.state.lock().unwrap().notes.retain(|n| !note_ids.contains(&n.note_id));
        Ok(())
    }

    async fn delete_media_file(&self, filename: &str) -> Result<(), AnkiError> {
        self.record("deleteMediaFile", filename)?;
        self.state.lock().unwrap().media.retain(|m| m != filename);
        Ok(())
    }
}

/// Field list for a note as the sync engine would have created it.
pub fn vocab_fields<'a>(
    db_id: &'a str,
    translation: &'a str,
    note: &'a str,
    ipa: &'a str,
    audio: &'a str,
) -> Vec<(&'a str, &'a str)> {
    vec![
        ("Sentence", "sentence"),
        ("Translation", translation),
        ("Note", note),
        (DB_ID_FIELD, db_id),
        ("IPA", ipa),
        ("Audio", audio),
    ]
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
