use std::collections::{
    BTreeMap,
    HashMap,
};

use serde::{
    Deserialize,
    Serialize,
};

pub const DB_ID_FIELD: &str = "dbID";
pub const SENTENCE_FIELD: &str = "Sentence";
pub const TRANSLATION_FIELD: &str = "Translation";
pub const NOTE_FIELD: &str = "Note";
pub const IPA_FIELD: &str = "IPA";
pub const AUDIO_FIELD: &str = "Audio";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Field {
    pub value: String,
    #[serde(default)]
    pub order: u32,
}

/// A note as returned by `notesInfo`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note_id: u64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: HashMap<String, Field>,
    #[serde(default)]
    pub cards: Vec<u64>,
}

impl Note {
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|field| field.value.as_str())
    }

    /// Value of the join field, if the note has a non-empty one.
    pub fn db_id(&self) -> Option<&str> {
        self.field_value(DB_ID_FIELD).filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NoteFields {
    #[serde(rename = "Sentence")]
    pub sentence: String,
    #[serde(rename = "Translation")]
    pub translation: String,
    #[serde(rename = "Note")]
    pub note: String,
    #[serde(rename = "dbID")]
    pub db_id: String,
    #[serde(rename = "IPA")]
    pub ipa: String,
    #[serde(rename = "Audio")]
    pub audio: String,
}

/// Media AnkiConnect fetches and attaches while creating the note.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    pub url: String,
    pub filename: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteOptions {
    pub duplicate_scope: String,
}

impl Default for AddNoteOptions {
    fn default() -> Self {
        Self { duplicate_scope: "deck".to_string() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteParams {
    pub deck_name: String,
    pub model_name: String,
    pub fields: NoteFields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio: Vec<AudioAttachment>,
    #[serde(default)]
    pub options: AddNoteOptions,
}

/// Field patch for an existing note. Only changed fields are present.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpdateNoteParams {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CardTemplate {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Front")]
    pub front: String,
    #[serde(rename = "Back")]
    pub back: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub model_name: String,
    pub in_order_fields: Vec<String>,
    pub css: String,
    pub is_cloze: bool,
    pub card_templates: Vec<CardTemplate>,
}

/// Either a url AnkiConnect downloads itself or base64 data.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Url(String),
    Data(String),
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct StoreMediaParams {
    pub filename: String,
    #[serde(flatten)]
    pub source: MediaSource,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}
