use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub word: String,
    #[serde(rename = "IPA", alias = "phonetic", default)]
    pub phonetic: String, // Pronunciation, may or may not already be slash-wrapped
}

/// One unit of vocabulary content sent by the web app. Authoritative for every sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyItem {
    pub id: String,
    pub sentence: String,
    pub translation: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub pieces: Vec<Piece>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl VocabularyItem {
    pub fn note_or_empty(&self) -> &str {
        self.note.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub filename: String,
    pub url: String,
}

/// Parses a sync payload: a JSON array of vocabulary items.
pub fn parse_vocabulary(payload: &str) -> Result<Vec<VocabularyItem>, serde_json::Error> {
    serde_json::from_str(payload)
}
