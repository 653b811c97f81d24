use std::time::Duration;

use async_trait::async_trait;
use log::{
    info,
    warn,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{
    json,
    Value,
};
use tokio::time::sleep;

use super::types::{
    AddNoteParams,
    ApiResponse,
    ModelSpec,
    Note,
    StoreMediaParams,
    UpdateNoteParams,
};
use crate::core::AnkiError;

pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://127.0.0.1:8765";
const API_VERSION: u32 = 6;

/// Operations the sync engine needs from AnkiConnect.
#[async_trait]
pub trait AnkiApi: Send + Sync {
    async fn version(&self) -> Result<u32, AnkiError>;
    async fn deck_names(&self) -> Result<Vec<String>, AnkiError>;
    async fn create_deck(&self, deck: &str) -> Result<(), AnkiError>;
    async fn model_names(&self) -> Result<Vec<String>, AnkiError>;
    async fn create_model(&self, spec: &ModelSpec) -> Result<(), AnkiError>;
    async fn store_media_file(&self, params: &StoreMediaParams) -> Result<(), AnkiError>;
    async fn notes_info(&self, query: &str) -> Result<Vec<Note>, AnkiError>;
    async fn add_note(&self, note: &AddNoteParams) -> Result<u64, AnkiError>;
    async fn update_note_fields(&self, note: &UpdateNoteParams) -> Result<(), AnkiError>;
    async fn delete_notes(&self, note_ids: &[u64]) -> Result<(), AnkiError>;
    async fn delete_media_file(&self, filename: &str) -> Result<(), AnkiError>;
}

#[derive(Debug, Clone)]
pub struct AnkiClient {
    http: Client,
    url: String,
}

impl AnkiClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AnkiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url: url.into() })
    }

    pub async fn invoke<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<T, AnkiError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), Value::String(action.to_string()));
        body.insert("version".to_string(), Value::Number(API_VERSION.into()));

        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        let response = self.http.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AnkiError::Http(response.status()));
        }

        let response: ApiResponse<Value> = response.json().await?;
        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            return Err(AnkiError::Api(error));
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|source| AnkiError::Decode { action: action.to_string(), source })
    }
}

#[async_trait]
impl AnkiApi for AnkiClient {
    async fn version(&self) -> Result<u32, AnkiError> {
        self.invoke("version", None).await
    }

    async fn deck_names(&self) -> Result<Vec<String>, AnkiError> {
        self.invoke("deckNames", None).await
    }

    async fn create_deck(&self, deck: &str) -> Result<(), AnkiError> {
        let _: Value = self.invoke("createDeck", Some(json!({ "deck": deck }))).await?;
        Ok(())
    }

    async fn model_names(&self) -> Result<Vec<String>, AnkiError> {
        self.invoke("modelNames", None).await
    }

    async fn create_model(&self, spec: &ModelSpec) -> Result<(), AnkiError> {
        let params = serde_json::to_value(spec)
            .map_err(|source| AnkiError::Decode { action: "createModel".to_string(), source })?;
        let _: Value = self.invoke("createModel", Some(params)).await?;
        Ok(())
    }

    async fn store_media_file(&self, params: &StoreMediaParams) -> Result<(), AnkiError> {
        let params = serde_json::to_value(params)
            .map_err(|source| AnkiError::Decode { action: "storeMediaFile".to_string(), source })?;
        let _: Value = self.invoke("storeMediaFile", Some(params)).await?;
        Ok(())
    }

    async fn notes_info(&self, query: &str) -> Result<Vec<Note>, AnkiError> {
        self.invoke("notesInfo", Some(json!({ "query": query }))).await
    }

    async fn add_note(&self, note: &AddNoteParams) -> Result<u64, AnkiError> {
        self.invoke("addNote", Some(json!({ "note": note }))).await
    }

    async fn update_note_fields(&self, note: &UpdateNoteParams) -> Result<(), AnkiError> {
        let _: Value = self.invoke("updateNoteFields", Some(json!({ "note": note }))).await?;
        Ok(())
    }

    async fn delete_notes(&self, note_ids: &[u64]) -> Result<(), AnkiError> {
        let _: Value = self.invoke("deleteNotes", Some(json!({ "notes": note_ids }))).await?;
        Ok(())
    }

    async fn delete_media_file(&self, filename: &str) -> Result<(), AnkiError> {
        let _: Value =
            self.invoke("deleteMediaFile", Some(json!({ "filename": filename }))).await?;
        Ok(())
    }
}

/// Polls `version` until AnkiConnect answers or the attempts run out.
pub async fn wait_awake(api: &dyn AnkiApi, wait_time: Duration, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        match api.version().await {
            Ok(version) => {
                info!("AnkiConnect is online. Version: {}", version);
                return true;
            }
            Err(err) => {
                warn!(
                    "AnkiConnect attempt {} of {} failed. Retrying in {:?}... Error: {}",
                    attempt, max_attempts, wait_time, err
                );
                if attempt < max_attempts {
                    sleep(wait_time).await;
                }
            }
        }
    }
    false
}
