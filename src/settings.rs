use std::{
    path::PathBuf,
    time::Duration,
};

use log::warn;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    anki::api::DEFAULT_ANKI_CONNECT_URL,
    persistence,
};

pub const SETTINGS_FILE: &str = "settings.json";

/// How audio for new notes reaches Anki.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Note gets a `[sound:...]` reference now, the download scheduler fetches the file later.
    #[default]
    Deferred,
    /// AnkiConnect fetches the audio while creating the note.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub chunk_size: usize,
    pub initial_delay_ms: u64,
    pub between_chunks_delay_ms: u64,
    pub failure_backoff_ms: u64,
    pub max_chunk_attempts: u32, // 0 retries forever
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            initial_delay_ms: 500,
            between_chunks_delay_ms: 1_000,
            failure_backoff_ms: 10_000,
            max_chunk_attempts: 20,
        }
    }
}

impl DownloadSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn between_chunks_delay(&self) -> Duration {
        Duration::from_millis(self.between_chunks_delay_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub anki_connect_url: String,
    pub request_timeout_secs: u64,
    pub deck_name: String,
    pub model_name: String,
    pub font_path: Option<PathBuf>,
    pub audio_mode: AudioMode,
    pub websocket_addr: String,
    pub update_batch_size: usize,
    pub update_concurrency: usize,
    pub delete_batch_size: usize,
    pub downloads: DownloadSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            anki_connect_url: DEFAULT_ANKI_CONNECT_URL.to_string(),
            request_timeout_secs: 120,
            deck_name: "Vocab Builder".to_string(),
            model_name: "Custom: Vocab Builder".to_string(),
            font_path: None,
            audio_mode: AudioMode::Deferred,
            websocket_addr: "127.0.0.1:8766".to_string(),
            update_batch_size: 100,
            update_concurrency: 10,
            delete_batch_size: 100,
            downloads: DownloadSettings::default(),
        }
    }
}

impl BridgeSettings {
    /// Loads `settings.json` from the app data dir, writing the defaults on first run.
    pub fn load() -> Self {
        if !persistence::data_file_exists(SETTINGS_FILE) {
            let defaults = Self::default();
            if let Err(e) = persistence::save_json(&defaults, SETTINGS_FILE) {
                warn!("Failed to write default settings: {}", e);
            }
            return defaults;
        }

        persistence::load_json_or_default::<Self>(SETTINGS_FILE).sanitized()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Zero sizes would stall batching, so they are bumped to 1.
    pub fn sanitized(mut self) -> Self {
        for (name, value) in [
            ("update_batch_size", &mut self.update_batch_size),
            ("update_concurrency", &mut self.update_concurrency),
            ("delete_batch_size", &mut self.delete_batch_size),
            ("downloads.chunk_size", &mut self.downloads.chunk_size),
        ] {
            if *value == 0 {
                warn!("Setting {} must be at least 1, using 1", name);
                *value = 1;
            }
        }
        self
    }
}
