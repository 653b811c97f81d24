use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anki(#[from] AnkiError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("WebSocket send error: {0}")]
    WebSocketSend(String),

    #[error("BridgeError: {0}")]
    Custom(String),
}

impl<T> From<SendError<T>> for BridgeError {
    fn from(error: SendError<T>) -> Self {
        BridgeError::WebSocketSend(error.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(error: std::io::Error) -> Self {
        BridgeError::Io(Box::new(error))
    }
}

impl From<tungstenite::Error> for BridgeError {
    fn from(error: tungstenite::Error) -> Self {
        BridgeError::WebSocket(Box::new(error))
    }
}

/// Failure of a single AnkiConnect call. Never retried by the client itself.
#[derive(Error, Debug)]
pub enum AnkiError {
    #[error("AnkiConnect request failed: {0}")]
    Transport(Box<reqwest::Error>),

    #[error("AnkiConnect request failed: HTTP error {0}")]
    Http(reqwest::StatusCode),

    #[error("AnkiConnect request failed: {0}")]
    Api(String),

    #[error("AnkiConnect request failed: unexpected result for {action}: {source}")]
    Decode {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AnkiError {
    /// True when AnkiConnect answered and rejected the request. Transport and HTTP failures
    /// only mean Anki is not reachable right now.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AnkiError::Api(_))
    }
}

impl From<reqwest::Error> for AnkiError {
    fn from(error: reqwest::Error) -> Self {
        AnkiError::Transport(Box::new(error))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Add,
    Update,
    Delete,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Add => "add",
            SyncPhase::Update => "update",
            SyncPhase::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Fatal outcome of one sync attempt.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("AnkiConnect is unreachable: {0}")]
    Connectivity(#[source] AnkiError),

    #[error("failed to provision deck or note type: {0}")]
    Provisioning(#[source] BridgeError),

    #[error("failed to fetch existing notes: {0}")]
    Fetch(#[source] AnkiError),

    #[error("{phase} phase failed: {source}")]
    Apply {
        phase: SyncPhase,
        #[source]
        source: AnkiError,
    },

    #[error("invalid sync payload: {0}")]
    Payload(#[source] serde_json::Error),
}

impl SyncError {
    /// Message shown to the user when this error ends a sync.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::Connectivity(_) => {
                "Error: Anki is not running or AnkiConnect is not installed."
            }
            SyncError::Provisioning(_) => "Error: Failed to setup deck.",
            SyncError::Fetch(_) => "Error: Failed to fetch existing notes.",
            SyncError::Apply { phase: SyncPhase::Add, .. } => {
                "Error: Failed to add new notes. Sync was not completed."
            }
            SyncError::Apply { phase: SyncPhase::Update, .. } => {
                "Error: Failed to update existing notes. Sync was not completed."
            }
            SyncError::Apply { phase: SyncPhase::Delete, .. } => {
                "Error: Failed to delete obsolete notes. Sync was not completed."
            }
            SyncError::Payload(_) => "Error: Sync data could not be read.",
        }
    }
}
