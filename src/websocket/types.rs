use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Messages the web app sends over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ClientMessage {
    /// `payload` is the vocabulary array, either as JSON text or inline.
    Sync { payload: Value },
}

impl ClientMessage {
    pub fn into_payload(self) -> String {
        match self {
            ClientMessage::Sync { payload: Value::String(text) } => text,
            ClientMessage::Sync { payload } => payload.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum ServerMessage<'a> {
    Notification { message: &'a str },
}

#[derive(Clone)]
pub struct ConnectedClient {
    pub tx: mpsc::Sender<String>,
}

impl ConnectedClient {
    pub fn is_valid(&self) -> bool {
        !self.tx.is_closed() && self.tx.capacity() > 0
    }
}
