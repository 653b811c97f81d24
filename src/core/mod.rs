pub mod errors;
pub mod fields;
pub mod models;

pub use errors::{
    AnkiError,
    BridgeError,
    SyncError,
    SyncPhase,
};
pub use models::{
    DownloadItem,
    Piece,
    VocabularyItem,
};
