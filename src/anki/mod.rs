pub mod api;
pub mod provision;
pub mod types;

pub use api::{
    wait_awake,
    AnkiApi,
    AnkiClient,
};
pub use provision::ensure_provisioned;
pub use types::Note;
