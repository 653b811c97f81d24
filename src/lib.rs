pub mod anki;
pub mod core;
pub mod downloads;
pub mod notify;
pub mod persistence;
pub mod settings;
pub mod sync;
pub mod websocket;

#[cfg(test)]
pub mod test_utils;

pub use crate::core::errors::BridgeError;
