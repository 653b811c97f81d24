use std::{
    env,
    fs,
    path::PathBuf,
};

use log::{
    debug,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::BridgeError;

const APP_NAME: &str = "vocab-bridge";
pub const DATA_DIR_ENV: &str = "VOCAB_BRIDGE_DATA_DIR";

pub fn get_app_data_dir() -> PathBuf {
    let app_dir = match env::var_os(DATA_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => match dirs::data_local_dir() {
            Some(data_dir) => data_dir.join(APP_NAME),
            None => PathBuf::from("."),
        },
    };
    let _ = fs::create_dir_all(&app_dir);
    app_dir
}

pub fn get_data_file_path(filename: &str) -> PathBuf {
    get_app_data_dir().join(filename)
}

/// Directory holding the durable download queue.
pub fn get_state_dir() -> PathBuf {
    get_app_data_dir().join("state")
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<(), BridgeError> {
    let file_path = get_data_file_path(filename);
    let json = serde_json::to_string_pretty(data)?;
    fs::write(&file_path, json)?;
    debug!("Data saved to: {}", file_path.display());
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> Result<T, BridgeError> {
    let file_path = get_data_file_path(filename);

    if !file_path.exists() {
        return Ok(T::default());
    }

    let json = fs::read_to_string(&file_path)?;
    let data: T = serde_json::from_str(&json)?;
    debug!("Data loaded from: {}", file_path.display());
    Ok(data)
}

pub fn load_json_or_default<T: for<'de> Deserialize<'de> + Default>(filename: &str) -> T {
    match load_json::<T>(filename) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to load {}: {}. Using defaults.", filename, e);
            T::default()
        }
    }
}

pub fn data_file_exists(filename: &str) -> bool {
    get_data_file_path(filename).exists()
}
