use std::{
    fmt,
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    BridgeError,
    DownloadItem,
};

pub const CHUNK_KEY_PREFIX: &str = "toDownload_";
pub const QUARANTINE_KEY_PREFIX: &str = "quarantine_";
const VALUE_EXTENSION: &str = "json";

/// String key/value pairs, one file per key. Writes go through a temp file and a rename
/// so a crash never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{VALUE_EXTENSION}"))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), BridgeError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn keys(&self) -> Result<Vec<String>, BridgeError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }
}

/// `toDownload_<index>`. Ordered by index, so `toDownload_10` comes after `toDownload_2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    pub index: u64,
}

impl ChunkKey {
    pub fn parse(key: &str) -> Option<Self> {
        Self::parse_with_prefix(key, CHUNK_KEY_PREFIX)
    }

    fn parse_with_prefix(key: &str, prefix: &str) -> Option<Self> {
        let digits = key.strip_prefix(prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(|index| Self { index })
    }

    pub fn quarantine_key(&self) -> String {
        format!("{QUARANTINE_KEY_PREFIX}{}", self.index)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHUNK_KEY_PREFIX}{}", self.index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedChunk {
    pub items: Vec<DownloadItem>,
    /// Stored text of a chunk that could not be parsed into `items`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Pending media downloads persisted as numbered chunks.
#[derive(Debug, Clone)]
pub struct DownloadQueue {
    store: StateStore,
}

impl DownloadQueue {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Pending chunks, oldest first.
    pub fn pending(&self) -> Result<Vec<ChunkKey>, BridgeError> {
        let mut keys: Vec<ChunkKey> =
            self.store.keys()?.iter().filter_map(|key| ChunkKey::parse(key)).collect();
        keys.sort();
        Ok(keys)
    }

    pub fn quarantined(&self) -> Result<Vec<ChunkKey>, BridgeError> {
        let mut keys: Vec<ChunkKey> = self
            .store
            .keys()?
            .iter()
            .filter_map(|key| ChunkKey::parse_with_prefix(key, QUARANTINE_KEY_PREFIX))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn next_index(&self) -> Result<u64, BridgeError> {
        let highest = self.pending()?.into_iter().chain(self.quarantined()?).map(|k| k.index).max();
        Ok(highest.map_or(0, |index| index + 1))
    }

    /// Splits `items` into chunks of at most `chunk_size`, numbered after every existing chunk.
    pub fn push_chunks(
        &self,
        items: &[DownloadItem],
        chunk_size: usize,
    ) -> Result<Vec<ChunkKey>, BridgeError> {
        let mut index = self.next_index()?;
        let mut written = Vec::new();

        for chunk in items.chunks(chunk_size.max(1)) {
            let key = ChunkKey { index };
            self.store.set(&key.to_string(), &serde_json::to_string(chunk)?)?;
            written.push(key);
            index += 1;
        }

        Ok(written)
    }

    pub fn load(&self, key: ChunkKey) -> Result<Vec<DownloadItem>, BridgeError> {
        let value = self
            .store
            .get(&key.to_string())?
            .ok_or_else(|| BridgeError::Custom(format!("{key} is no longer persisted")))?;
        Ok(serde_json::from_str(&value)?)
    }

    pub fn remove(&self, key: ChunkKey) -> Result<(), BridgeError> {
        self.store.remove(&key.to_string())
    }

    /// Moves a chunk out of the pending set, keeping its items for inspection.
    pub fn quarantine(
        &self,
        key: ChunkKey,
        items: Vec<DownloadItem>,
        reason: &str,
    ) -> Result<(), BridgeError> {
        self.write_quarantine(key, items, None, reason)
    }

    /// Like [`DownloadQueue::quarantine`] for a chunk whose value does not parse.
    pub fn quarantine_unreadable(&self, key: ChunkKey, reason: &str) -> Result<(), BridgeError> {
        let raw = self.store.get(&key.to_string())?;
        self.write_quarantine(key, Vec::new(), raw, reason)
    }

    fn write_quarantine(
        &self,
        key: ChunkKey,
        items: Vec<DownloadItem>,
        raw: Option<String>,
        reason: &str,
    ) -> Result<(), BridgeError> {
        let record = QuarantinedChunk {
            items,
            raw,
            reason: reason.to_string(),
            quarantined_at: Utc::now(),
        };
        self.store.set(&key.quarantine_key(), &serde_json::to_string_pretty(&record)?)?;
        self.remove(key)
    }
}
