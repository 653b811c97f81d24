use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use log::{
    debug,
    error,
    info,
    warn,
};
use tokio::{
    task::JoinHandle,
    time::sleep,
};

use super::store::{
    ChunkKey,
    DownloadQueue,
};
use crate::{
    anki::{
        api::AnkiApi,
        types::{
            MediaSource,
            StoreMediaParams,
        },
    },
    core::{
        AnkiError,
        BridgeError,
        DownloadItem,
    },
    notify::Notifier,
    settings::DownloadSettings,
};

pub const DOWNLOADS_COMPLETE_MESSAGE: &str = "Audio downloads completed successfully!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// Nothing persisted, no follow-up scheduled.
    Idle,
    ChunkStored { key: ChunkKey, remaining: usize },
    /// Last pending chunk stored, completion notified.
    Drained { key: ChunkKey },
    /// Chunk left in place for a retry after the failure backoff.
    ChunkFailed { key: ChunkKey, attempts: u32 },
    /// AnkiConnect could not be reached. Retried after the backoff without counting an attempt.
    AnkiUnavailable { key: ChunkKey },
    Quarantined { key: ChunkKey, remaining: usize },
}

struct Alarm {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Drains persisted download chunks one wake-up at a time.
///
/// At most one alarm is pending and at most one chunk is being downloaded. All progress
/// lives in the [`DownloadQueue`], so a fresh process picks up where a dead one stopped
/// via [`DownloadScheduler::on_process_restart`].
pub struct DownloadScheduler {
    api: Arc<dyn AnkiApi>,
    queue: DownloadQueue,
    notifier: Arc<dyn Notifier>,
    settings: DownloadSettings,
    alarm: Mutex<Option<Alarm>>,
    next_generation: Mutex<u64>,
    drain_lock: tokio::sync::Mutex<()>,
    failures: Mutex<HashMap<ChunkKey, u32>>, // consecutive failures, reset on restart
}

impl DownloadScheduler {
    pub fn new(
        api: Arc<dyn AnkiApi>,
        queue: DownloadQueue,
        notifier: Arc<dyn Notifier>,
        settings: DownloadSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            queue,
            notifier,
            settings,
            alarm: Mutex::new(None),
            next_generation: Mutex::new(0),
            drain_lock: tokio::sync::Mutex::new(()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    /// Persists `items` as chunks and makes sure a wake-up is coming. Returns the chunk count.
    pub fn enqueue(self: &Arc<Self>, items: &[DownloadItem]) -> Result<usize, BridgeError> {
        if items.is_empty() {
            return Ok(0);
        }

        let keys = self.queue.push_chunks(items, self.settings.chunk_size)?;
        info!("[Downloads] Queued {} files in {} chunks", items.len(), keys.len());

        if !self.has_pending_alarm() {
            self.schedule(self.settings.initial_delay());
        }
        Ok(keys.len())
    }

    /// Resumes draining after the process comes back up. Returns the pending chunk count.
    pub fn on_process_restart(self: &Arc<Self>) -> Result<usize, BridgeError> {
        let pending = self.queue.pending()?;
        if !pending.is_empty() {
            info!("[Downloads] Resuming {} pending chunks", pending.len());
            self.schedule(self.settings.initial_delay());
        }
        Ok(pending.len())
    }

    pub fn has_pending_alarm(&self) -> bool {
        self.alarm.lock().unwrap().as_ref().map_or(false, |alarm| !alarm.handle.is_finished())
    }

    /// Replaces any pending wake-up with one after `delay`.
    fn schedule(self: &Arc<Self>, delay: Duration) {
        let generation = {
            let mut next = self.next_generation.lock().unwrap();
            *next += 1;
            *next
        };

        let this = Arc::clone(self);
        let mut alarm = self.alarm.lock().unwrap();
        if let Some(pending) = alarm.take() {
            pending.handle.abort();
        }

        debug!("[Downloads] Wake-up scheduled in {:?}", delay);
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            this.alarm_fired(generation);
            if let Err(e) = this.on_wake_up().await {
                error!("[Downloads] Wake-up failed: {}", e);
            }
        });
        *alarm = Some(Alarm { generation, handle });
    }

    fn alarm_fired(&self, generation: u64) {
        let mut alarm = self.alarm.lock().unwrap();
        if alarm.as_ref().map_or(false, |pending| pending.generation == generation) {
            *alarm = None;
        }
    }

    /// Processes the oldest pending chunk and schedules whatever comes next.
    pub async fn on_wake_up(self: &Arc<Self>) -> Result<WakeOutcome, BridgeError> {
        let _drain = self.drain_lock.lock().await;

        let pending = match self.queue.pending() {
            Ok(pending) => pending,
            Err(e) => {
                self.schedule(self.settings.failure_backoff());
                return Err(e);
            }
        };
        let Some(&key) = pending.first() else {
            return Ok(WakeOutcome::Idle);
        };
        let remaining = pending.len() - 1;

        let items = match self.queue.load(key) {
            Ok(items) => items,
            Err(BridgeError::Json(e)) => {
                let reason = format!("unreadable chunk: {e}");
                return self.quarantine(key, None, &reason, remaining);
            }
            Err(e) => {
                self.schedule(self.settings.failure_backoff());
                return Err(e);
            }
        };

        if let Err((error, reason)) = self.download_chunk(&items).await {
            if !error.is_rejection() {
                warn!(
                    "[Downloads] AnkiConnect unavailable while storing {}: {}. Retrying in {:?}",
                    key,
                    reason,
                    self.settings.failure_backoff()
                );
                self.schedule(self.settings.failure_backoff());
                return Ok(WakeOutcome::AnkiUnavailable { key });
            }

            let attempts = self.record_failure(key);
            let limit = self.settings.max_chunk_attempts;
            if limit > 0 && attempts >= limit {
                return self.quarantine(key, Some(items), &reason, remaining);
            }

            warn!(
                "[Downloads] {} failed (attempt {}): {}. Retrying in {:?}",
                key,
                attempts,
                reason,
                self.settings.failure_backoff()
            );
            self.schedule(self.settings.failure_backoff());
            return Ok(WakeOutcome::ChunkFailed { key, attempts });
        }

        self.failures.lock().unwrap().remove(&key);
        if let Err(e) = self.queue.remove(key) {
            self.schedule(self.settings.failure_backoff());
            return Err(e);
        }
        info!("[Downloads] {} stored ({} files), {} chunks left", key, items.len(), remaining);

        if remaining > 0 {
            self.schedule(self.settings.between_chunks_delay());
            Ok(WakeOutcome::ChunkStored { key, remaining })
        } else {
            self.notifier.notify(DOWNLOADS_COMPLETE_MESSAGE);
            Ok(WakeOutcome::Drained { key })
        }
    }

    /// Stores every item in order, stopping at the first failure.
    async fn download_chunk(&self, items: &[DownloadItem]) -> Result<(), (AnkiError, String)> {
        for item in items {
            let params = StoreMediaParams {
                filename: item.filename.clone(),
                source: MediaSource::Url(item.url.clone()),
            };
            if let Err(e) = self.api.store_media_file(&params).await {
                let reason = format!("{} ({}): {}", item.filename, item.url, e);
                return Err((e, reason));
            }
        }
        Ok(())
    }

    fn record_failure(&self, key: ChunkKey) -> u32 {
        let mut failures = self.failures.lock().unwrap();
        let attempts = failures.entry(key).or_insert(0);
        *attempts += 1;
        *attempts
    }

    /// `items` is `None` when the chunk could not be parsed; its raw text is kept instead.
    fn quarantine(
        self: &Arc<Self>,
        key: ChunkKey,
        items: Option<Vec<DownloadItem>>,
        reason: &str,
        remaining: usize,
    ) -> Result<WakeOutcome, BridgeError> {
        self.failures.lock().unwrap().remove(&key);

        let message = match &items {
            Some(items) => format!(
                "Error: Gave up downloading {} audio files. Last error: {}",
                items.len(),
                reason
            ),
            None => format!("Error: Gave up on unreadable download data. Last error: {}", reason),
        };
        let stored = match items {
            Some(items) => self.queue.quarantine(key, items, reason),
            None => self.queue.quarantine_unreadable(key, reason),
        };
        if let Err(e) = stored {
            self.schedule(self.settings.failure_backoff());
            return Err(e);
        }
        error!("[Downloads] Gave up on {}: {}", key, reason);
        self.notifier.notify(&message);

        if remaining > 0 {
            self.schedule(self.settings.between_chunks_delay());
        }
        Ok(WakeOutcome::Quarantined { key, remaining })
    }
}
