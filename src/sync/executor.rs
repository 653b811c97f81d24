use std::sync::Arc;

use futures::{
    stream,
    StreamExt,
    TryStreamExt,
};
use log::{
    error,
    info,
    warn,
};

use super::{
    planner::SyncPlan,
    SyncRun,
    SyncStage,
};
use crate::{
    anki::api::AnkiApi,
    core::{
        SyncError,
        SyncPhase,
    },
    downloads::DownloadScheduler,
    settings::BridgeSettings,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub media_deleted: usize,
    pub media_failures: Vec<String>,
    pub downloads_scheduled: usize,
    pub download_error: Option<String>,
}

impl ExecutionSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "{} notes added; {} notes updated; {} notes deleted.\nSync completed successfully!",
            self.added, self.updated, self.deleted
        );
        if self.downloads_scheduled > 0 {
            message.push_str(&format!(
                "\n{} audio files will be downloaded in the background.",
                self.downloads_scheduled
            ));
        }
        if !self.media_failures.is_empty() {
            message.push_str(&format!(
                "\nFailed to delete {} unused media files.",
                self.media_failures.len()
            ));
        }
        if let Some(e) = &self.download_error {
            message.push_str(&format!("\nAudio downloads could not be queued: {}", e));
        }
        message
    }
}

/// Applies a [`SyncPlan`]: adds, then updates, then note deletes, then media deletes.
pub struct Executor {
    api: Arc<dyn AnkiApi>,
    downloads: Arc<DownloadScheduler>,
    update_batch_size: usize,
    update_concurrency: usize,
    delete_batch_size: usize,
}

impl Executor {
    pub fn new(
        api: Arc<dyn AnkiApi>,
        downloads: Arc<DownloadScheduler>,
        settings: &BridgeSettings,
    ) -> Self {
        Self {
            api,
            downloads,
            update_batch_size: settings.update_batch_size.max(1),
            update_concurrency: settings.update_concurrency.max(1),
            delete_batch_size: settings.delete_batch_size.max(1),
        }
    }

    pub async fn execute(
        &self,
        plan: &SyncPlan,
        run: &mut SyncRun,
    ) -> Result<ExecutionSummary, SyncError> {
        let mut summary = ExecutionSummary::default();

        run.enter(SyncStage::Adding);
        for note in &plan.to_add {
            self.api.add_note(note).await.map_err(|source| {
                error!("[Sync {}] Adding note {} failed: {}", run.id, note.fields.db_id, source);
                SyncError::Apply { phase: SyncPhase::Add, source }
            })?;
            summary.added += 1;
        }

        run.enter(SyncStage::Updating);
        for batch in plan.to_update.chunks(self.update_batch_size) {
            let updates: Vec<_> =
                batch.iter().map(|update| self.api.update_note_fields(update)).collect();
            stream::iter(updates)
                .buffer_unordered(self.update_concurrency)
                .try_collect::<Vec<()>>()
                .await
                .map_err(|source| SyncError::Apply { phase: SyncPhase::Update, source })?;
            summary.updated += batch.len();
        }

        run.enter(SyncStage::Deleting);
        for batch in plan.to_delete.chunks(self.delete_batch_size) {
            self.api
                .delete_notes(batch)
                .await
                .map_err(|source| SyncError::Apply { phase: SyncPhase::Delete, source })?;
            summary.deleted += batch.len();
        }

        run.enter(SyncStage::DeletingMedia);
        for filename in &plan.media_to_delete {
            match self.api.delete_media_file(filename).await {
                Ok(()) => summary.media_deleted += 1,
                Err(e) => {
                    warn!("[Sync {}] Could not delete media {}: {}", run.id, filename, e);
                    summary.media_failures.push(filename.clone());
                }
            }
        }

        if !plan.to_download.is_empty() {
            run.enter(SyncStage::SchedulingDownloads);
            match self.downloads.enqueue(&plan.to_download) {
                Ok(_) => summary.downloads_scheduled = plan.to_download.len(),
                Err(e) => {
                    error!("[Sync {}] Persisting downloads failed: {}", run.id, e);
                    summary.download_error = Some(e.to_string());
                }
            }
        }

        info!(
            "[Sync {}] Applied: {} added, {} updated, {} deleted, {} media deleted",
            run.id, summary.added, summary.updated, summary.deleted, summary.media_deleted
        );
        Ok(summary)
    }
}
