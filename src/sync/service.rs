use std::sync::Arc;

use log::{
    error,
    info,
};
use serde::Serialize;
use uuid::Uuid;

use super::{
    executor::{
        ExecutionSummary,
        Executor,
    },
    planner::Planner,
    SyncRun,
    SyncStage,
};
use crate::{
    anki::{
        api::AnkiApi,
        provision::ensure_provisioned,
    },
    core::{
        models::parse_vocabulary,
        SyncError,
    },
    downloads::DownloadScheduler,
    notify::Notifier,
    settings::BridgeSettings,
};

/// Immediate answer to a sync request. Completion is reported through the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncAck {
    pub syncing: bool,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub id: Uuid,
    pub stages: Vec<SyncStage>,
    pub result: Result<ExecutionSummary, SyncError>,
}

pub struct SyncService {
    api: Arc<dyn AnkiApi>,
    settings: BridgeSettings,
    planner: Planner,
    executor: Executor,
    notifier: Arc<dyn Notifier>,
    // Overlapping requests wait here and run one after another.
    in_progress: tokio::sync::Mutex<()>,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn AnkiApi>,
        downloads: Arc<DownloadScheduler>,
        notifier: Arc<dyn Notifier>,
        settings: BridgeSettings,
    ) -> Arc<Self> {
        let planner =
            Planner::new(&settings.deck_name, &settings.model_name, settings.audio_mode);
        let executor = Executor::new(api.clone(), downloads, &settings);
        Arc::new(Self {
            api,
            settings,
            planner,
            executor,
            notifier,
            in_progress: tokio::sync::Mutex::new(()),
        })
    }

    /// Acknowledges right away and runs the sync in the background.
    pub fn sync(self: &Arc<Self>, payload: String) -> SyncAck {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.handle_sync(&payload).await;
        });
        SyncAck { syncing: true }
    }

    /// Runs one sync to completion and notifies the user of the result.
    pub async fn handle_sync(&self, payload: &str) -> SyncOutcome {
        let _guard = self.in_progress.lock().await;
        let mut run = SyncRun::new();

        let result = self.run(payload, &mut run).await;
        match &result {
            Ok(summary) => {
                run.enter(SyncStage::Done);
                self.notifier.notify(&summary.message());
            }
            Err(e) => {
                error!("[Sync {}] {}", run.id, e);
                run.enter(SyncStage::Failed(e.to_string()));
                self.notifier.notify(e.user_message());
            }
        }

        SyncOutcome { id: run.id, stages: run.stages, result }
    }

    async fn run(&self, payload: &str, run: &mut SyncRun) -> Result<ExecutionSummary, SyncError> {
        let items = parse_vocabulary(payload).map_err(SyncError::Payload)?;
        info!("[Sync {}] Received {} vocabulary items", run.id, items.len());

        run.enter(SyncStage::Verifying);
        self.api.version().await.map_err(SyncError::Connectivity)?;

        run.enter(SyncStage::Provisioning);
        ensure_provisioned(self.api.as_ref(), &self.settings)
            .await
            .map_err(SyncError::Provisioning)?;

        run.enter(SyncStage::Fetching);
        let query = format!("deck:\"{}\"", self.settings.deck_name.replace('"', "\\\""));
        let existing = self.api.notes_info(&query).await.map_err(SyncError::Fetch)?;

        run.enter(SyncStage::Planning);
        let plan = self.planner.plan(&items, &existing);
        info!(
            "[Sync {}] Plan: {} to add, {} to update, {} to delete, {} to download",
            run.id,
            plan.to_add.len(),
            plan.to_update.len(),
            plan.to_delete.len(),
            plan.to_download.len()
        );

        self.executor.execute(&plan, run).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tempfile::{
        tempdir,
        TempDir,
    };

    use super::*;
    use crate::{
        core::SyncPhase,
        downloads::{
            DownloadQueue,
            StateStore,
        },
        settings::DownloadSettings,
        test_utils::{
            vocab_fields,
            FakeAnki,
            RecordingNotifier,
        },
    };

    struct Harness {
        dir: TempDir,
        anki: Arc<FakeAnki>,
        notifier: Arc<RecordingNotifier>,
        service: Arc<SyncService>,
    }

    fn harness_with(anki: FakeAnki) -> Harness {
        let dir = tempdir().unwrap();
        let anki = Arc::new(anki);
        let notifier = Arc::new(RecordingNotifier::default());
        let settings = BridgeSettings {
            downloads: DownloadSettings { initial_delay_ms: 60_000, ..DownloadSettings::default() },
            ..BridgeSettings::default()
        };
        let downloads = DownloadScheduler::new(
            anki.clone(),
            DownloadQueue::new(StateStore::open(dir.path()).unwrap()),
            notifier.clone(),
            settings.downloads.clone(),
        );
        let service = SyncService::new(anki.clone(), downloads, notifier.clone(), settings);
        Harness { dir, anki, notifier, service }
    }

    fn harness() -> Harness {
        harness_with(FakeAnki::new())
    }

    fn payload(items: serde_json::Value) -> String {
        items.to_string()
    }

    #[tokio::test]
    async fn first_sync_creates_notes_and_queues_audio() {
        let h = harness();
        let body = payload(json!([{
            "id": "a1",
            "sentence": "Hi",
            "translation": "Hola",
            "note": null,
            "pieces": [{ "word": "Hi", "IPA": "haɪ" }],
            "audioUrl": "https://x/y/a1.mp3"
        }]));

        let outcome = h.service.handle_sync(&body).await;

        let summary = outcome.result.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.downloads_scheduled, 1);
        let note = h.anki.note_by_db_id("a1").unwrap();
        assert_eq!(note.field_value("IPA"), Some("<li>Hi: /haɪ/</li>"));
        assert_eq!(note.field_value("Audio"), Some("[sound:a1.mp3]"));
        let queue = DownloadQueue::new(StateStore::open(h.dir.path()).unwrap());
        assert_eq!(queue.pending().unwrap().len(), 1);
        assert_eq!(outcome.stages.last(), Some(&SyncStage::Done));
        let message = &h.notifier.messages()[0];
        assert!(message.starts_with("1 notes added; 0 notes updated; 0 notes deleted."));
    }

    #[tokio::test]
    async fn second_sync_updates_and_deletes() {
        let h = harness();
        h.anki.insert_note(&vocab_fields("a1", "Hola", "", "", ""));
        h.anki.insert_note(&vocab_fields("gone", "x", "", "", "[sound:gone.mp3]"));
        let body = payload(json!([{ "id": "a1", "sentence": "Hi", "translation": "Hello" }]));

        let summary = h.service.handle_sync(&body).await.result.unwrap();

        assert_eq!((summary.added, summary.updated, summary.deleted), (0, 1, 1));
        assert_eq!(summary.media_deleted, 1);
        assert_eq!(h.anki.note_by_db_id("a1").unwrap().field_value("Translation"), Some("Hello"));
        assert!(h.anki.note_by_db_id("gone").is_none());
    }

    #[tokio::test]
    async fn unreachable_anki_is_reported_distinctly() {
        let h = harness();
        h.anki.set_offline(true);

        let outcome = h.service.handle_sync("[]").await;

        assert!(matches!(outcome.result, Err(SyncError::Connectivity(_))));
        assert_eq!(
            h.notifier.messages(),
            vec!["Error: Anki is not running or AnkiConnect is not installed."]
        );
        assert!(matches!(outcome.stages.last(), Some(SyncStage::Failed(_))));
    }

    #[tokio::test]
    async fn provisioning_and_fetch_failures_stop_the_sync() {
        let h = harness();
        h.anki.fail("createDeck", "*");
        let outcome = h.service.handle_sync("[]").await;
        assert!(matches!(outcome.result, Err(SyncError::Provisioning(_))));

        let h = harness();
        h.anki.fail("notesInfo", "*");
        let outcome = h.service.handle_sync("[]").await;
        assert!(matches!(outcome.result, Err(SyncError::Fetch(_))));
        assert_eq!(h.notifier.messages(), vec!["Error: Failed to fetch existing notes."]);
    }

    #[tokio::test]
    async fn add_failure_leaves_updates_and_deletes_unapplied() {
        let h = harness();
        h.anki.insert_note(&vocab_fields("keep", "old", "", "", ""));
        h.anki.insert_note(&vocab_fields("gone", "x", "", "", ""));
        h.anki.fail("addNote", "n2");
        let body = payload(json!([
            { "id": "keep", "sentence": "s", "translation": "new" },
            { "id": "n1", "sentence": "s", "translation": "t" },
            { "id": "n2", "sentence": "s", "translation": "t" },
            { "id": "n3", "sentence": "s", "translation": "t" }
        ]));

        let outcome = h.service.handle_sync(&body).await;

        assert!(matches!(outcome.result, Err(SyncError::Apply { phase: SyncPhase::Add, .. })));
        assert_eq!(h.anki.note_by_db_id("keep").unwrap().field_value("Translation"), Some("old"));
        assert!(h.anki.note_by_db_id("gone").is_some());
        assert!(h.anki.note_by_db_id("n3").is_none());
        assert_eq!(
            h.notifier.messages(),
            vec!["Error: Failed to add new notes. Sync was not completed."]
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_reported() {
        let h = harness();

        let outcome = h.service.handle_sync("{not json").await;

        assert!(matches!(outcome.result, Err(SyncError::Payload(_))));
        assert!(h.anki.snapshot().calls.is_empty());
    }

    #[tokio::test]
    async fn sync_acknowledges_before_completion() {
        let h = harness();

        let body = payload(json!([{ "id": "a1", "sentence": "s", "translation": "t" }]));
        let ack = h.service.sync(body);
        assert_eq!(ack, SyncAck { syncing: true });

        for _ in 0..200 {
            if !h.notifier.messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.anki.note_by_db_id("a1").is_some());
    }

    #[tokio::test]
    async fn overlapping_syncs_run_one_at_a_time() {
        let h = harness_with(FakeAnki::with_update_delay(Duration::from_millis(20)));
        h.anki.insert_note(&vocab_fields("a1", "old", "", "", ""));
        let body = payload(json!([{ "id": "a1", "sentence": "s", "translation": "new" }]));

        let (first, second) =
            tokio::join!(h.service.handle_sync(&body), h.service.handle_sync(&body));

        let updated = [first, second].map(|o| o.result.unwrap().updated);
        assert_eq!(updated.iter().sum::<usize>(), 1);
    }
}
