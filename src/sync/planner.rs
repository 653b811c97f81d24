use std::collections::{
    BTreeMap,
    HashMap,
    HashSet,
};

use log::warn;

use crate::{
    anki::types::{
        AddNoteOptions,
        AddNoteParams,
        AudioAttachment,
        Note,
        NoteFields,
        UpdateNoteParams,
        AUDIO_FIELD,
        IPA_FIELD,
        NOTE_FIELD,
        TRANSLATION_FIELD,
    },
    core::{
        fields::{
            extract_media_filename,
            filename_from_url,
            format_phonetic_field,
            is_audio_filename,
            media_reference,
        },
        DownloadItem,
        VocabularyItem,
    },
    settings::AudioMode,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_add: Vec<AddNoteParams>,
    pub to_update: Vec<UpdateNoteParams>,
    pub to_delete: Vec<u64>,
    pub media_to_delete: Vec<String>,
    pub to_download: Vec<DownloadItem>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_update.is_empty()
            && self.to_delete.is_empty()
            && self.media_to_delete.is_empty()
            && self.to_download.is_empty()
    }
}

/// Diffs vocabulary items against the notes already in the deck.
#[derive(Debug, Clone)]
pub struct Planner {
    deck_name: String,
    model_name: String,
    audio_mode: AudioMode,
}

impl Planner {
    pub fn new(
        deck_name: impl Into<String>,
        model_name: impl Into<String>,
        audio_mode: AudioMode,
    ) -> Self {
        Self { deck_name: deck_name.into(), model_name: model_name.into(), audio_mode }
    }

    pub fn plan(&self, items: &[VocabularyItem], existing_notes: &[Note]) -> SyncPlan {
        let mut notes_by_db_id: HashMap<&str, &Note> = HashMap::new();
        for note in existing_notes {
            if let Some(db_id) = note.db_id() {
                notes_by_db_id.insert(db_id, note);
            }
        }

        let mut plan = SyncPlan::default();
        let mut live_ids: HashSet<&str> = HashSet::new();

        for item in items {
            if !live_ids.insert(item.id.as_str()) {
                warn!("[Planner] Skipping duplicate vocabulary id {}", item.id);
                continue;
            }

            let ipa = format_phonetic_field(&item.pieces);
            match notes_by_db_id.get(item.id.as_str()) {
                None => self.plan_add(item, ipa, &mut plan),
                Some(note) => {
                    if let Some(update) = plan_update(item, &ipa, note) {
                        plan.to_update.push(update);
                    }
                }
            }
        }

        let is_live = |note: &Note| note.db_id().map_or(false, |db_id| live_ids.contains(db_id));

        // Filenames come from url tails, so unrelated notes can share one.
        let mut media_in_use: HashSet<String> = existing_notes
            .iter()
            .filter(|note| is_live(*note))
            .filter_map(audio_filename)
            .collect();
        for add in &plan.to_add {
            media_in_use.extend(extract_media_filename(&add.fields.audio));
            media_in_use.extend(add.audio.iter().map(|attachment| attachment.filename.clone()));
        }

        let mut deleted: HashSet<u64> = HashSet::new();
        for note in existing_notes {
            if is_live(note) || !deleted.insert(note.note_id) {
                continue;
            }
            plan.to_delete.push(note.note_id);

            if let Some(filename) = audio_filename(note) {
                if media_in_use.insert(filename.clone()) {
                    plan.media_to_delete.push(filename);
                }
            }
        }

        plan
    }

    fn plan_add(&self, item: &VocabularyItem, ipa: String, plan: &mut SyncPlan) {
        let audio = item
            .audio_url
            .as_deref()
            .and_then(|url| filename_from_url(url).map(|filename| (url, filename)))
            .filter(|(_, filename)| is_audio_filename(filename));

        let mut fields = NoteFields {
            sentence: item.sentence.clone(),
            translation: item.translation.clone(),
            note: item.note_or_empty().to_string(),
            db_id: item.id.clone(),
            ipa,
            audio: String::new(),
        };
        let mut attachments = Vec::new();

        if let Some((url, filename)) = audio {
            match self.audio_mode {
                AudioMode::Deferred => {
                    fields.audio = media_reference(&filename);
                    plan.to_download.push(DownloadItem { filename, url: url.to_string() });
                }
                AudioMode::Inline => attachments.push(AudioAttachment {
                    url: url.to_string(),
                    filename,
                    fields: vec![AUDIO_FIELD.to_string()],
                }),
            }
        }

        plan.to_add.push(AddNoteParams {
            deck_name: self.deck_name.clone(),
            model_name: self.model_name.clone(),
            fields,
            audio: attachments,
            options: AddNoteOptions::default(),
        });
    }
}

fn audio_filename(note: &Note) -> Option<String> {
    note.field_value(AUDIO_FIELD).and_then(extract_media_filename)
}

/// Only the fields whose stored value differs end up in the patch.
fn plan_update(item: &VocabularyItem, ipa: &str, note: &Note) -> Option<UpdateNoteParams> {
    let mut changed = BTreeMap::new();

    for (name, wanted) in [
        (TRANSLATION_FIELD, item.translation.as_str()),
        (NOTE_FIELD, item.note_or_empty()),
        (IPA_FIELD, ipa),
    ] {
        if note.field_value(name).unwrap_or_default() != wanted {
            changed.insert(name.to_string(), wanted.to_string());
        }
    }

    if changed.is_empty() {
        None
    } else {
        Some(UpdateNoteParams { id: note.note_id, fields: changed })
    }
}
