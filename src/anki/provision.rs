use std::fs;

use base64::{
    engine::general_purpose::STANDARD,
    Engine,
};
use log::info;

use super::{
    api::AnkiApi,
    types::{
        CardTemplate,
        MediaSource,
        ModelSpec,
        StoreMediaParams,
        AUDIO_FIELD,
        DB_ID_FIELD,
        IPA_FIELD,
        NOTE_FIELD,
        SENTENCE_FIELD,
        TRANSLATION_FIELD,
    },
};
use crate::{
    core::BridgeError,
    settings::BridgeSettings,
};

const CARD_CSS: &str = include_str!("../../assets/card.css");
pub const FONT_MEDIA_NAME: &str = "_Roboto.woff2";

fn template(name: &str, front: &str, back: &str) -> CardTemplate {
    CardTemplate { name: name.to_string(), front: front.to_string(), back: back.to_string() }
}

pub fn vocab_model_spec(model_name: &str) -> ModelSpec {
    ModelSpec {
        model_name: model_name.to_string(),
        in_order_fields: [
            SENTENCE_FIELD,
            AUDIO_FIELD,
            IPA_FIELD,
            TRANSLATION_FIELD,
            NOTE_FIELD,
            DB_ID_FIELD,
        ]
        .iter()
        .map(|f| f.to_string())
        .collect(),
        css: CARD_CSS.to_string(),
        is_cloze: false,
        card_templates: vec![
            template(
                "Basic",
                r#"<p class="sentence">{{Sentence}}</p><ul class="ipa">{{IPA}}</ul><div class="audio">{{Audio}}</div>"#,
                r#"{{FrontSide}}<hr id="answer"><p class="translation">{{Translation}}</p><p class="note">{{Note}}</p>"#,
            ),
            template(
                "Reverse",
                r#"<p class="translation">{{Translation}}</p>"#,
                r#"{{FrontSide}}<hr id="answer"><p class="sentence">{{Sentence}}</p><ul class="ipa">{{IPA}}</ul><p class="note">{{Note}}</p><div class="audio">{{Audio}}</div>"#,
            ),
            template(
                "Type",
                r#"<div class="input">{{type:Sentence}}</div><p class="translation">{{Translation}}</p><div class="audio">{{Audio}}</div>"#,
                r#"{{FrontSide}}<hr id="answer"><ul class="ipa">{{IPA}}</ul><p class="note">{{Note}}</p>"#,
            ),
        ],
    }
}

/// Makes sure the deck and the note type exist. Safe to call on every sync.
pub async fn ensure_provisioned(
    api: &dyn AnkiApi,
    settings: &BridgeSettings,
) -> Result<(), BridgeError> {
    let decks = api.deck_names().await?;
    if !decks.iter().any(|deck| deck == &settings.deck_name) {
        info!("[Provision] Creating deck {}", settings.deck_name);
        api.create_deck(&settings.deck_name).await?;
    }

    let models = api.model_names().await?;
    if models.iter().any(|model| model == &settings.model_name) {
        return Ok(());
    }

    info!("[Provision] Creating note type {}", settings.model_name);
    api.create_model(&vocab_model_spec(&settings.model_name)).await?;

    if let Some(font_path) = &settings.font_path {
        let font = fs::read(font_path).map_err(|e| {
            BridgeError::Custom(format!("Failed to read font {}: {}", font_path.display(), e))
        })?;
        api.store_media_file(&StoreMediaParams {
            filename: FONT_MEDIA_NAME.to_string(),
            source: MediaSource::Data(STANDARD.encode(font)),
        })
        .await?;
    }

    Ok(())
}
