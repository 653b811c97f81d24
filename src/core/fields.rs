use std::sync::OnceLock;

use regex::Regex;

use super::models::Piece;

pub const AUDIO_EXTENSION: &str = ".mp3";

fn sound_tag_regex() -> &'static Regex {
    static SOUND_TAG: OnceLock<Regex> = OnceLock::new();
    SOUND_TAG.get_or_init(|| Regex::new(r"\[sound:([^\]]+)\]").unwrap())
}

/// haɪ -> /haɪ/, /haɪ/ stays as is
pub fn wrap_with_slashes(phonetic: &str) -> String {
    let mut wrapped = String::with_capacity(phonetic.len() + 2);
    if !phonetic.starts_with('/') {
        wrapped.push('/');
    }
    wrapped.push_str(phonetic);
    if !wrapped.ends_with('/') {
        wrapped.push('/');
    }
    wrapped
}

/// Renders the IPA field as a run of `<li>` entries, one per piece.
pub fn format_phonetic_field(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|piece| format!("<li>{}: {}</li>", piece.word, wrap_with_slashes(&piece.phonetic)))
        .collect()
}

pub fn media_reference(filename: &str) -> String {
    format!("[sound:{}]", filename)
}

pub fn extract_media_filename(field_value: &str) -> Option<String> {
    sound_tag_regex().captures(field_value).map(|captures| captures[1].to_string())
}

/// Last non-empty path segment of the url, used as the media filename.
pub fn filename_from_url(url: &str) -> Option<String> {
    url.split('/').filter(|segment| !segment.is_empty()).last().map(str::to_string)
}

pub fn is_audio_filename(filename: &str) -> bool {
    filename.ends_with(AUDIO_EXTENSION)
}
