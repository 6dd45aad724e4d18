//! Deterministic identifiers.
//!
//! Every id is a name-based UUID (v5, URL namespace), so the same show,
//! episode or audio object always maps to the same row id and object path
//! across runs.

use uuid::Uuid;

fn name_based_id(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
        .simple()
        .to_string()
}

/// Id of a show, derived from its slug
pub fn show_id(show_slug: &str) -> String {
    name_based_id(&format!("urn:podingest:shows/{show_slug}"))
}

/// Id of an episode, derived from its owning show and source audio URL
pub fn episode_id(show_id: &str, original_audio_url: &str) -> String {
    name_based_id(&format!(
        "urn:podingest:shows/{show_id}/episodes/{original_audio_url}"
    ))
}

/// Id of the audio object backing an episode
pub fn audio_id(episode_id: &str) -> String {
    name_based_id(&format!("urn:podingest:episodes/{episode_id}/audio"))
}
