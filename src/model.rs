//! Rows written to the tabular store.
//!
//! Field names follow the warehouse schema (camelCase columns), so a row is
//! simply the serde serialization of these structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{EpisodeEntry, Podcast};
use crate::identity::{episode_id, sanitize_title, show_id};

pub const SHOWS_TABLE: &str = "SHOWS";
pub const EPISODES_TABLE: &str = "EPISODES";
pub const AUDIO_TABLE: &str = "AUDIO";
pub const PEOPLE_TABLE: &str = "PEOPLE";

/// A podcast series, identified by its sanitized title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub id: String,
    pub title: String,
    pub sanitized_title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub rss_url: String,
    pub website_url: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Show {
    /// Build a show row for `title` from freshly parsed feed metadata
    pub fn from_feed(title: &str, rss_url: &str, podcast: &Podcast, now: DateTime<Utc>) -> Self {
        let sanitized_title = sanitize_title(title);
        Self {
            id: show_id(&sanitized_title),
            title: title.to_string(),
            sanitized_title,
            description: podcast.description.clone(),
            image_url: podcast.image_url.as_ref().map(|u| u.to_string()),
            rss_url: rss_url.to_string(),
            website_url: podcast.link.as_ref().map(|u| u.to_string()),
            language: podcast.language.clone(),
            tags: podcast.tags.clone(),
            last_updated: now,
        }
    }

    /// Copy descriptive fields from a newer version of the same show
    ///
    /// Identity (`id`, `sanitizedTitle`) is left untouched.
    pub fn refresh_from(&mut self, fresh: &Show) {
        self.title = fresh.title.clone();
        self.description = fresh.description.clone();
        self.image_url = fresh.image_url.clone();
        self.rss_url = fresh.rss_url.clone();
        self.website_url = fresh.website_url.clone();
        self.language = fresh.language.clone();
        self.tags = fresh.tags.clone();
        self.last_updated = fresh.last_updated;
    }
}

/// One installment of a show, keyed by `(showId, originalAudioUrl)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub show_id: String,
    pub title: String,
    pub sanitized_title: String,
    pub description: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub original_audio_url: String,
    pub audio_id: Option<String>,
}

impl Episode {
    /// Build an episode row (without audio) for a feed entry
    pub fn from_entry(show_id: &str, entry: &EpisodeEntry) -> Self {
        let original_audio_url = entry.enclosure.url.to_string();
        Self {
            id: episode_id(show_id, &original_audio_url),
            show_id: show_id.to_string(),
            title: entry.title.clone(),
            sanitized_title: sanitize_title(&entry.title),
            description: entry.description.clone(),
            published_date: entry.pub_date,
            duration_seconds: entry.duration_seconds,
            original_audio_url,
            audio_id: None,
        }
    }
}

/// A stored audio object backing exactly one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audio {
    pub id: String,
    pub gcs_bucket: String,
    pub gcs_object_path: String,
    /// Bytes actually transferred
    pub file_size: u64,
    /// `sha256:<hex>` of the transferred bytes
    pub content_hash: Option<String>,
}
