use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreError;
use crate::feed::{EpisodeEntry, Podcast};
use crate::metadata::MetadataWriter;
use crate::model::{Episode, Show};

/// The show an ingestion writes under
#[derive(Debug, Clone)]
pub struct ResolvedShow {
    pub show: Show,
    /// No row with this slug existed before
    pub is_new: bool,
}

/// A feed entry chosen for ingestion, with the row it would become
#[derive(Debug, Clone)]
pub struct PlannedEpisode {
    pub entry: EpisodeEntry,
    pub episode: Episode,
}

/// What an ingestion will do with the candidate episodes
#[derive(Debug, Clone, Default)]
pub struct IngestPlan {
    /// Episodes with no stored row, in feed order
    pub to_ingest: Vec<PlannedEpisode>,
    /// Episodes already stored for this show
    pub already_present: Vec<PlannedEpisode>,
    /// Repeated audio URLs dropped from the candidates
    pub duplicates_in_feed: usize,
    /// Number of entries in the feed
    pub total_episodes: usize,
}

/// Reuse the stored show for `title`, refreshed from the feed, or build a new one
///
/// Nothing is written here.
pub async fn resolve_show(
    writer: &MetadataWriter,
    title: &str,
    rss_url: &str,
    podcast: &Podcast,
    now: DateTime<Utc>,
) -> Result<ResolvedShow, StoreError> {
    let fresh = Show::from_feed(title, rss_url, podcast, now);

    match writer.find_show_by_slug(&fresh.sanitized_title).await? {
        Some(mut stored) => {
            stored.refresh_from(&fresh);
            Ok(ResolvedShow {
                show: stored,
                is_new: false,
            })
        }
        None => Ok(ResolvedShow {
            show: fresh,
            is_new: true,
        }),
    }
}

/// Take the first `limit` entries and drop repeated audio URLs
///
/// Returns the candidates in feed order plus the number of dropped repeats.
pub fn select_candidates(episodes: &[EpisodeEntry], limit: usize) -> (Vec<EpisodeEntry>, usize) {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut duplicates = 0;

    for entry in episodes.iter().take(limit) {
        if seen.insert(entry.enclosure.url.as_str()) {
            candidates.push(entry.clone());
        } else {
            duplicates += 1;
        }
    }

    (candidates, duplicates)
}

/// Classify the first `limit` feed entries as new or already stored
pub async fn create_ingest_plan(
    writer: &MetadataWriter,
    show: &Show,
    episodes: &[EpisodeEntry],
    limit: usize,
) -> Result<IngestPlan, StoreError> {
    let (candidates, duplicates_in_feed) = select_candidates(episodes, limit);
    if duplicates_in_feed > 0 {
        debug!(
            show = %show.sanitized_title,
            duplicates = duplicates_in_feed,
            "dropped repeated audio URLs"
        );
    }

    let mut plan = IngestPlan {
        duplicates_in_feed,
        total_episodes: episodes.len(),
        ..Default::default()
    };

    for entry in candidates {
        let episode = Episode::from_entry(&show.id, &entry);
        let is_stored = writer
            .episode_exists(&show.id, &episode.original_audio_url)
            .await?;

        let planned = PlannedEpisode { entry, episode };
        if is_stored {
            plan.already_present.push(planned);
        } else {
            plan.to_ingest.push(planned);
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feed::Enclosure;
    use crate::store::MemoryTabularStore;
    use url::Url;

    fn make_entry(title: &str, url: &str) -> EpisodeEntry {
        EpisodeEntry {
            title: title.to_string(),
            description: None,
            pub_date: None,
            duration_seconds: None,
            enclosure: Enclosure {
                url: Url::parse(url).unwrap(),
                length: None,
                mime_type: Some("audio/mpeg".to_string()),
            },
        }
    }

    fn make_podcast(episodes: Vec<EpisodeEntry>) -> Podcast {
        Podcast {
            title: "Feed Title".to_string(),
            description: Some("About things".to_string()),
            link: None,
            image_url: None,
            language: Some("en".to_string()),
            tags: vec![],
            feed_url: Url::parse("https://example.com/feed.xml").unwrap(),
            episodes,
        }
    }

    fn writer() -> MetadataWriter {
        MetadataWriter::new(Arc::new(MemoryTabularStore::new()))
    }

    #[test]
    fn select_respects_limit_in_feed_order() {
        let episodes: Vec<_> = (1..=5)
            .map(|i| make_entry(&format!("Ep {i}"), &format!("https://example.com/{i}.mp3")))
            .collect();

        let (candidates, duplicates) = select_candidates(&episodes, 2);

        assert_eq!(duplicates, 0);
        let titles: Vec<_> = candidates.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Ep 1", "Ep 2"]);
    }

    #[test]
    fn select_keeps_first_of_repeated_urls() {
        let episodes = vec![
            make_entry("Original", "https://example.com/a.mp3"),
            make_entry("Repost", "https://example.com/a.mp3"),
            make_entry("Other", "https://example.com/b.mp3"),
        ];

        let (candidates, duplicates) = select_candidates(&episodes, 10);

        assert_eq!(duplicates, 1);
        let titles: Vec<_> = candidates.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Original", "Other"]);
    }

    #[test]
    fn select_with_short_feed_takes_everything() {
        let episodes = vec![make_entry("Only", "https://example.com/a.mp3")];
        let (candidates, _) = select_candidates(&episodes, 10);
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn resolve_creates_new_show() {
        let podcast = make_podcast(vec![]);
        let resolved = resolve_show(
            &writer(),
            "All In",
            "https://example.com/feed.xml",
            &podcast,
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(resolved.is_new);
        assert_eq!(resolved.show.sanitized_title, "all-in");
    }

    #[tokio::test]
    async fn resolve_reuses_stored_show() {
        let writer = writer();
        let now = Utc::now();
        let stored = Show::from_feed(
            "All In",
            "https://old.example.com/feed.xml",
            &make_podcast(vec![]),
            now,
        );
        writer.upsert_show(&stored).await.unwrap();

        let resolved = resolve_show(
            &writer,
            "All In!",
            "https://example.com/feed.xml",
            &make_podcast(vec![]),
            now,
        )
        .await
        .unwrap();

        assert!(!resolved.is_new);
        assert_eq!(resolved.show.id, stored.id);
        assert_eq!(resolved.show.rss_url, "https://example.com/feed.xml");
    }

    #[tokio::test]
    async fn plan_skips_stored_episodes() {
        let writer = writer();
        let show = Show::from_feed(
            "All In",
            "https://example.com/feed.xml",
            &make_podcast(vec![]),
            Utc::now(),
        );
        let episodes = vec![
            make_entry("Ep 1", "https://example.com/1.mp3"),
            make_entry("Ep 2", "https://example.com/2.mp3"),
        ];

        let mut stored = Episode::from_entry(&show.id, &episodes[0]);
        stored.audio_id = Some("audio".to_string());
        writer.insert_episode(&stored).await.unwrap();

        let plan = create_ingest_plan(&writer, &show, &episodes, 10).await.unwrap();

        assert_eq!(plan.total_episodes, 2);
        assert_eq!(plan.already_present.len(), 1);
        assert_eq!(plan.already_present[0].entry.title, "Ep 1");
        assert_eq!(plan.to_ingest.len(), 1);
        assert_eq!(plan.to_ingest[0].episode.title, "Ep 2");
        assert_eq!(plan.to_ingest[0].episode.show_id, show.id);
    }
}
