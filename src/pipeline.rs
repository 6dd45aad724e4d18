// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{IngestOptions, PodcastCatalog};
use crate::episode::{AudioMaterializer, TransferContext};
use crate::error::{EpisodeError, IngestError};
use crate::feed::fetch_feed;
use crate::http::HttpClient;
use crate::metadata::MetadataWriter;
use crate::model::{Audio, Show};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::resolve::{PlannedEpisode, create_ingest_plan, resolve_show};
use crate::store::{ObjectStore, TabularStore};

/// A validated request to ingest the newest episodes of one podcast
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Name as configured in the podcast table
    pub podcast_name: String,
    /// Cap on the number of feed entries considered
    pub num_episodes: usize,
    /// Episodes not started by this instant are left for a later run
    pub deadline: Option<Instant>,
}

impl IngestRequest {
    pub fn new(podcast_name: impl Into<String>, num_episodes: usize) -> Self {
        Self {
            podcast_name: podcast_name.into(),
            num_episodes,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Why an episode was not stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeFailure {
    pub title: String,
    pub original_audio_url: String,
    /// `download`, `upload` or `metadata`
    pub stage: &'static str,
    pub reason: String,
}

/// Outcome of a request that got past fetching and resolution
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub podcast_name: String,
    pub show_id: String,
    pub show_title: String,
    /// The show row was created by this request
    pub show_created: bool,
    pub processed: usize,
    /// Candidates already stored before this request
    pub skipped: usize,
    pub failed: Vec<EpisodeFailure>,
    /// Candidates left alone because the deadline passed
    pub not_attempted: usize,
}

impl IngestSummary {
    pub fn message(&self) -> String {
        format!(
            "Successfully processed {} episodes for '{}'.",
            self.processed, self.podcast_name
        )
    }

    /// Something was attempted and nothing succeeded
    pub fn all_failed(&self) -> bool {
        self.processed == 0 && !self.failed.is_empty()
    }
}

/// Response payload for the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
}

impl From<&IngestSummary> for IngestResponse {
    fn from(summary: &IngestSummary) -> Self {
        Self {
            message: summary.message(),
        }
    }
}

enum EpisodeOutcome {
    Stored,
    Failed(EpisodeFailure),
    NotAttempted,
}

/// Runs ingestion requests against one set of collaborators
pub struct Ingestor {
    podcasts: PodcastCatalog,
    options: IngestOptions,
    http: Arc<dyn HttpClient>,
    writer: MetadataWriter,
    materializer: AudioMaterializer,
    reporter: SharedProgressReporter,
}

impl Ingestor {
    pub fn new(
        podcasts: PodcastCatalog,
        options: IngestOptions,
        http: Arc<dyn HttpClient>,
        objects: Arc<dyn ObjectStore>,
        tables: Arc<dyn TabularStore>,
        reporter: SharedProgressReporter,
    ) -> Self {
        let materializer = AudioMaterializer::new(
            http.clone(),
            objects,
            options.bucket.clone(),
            options.timeouts,
            reporter.clone(),
        );

        Self {
            podcasts,
            options,
            http,
            writer: MetadataWriter::new(tables),
            materializer,
            reporter,
        }
    }

    /// Ingest the newest `num_episodes` episodes of a configured podcast
    ///
    /// This is the main entry point for the library. It:
    /// 1. Looks the podcast up in the configured table
    /// 2. Fetches and parses its feed
    /// 3. Resolves the show and writes its row
    /// 4. Classifies the newest entries as new or already stored
    /// 5. Materializes new episodes and writes their audio and episode rows
    ///
    /// Only steps 1 to 4 can fail the request. Episode failures end up in
    /// the summary.
    #[instrument(
        skip(self, request),
        fields(podcast = %request.podcast_name, episodes = request.num_episodes)
    )]
    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestSummary, IngestError> {
        let podcast_name = request.podcast_name.as_str();
        let entry = self.podcasts.require(podcast_name)?;

        self.reporter.report(ProgressEvent::FetchingFeed {
            podcast: podcast_name.to_string(),
            url: entry.rss.clone(),
        });
        info!(url = %entry.rss, "fetching feed");

        let podcast = fetch_feed(self.http.as_ref(), &entry.rss, self.options.timeouts.fetch)
            .await
            .map_err(|e| IngestError::Feed {
                podcast: podcast_name.to_string(),
                source: e,
            })?;

        self.reporter.report(ProgressEvent::FeedParsed {
            feed_title: podcast.title.clone(),
            total_episodes: podcast.episodes.len(),
        });

        let resolve_error = |source| IngestError::Resolve {
            podcast: podcast_name.to_string(),
            source,
        };

        let title = entry.title.as_deref().unwrap_or(podcast_name);
        let resolved = resolve_show(&self.writer, title, &entry.rss, &podcast, Utc::now())
            .await
            .map_err(resolve_error)?;
        let show = resolved.show;

        self.writer
            .upsert_show(&show)
            .await
            .map_err(|e| IngestError::ShowWrite {
                podcast: podcast_name.to_string(),
                source: e,
            })?;

        info!(
            show_id = %show.id,
            show = %show.sanitized_title,
            feed_title = %podcast.title,
            created = resolved.is_new,
            "show resolved"
        );
        self.reporter.report(ProgressEvent::ShowResolved {
            show_id: show.id.clone(),
            show_title: show.title.clone(),
            is_new: resolved.is_new,
        });

        let plan = create_ingest_plan(&self.writer, &show, &podcast.episodes, request.num_episodes)
            .await
            .map_err(resolve_error)?;

        let skipped = plan.already_present.len();
        let total_to_ingest = plan.to_ingest.len();

        self.reporter.report(ProgressEvent::PlanReady {
            to_ingest: total_to_ingest,
            already_present: skipped,
            total_episodes: plan.total_episodes,
        });
        info!(new = total_to_ingest, skipped, "ingest plan ready");

        // buffered(n) admits episode i + n only after episode i has been
        // yielded, so `index % n` always names a free slot
        let concurrency = self.options.max_concurrent.max(1);
        let outcomes: Vec<EpisodeOutcome> =
            futures::stream::iter(plan.to_ingest.into_iter().enumerate())
                .map(|(episode_index, planned)| {
                    let context = TransferContext {
                        slot: episode_index % concurrency,
                        episode_index,
                        total_to_ingest,
                    };
                    self.process_episode(&show, planned, context, request)
                })
                .buffered(concurrency)
                .collect()
                .await;

        let mut summary = IngestSummary {
            podcast_name: podcast_name.to_string(),
            show_id: show.id.clone(),
            show_title: show.title.clone(),
            show_created: resolved.is_new,
            processed: 0,
            skipped,
            failed: Vec::new(),
            not_attempted: 0,
        };

        for outcome in outcomes {
            match outcome {
                EpisodeOutcome::Stored => summary.processed += 1,
                EpisodeOutcome::Failed(failure) => summary.failed.push(failure),
                EpisodeOutcome::NotAttempted => summary.not_attempted += 1,
            }
        }

        self.reporter.report(ProgressEvent::IngestCompleted {
            processed: summary.processed,
            skipped: summary.skipped,
            failed: summary.failed.len(),
            not_attempted: summary.not_attempted,
        });
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            not_attempted = summary.not_attempted,
            "ingest completed"
        );

        Ok(summary)
    }

    async fn process_episode(
        &self,
        show: &Show,
        planned: PlannedEpisode,
        context: TransferContext,
        request: &IngestRequest,
    ) -> EpisodeOutcome {
        let title = planned.episode.title.clone();

        if request.is_expired() {
            info!(episode = %title, "deadline passed, not attempting");
            self.reporter.report(ProgressEvent::EpisodeNotAttempted {
                episode_title: title,
            });
            return EpisodeOutcome::NotAttempted;
        }

        let url = planned.episode.original_audio_url.clone();
        match self.store_episode(show, planned, context).await {
            Ok(audio) => {
                info!(
                    episode = %title,
                    path = %audio.gcs_object_path,
                    bytes = audio.file_size,
                    "episode stored"
                );
                self.reporter.report(ProgressEvent::EpisodeStored {
                    slot: context.slot,
                    episode_title: title,
                    object_path: audio.gcs_object_path,
                    file_size: audio.file_size,
                });
                EpisodeOutcome::Stored
            }
            Err(e) => {
                warn!(
                    episode = %title,
                    url = %url,
                    stage = e.stage(),
                    error = %e,
                    "episode failed"
                );
                self.reporter.report(ProgressEvent::EpisodeFailed {
                    slot: context.slot,
                    episode_title: title.clone(),
                    stage: e.stage(),
                    error: e.to_string(),
                });
                EpisodeOutcome::Failed(EpisodeFailure {
                    title,
                    original_audio_url: url,
                    stage: e.stage(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Materialize, then write the audio row, then the episode row
    ///
    /// An episode write failure leaves the audio row and object in place.
    /// Both are keyed deterministically, so the next run replaces them.
    async fn store_episode(
        &self,
        show: &Show,
        planned: PlannedEpisode,
        context: TransferContext,
    ) -> Result<Audio, EpisodeError> {
        let PlannedEpisode { entry, mut episode } = planned;

        let audio = self
            .materializer
            .materialize(show, &episode, &entry.enclosure, context)
            .await?;

        self.writer.insert_audio(&audio).await?;

        episode.audio_id = Some(audio.id.clone());
        if let Err(e) = self.writer.insert_episode(&episode).await {
            warn!(
                audio_id = %audio.id,
                episode_id = %episode.id,
                "episode row not written, audio row left orphaned"
            );
            return Err(e.into());
        }

        Ok(audio)
    }
}
