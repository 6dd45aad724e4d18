//! Audio materialization: stream an episode's audio from its source into
//! the object store under a deterministic path.

mod download;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Timeouts;
use crate::error::{EpisodeError, UploadError};
use crate::feed::Enclosure;
use crate::http::HttpClient;
use crate::identity::{audio_extension, audio_id, object_path};
use crate::model::{Audio, Episode, Show};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::ObjectStore;

pub use download::{ProgressFn, SourceStream, SourceTap, open_source, tap_source};

/// Position of a transfer among the ones running for a request
#[derive(Debug, Clone, Copy)]
pub struct TransferContext {
    /// Worker slot (0 to max_concurrent-1) for progress display
    pub slot: usize,
    /// Index of this episode among the ones to ingest
    pub episode_index: usize,
    pub total_to_ingest: usize,
}

/// Moves audio from episode sources into one bucket
#[derive(Clone)]
pub struct AudioMaterializer {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    timeouts: Timeouts,
    reporter: SharedProgressReporter,
}

impl AudioMaterializer {
    pub fn new(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        timeouts: Timeouts,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            client,
            store,
            bucket: bucket.into(),
            timeouts,
            reporter,
        }
    }

    /// Where the audio for `episode` is stored
    ///
    /// Only depends on feed data, so a retry targets the same object.
    pub fn object_path_for(&self, show: &Show, episode: &Episode, enclosure: &Enclosure) -> String {
        let extension = audio_extension(&enclosure.url, enclosure.mime_type.as_deref());
        object_path(
            &show.sanitized_title,
            &episode.sanitized_title,
            &episode.id,
            &extension,
        )
    }

    /// Download the episode's audio and upload it, returning the audio row
    ///
    /// The body is streamed straight into the store. The reported size is
    /// the number of bytes that actually went through, whatever the source
    /// announced.
    pub async fn materialize(
        &self,
        show: &Show,
        episode: &Episode,
        enclosure: &Enclosure,
        context: TransferContext,
    ) -> Result<Audio, EpisodeError> {
        let url = enclosure.url.as_str();
        let path = self.object_path_for(show, episode, enclosure);

        let source =
            download::open_source(self.client.as_ref(), url, self.timeouts.download).await?;

        self.reporter.report(ProgressEvent::TransferStarting {
            slot: context.slot,
            episode_title: episode.title.clone(),
            episode_index: context.episode_index,
            total_to_ingest: context.total_to_ingest,
            content_length: source.content_length,
        });

        match self.store.exists(&self.bucket, &path).await {
            Ok(true) => debug!(bucket = %self.bucket, path = %path, "overwriting existing object"),
            Ok(false) => {}
            Err(e) => warn!(
                bucket = %self.bucket,
                path = %path,
                error = %e,
                "existence check failed"
            ),
        }

        let progress: ProgressFn = {
            let reporter = self.reporter.clone();
            let episode_title = episode.title.clone();
            let total_bytes = source.content_length;
            let slot = context.slot;
            Arc::new(move |bytes_transferred| {
                reporter.report(ProgressEvent::TransferProgress {
                    slot,
                    episode_title: episode_title.clone(),
                    bytes_transferred,
                    total_bytes,
                });
            })
        };

        let (body, tap) = download::tap_source(source.body, url, self.timeouts.download, progress);

        let outcome = tokio::time::timeout(
            self.timeouts.upload,
            self.store.put(&self.bucket, &path, body),
        )
        .await;

        // A put that fails because the source failed is a download failure
        let upload_error = match outcome {
            Ok(Ok(written)) => {
                let file_size = tap.bytes();
                if written != file_size {
                    debug!(written, file_size, path = %path, "store reported a different size");
                }
                return Ok(Audio {
                    id: audio_id(&episode.id),
                    gcs_bucket: self.bucket.clone(),
                    gcs_object_path: path,
                    file_size,
                    content_hash: Some(tap.content_hash()),
                });
            }
            Ok(Err(source)) => UploadError::StoreFailed {
                bucket: self.bucket.clone(),
                path,
                source,
            },
            Err(_) => UploadError::Timeout {
                bucket: self.bucket.clone(),
                path,
                after: self.timeouts.upload,
            },
        };

        Err(match tap.take_failure() {
            Some(download_error) => download_error.into(),
            None => upload_error.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use url::Url;

    use crate::error::{DownloadError, HttpError, StoreError};
    use crate::http::{ByteStream, HttpBytes, HttpResponse};
    use crate::progress::NoopReporter;
    use crate::store::MemoryObjectStore;

    struct MockHttpClient {
        chunks: Vec<Result<&'static str, &'static str>>,
        status: u16,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, _url: &str) -> Result<HttpBytes, HttpError> {
            Err(HttpError::Other("not used".to_string()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, HttpError> {
            let chunks: Vec<_> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(data) => Ok(Bytes::from_static(data.as_bytes())),
                    Err(reason) => Err(std::io::Error::other(*reason)),
                })
                .collect();
            let body: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(HttpResponse {
                status: self.status,
                content_length: None,
                content_type: None,
                body,
            })
        }
    }

    /// Object store that rejects every write
    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn put(
            &self,
            _bucket: &str,
            _path: &str,
            _body: ByteStream,
        ) -> Result<u64, StoreError> {
            Err(StoreError::HttpStatus {
                url: "https://storage.example.com".to_string(),
                status: 403,
                body: "forbidden".to_string(),
            })
        }

        async fn exists(&self, _bucket: &str, _path: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Object store that never finishes a write
    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn put(
            &self,
            _bucket: &str,
            _path: &str,
            _body: ByteStream,
        ) -> Result<u64, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }

        async fn exists(&self, _bucket: &str, _path: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn make_show() -> Show {
        Show {
            id: "show1".to_string(),
            title: "All In".to_string(),
            sanitized_title: "all-in".to_string(),
            description: None,
            image_url: None,
            rss_url: "https://example.com/feed.xml".to_string(),
            website_url: None,
            language: None,
            tags: vec![],
            last_updated: chrono::Utc::now(),
        }
    }

    fn make_episode() -> (Episode, Enclosure) {
        let url = "https://cdn.example.com/ep1.m4a";
        let episode = Episode {
            id: crate::identity::episode_id("show1", url),
            show_id: "show1".to_string(),
            title: "Episode One".to_string(),
            sanitized_title: "episode-one".to_string(),
            description: None,
            published_date: None,
            duration_seconds: None,
            original_audio_url: url.to_string(),
            audio_id: None,
        };
        let enclosure = Enclosure {
            url: Url::parse(url).unwrap(),
            length: Some(999_999),
            mime_type: Some("audio/x-m4a".to_string()),
        };
        (episode, enclosure)
    }

    fn context() -> TransferContext {
        TransferContext {
            slot: 0,
            episode_index: 0,
            total_to_ingest: 1,
        }
    }

    fn materializer(client: MockHttpClient, store: Arc<dyn ObjectStore>) -> AudioMaterializer {
        AudioMaterializer::new(
            Arc::new(client),
            store,
            "bucket",
            Timeouts {
                fetch: Duration::from_secs(1),
                download: Duration::from_secs(5),
                upload: Duration::from_secs(5),
            },
            NoopReporter::shared(),
        )
    }

    #[tokio::test]
    async fn materialize_streams_into_store() {
        let store = Arc::new(MemoryObjectStore::new());
        let client = MockHttpClient {
            chunks: vec![Ok("fake "), Ok("audio")],
            status: 200,
        };
        let (episode, enclosure) = make_episode();

        let audio = materializer(client, store.clone())
            .materialize(&make_show(), &episode, &enclosure, context())
            .await
            .unwrap();

        assert_eq!(audio.id, audio_id(&episode.id));
        assert_eq!(audio.gcs_bucket, "bucket");
        assert!(audio.gcs_object_path.starts_with("audio/all-in/episode-one-"));
        assert!(audio.gcs_object_path.ends_with(".m4a"));
        // Observed size, not the enclosure's announced length
        assert_eq!(audio.file_size, 10);
        assert!(audio.content_hash.unwrap().starts_with("sha256:"));
        assert_eq!(store.get("bucket", &audio.gcs_object_path).unwrap(), "fake audio");
    }

    #[tokio::test]
    async fn same_episode_targets_same_path() {
        let store = Arc::new(MemoryObjectStore::new());
        let (episode, enclosure) = make_episode();

        for _ in 0..2 {
            let client = MockHttpClient {
                chunks: vec![Ok("audio")],
                status: 200,
            };
            materializer(client, store.clone())
                .materialize(&make_show(), &episode, &enclosure, context())
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn http_error_is_download_failure() {
        let store = Arc::new(MemoryObjectStore::new());
        let client = MockHttpClient {
            chunks: vec![],
            status: 404,
        };
        let (episode, enclosure) = make_episode();

        let err = materializer(client, store.clone())
            .materialize(&make_show(), &episode, &enclosure, context())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EpisodeError::Download(DownloadError::HttpStatus { status: 404, .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn broken_source_mid_stream_is_download_failure() {
        let store = Arc::new(MemoryObjectStore::new());
        let client = MockHttpClient {
            chunks: vec![Ok("abc"), Err("connection reset")],
            status: 200,
        };
        let (episode, enclosure) = make_episode();

        let err = materializer(client, store.clone())
            .materialize(&make_show(), &episode, &enclosure, context())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "download");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_upload_failure() {
        let client = MockHttpClient {
            chunks: vec![Ok("audio")],
            status: 200,
        };
        let (episode, enclosure) = make_episode();

        let err = materializer(client, Arc::new(BrokenStore))
            .materialize(&make_show(), &episode, &enclosure, context())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EpisodeError::Upload(UploadError::StoreFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_is_upload_timeout() {
        let client = MockHttpClient {
            chunks: vec![Ok("audio")],
            status: 200,
        };
        let (episode, enclosure) = make_episode();

        let err = materializer(client, Arc::new(StalledStore))
            .materialize(&make_show(), &episode, &enclosure, context())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "upload");
        match err {
            EpisodeError::Upload(UploadError::Timeout { after, .. }) => {
                assert_eq!(after, Duration::from_secs(5))
            }
            other => panic!("Expected upload timeout, got {other}"),
        }
    }
}
