use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use podingest::error::HttpError;
use podingest::http::HttpBytes;
use podingest::model::{AUDIO_TABLE, EPISODES_TABLE, SHOWS_TABLE};
use podingest::{
    ByteStream, Filter, FsObjectStore, HttpClient, HttpResponse, IngestError, IngestOptions,
    IngestRequest, Ingestor, MemoryObjectStore, MemoryTabularStore, NoopReporter, ObjectStore,
    PodcastCatalog, PodcastEntry, Row, SqliteTabularStore, StoreError, TabularStore,
    sanitize_title,
};

const FEED_URL: &str = "https://feeds.example.com/show.xml";

/// Serves a fixed feed and per-URL audio responses, recording every request
#[derive(Default)]
struct MockHttpClient {
    feed: String,
    audio_status: HashMap<String, u16>,
    requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    fn new(feed: String) -> Self {
        Self {
            feed,
            ..Default::default()
        }
    }

    fn failing(mut self, url: &str, status: u16) -> Self {
        self.audio_status.insert(url.to_string(), status);
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn audio_requests(&self) -> usize {
        self.requests().iter().filter(|u| u.as_str() != FEED_URL).count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_bytes(&self, url: &str) -> Result<HttpBytes, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(HttpBytes {
            status: 200,
            body: Bytes::from(self.feed.clone()),
        })
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());
        let status = self.audio_status.get(url).copied().unwrap_or(200);
        let chunks = vec![
            Ok(Bytes::from(format!("ID3 {url} "))),
            Ok(Bytes::from_static(b"audio frames")),
        ];
        let body: ByteStream = Box::pin(futures::stream::iter(chunks));

        Ok(HttpResponse {
            status,
            // Deliberately wrong; the stored size must come from the transfer
            content_length: Some(1),
            content_type: Some("audio/mpeg".to_string()),
            body,
        })
    }
}

/// Tabular store that counts every call
#[derive(Default)]
struct CountingTabularStore {
    inner: MemoryTabularStore,
    calls: AtomicUsize,
}

#[async_trait]
impl TabularStore for CountingTabularStore {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.query(table, filter).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, rows).await
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(table, key, row).await
    }
}

/// Object store that counts every call
#[derive(Default)]
struct CountingObjectStore {
    inner: MemoryObjectStore,
    calls: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingObjectStore {
    async fn put(&self, bucket: &str, path: &str, body: ByteStream) -> Result<u64, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.put(bucket, path, body).await
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(bucket, path).await
    }
}

fn episode_url(n: usize) -> String {
    format!("https://cdn.example.com/episodes/{n}.mp3")
}

/// RSS feed with the given (title, audio url) items, newest first
fn feed(items: &[(&str, String)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, url)| {
            format!(
                r#"<item><title>{title}</title><enclosure url="{url}" length="0" type="audio/mpeg"/></item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>All In</title>
    <link>https://allin.example.com</link>
    <description>Four besties</description>
    <language>en</language>
    <itunes:category text="Business"/>
    {items}
  </channel>
</rss>"#
    )
}

fn numbered_feed(count: usize) -> String {
    let items: Vec<(String, String)> = (1..=count)
        .rev()
        .map(|n| (format!("Episode {n}"), episode_url(n)))
        .collect();
    let borrowed: Vec<(&str, String)> =
        items.iter().map(|(t, u)| (t.as_str(), u.clone())).collect();
    feed(&borrowed)
}

fn podcasts() -> PodcastCatalog {
    PodcastCatalog::new().with_podcast(
        "All In",
        PodcastEntry {
            rss: FEED_URL.to_string(),
            title: None,
        },
    )
}

fn ingestor(
    client: Arc<MockHttpClient>,
    objects: Arc<dyn ObjectStore>,
    tables: Arc<dyn TabularStore>,
) -> Ingestor {
    Ingestor::new(
        podcasts(),
        IngestOptions::new("podcast-audio"),
        client,
        objects,
        tables,
        NoopReporter::shared(),
    )
}

#[tokio::test]
async fn second_identical_request_creates_no_episodes() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(3)));
    let tables = Arc::new(MemoryTabularStore::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let ingestor = ingestor(client.clone(), objects.clone(), tables.clone());
    let request = IngestRequest::new("All In", 3);

    let first = ingestor.ingest(&request).await.unwrap();
    assert_eq!(first.processed, 3);
    let audio_requests = client.audio_requests();

    let second = ingestor.ingest(&request).await.unwrap();

    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 3);
    assert!(second.failed.is_empty());
    assert_eq!(tables.rows(EPISODES_TABLE).len(), 3);
    assert_eq!(tables.rows(AUDIO_TABLE).len(), 3);
    assert_eq!(tables.rows(SHOWS_TABLE).len(), 1);
    assert_eq!(objects.len(), 3);
    // No audio downloaded on the second run
    assert_eq!(client.audio_requests(), audio_requests);
}

#[tokio::test]
async fn repeated_audio_url_yields_one_episode() {
    let feed = feed(&[
        ("Episode 2", episode_url(2)),
        ("Episode 2 (re-upload)", episode_url(2)),
        ("Episode 1", episode_url(1)),
    ]);
    let client = Arc::new(MockHttpClient::new(feed));
    let tables = Arc::new(MemoryTabularStore::new());

    let summary = ingestor(client, Arc::new(MemoryObjectStore::new()), tables.clone())
        .ingest(&IngestRequest::new("All In", 10))
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 0);
    assert!(summary.failed.is_empty());

    let episodes = tables.rows(EPISODES_TABLE);
    let with_url: Vec<&Row> = episodes
        .iter()
        .filter(|r| r["originalAudioUrl"] == episode_url(2).as_str())
        .collect();
    assert_eq!(with_url.len(), 1);
    assert_eq!(with_url[0]["title"], "Episode 2");
}

#[tokio::test]
async fn cap_selects_newest_entries() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(5)));
    let tables = Arc::new(MemoryTabularStore::new());

    let summary = ingestor(client.clone(), Arc::new(MemoryObjectStore::new()), tables.clone())
        .ingest(&IngestRequest::new("All In", 2))
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    let mut titles: Vec<String> = tables
        .rows(EPISODES_TABLE)
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    titles.sort();
    assert_eq!(titles, ["Episode 4", "Episode 5"]);
    assert_eq!(client.audio_requests(), 2);
}

#[tokio::test]
async fn cap_larger_than_feed_takes_what_exists() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(2)));

    let summary = ingestor(
        client,
        Arc::new(MemoryObjectStore::new()),
        Arc::new(MemoryTabularStore::new()),
    )
    .ingest(&IngestRequest::new("All In", 50))
    .await
    .unwrap();

    assert_eq!(summary.processed, 2);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn middle_download_failure_is_isolated() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(3)).failing(&episode_url(2), 503));
    let tables = Arc::new(MemoryTabularStore::new());

    let summary = ingestor(client, Arc::new(MemoryObjectStore::new()), tables.clone())
        .ingest(&IngestRequest::new("All In", 3))
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed.len(), 1);
    let failure = &summary.failed[0];
    assert_eq!(failure.title, "Episode 2");
    assert_eq!(failure.original_audio_url, episode_url(2));
    assert_eq!(failure.stage, "download");
    assert!(failure.reason.contains("503"));

    let urls: Vec<String> = tables
        .rows(EPISODES_TABLE)
        .iter()
        .map(|r| r["originalAudioUrl"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.contains(&episode_url(1)));
    assert!(urls.contains(&episode_url(3)));
    assert_eq!(summary.message(), "Successfully processed 2 episodes for 'All In'.");
}

#[tokio::test]
async fn failed_episode_is_picked_up_by_retry() {
    let tables = Arc::new(MemoryTabularStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    let broken = Arc::new(MockHttpClient::new(numbered_feed(2)).failing(&episode_url(1), 404));
    let first = ingestor(broken, objects.clone(), tables.clone())
        .ingest(&IngestRequest::new("All In", 2))
        .await
        .unwrap();
    assert_eq!(first.processed, 1);

    let healthy = Arc::new(MockHttpClient::new(numbered_feed(2)));
    let retry = ingestor(healthy, objects.clone(), tables.clone())
        .ingest(&IngestRequest::new("All In", 2))
        .await
        .unwrap();

    assert_eq!(retry.processed, 1);
    assert_eq!(retry.skipped, 1);
    assert_eq!(tables.rows(EPISODES_TABLE).len(), 2);
}

#[tokio::test]
async fn unknown_podcast_touches_nothing() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(1)));
    let tables = Arc::new(CountingTabularStore::default());
    let objects = Arc::new(CountingObjectStore::default());

    let err = ingestor(client.clone(), objects.clone(), tables.clone())
        .ingest(&IngestRequest::new("Not Configured", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::UnknownPodcast { ref name } if name == "Not Configured"));
    assert!(client.requests().is_empty());
    assert_eq!(tables.calls.load(Ordering::SeqCst), 0);
    assert_eq!(objects.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_feed_creates_no_rows() {
    let client = Arc::new(MockHttpClient::new(
        "<rss version=\"2.0\"><channel><title>Broken".to_string(),
    ));
    let tables = Arc::new(MemoryTabularStore::new());

    let err = ingestor(client, Arc::new(MemoryObjectStore::new()), tables.clone())
        .ingest(&IngestRequest::new("All In", 5))
        .await
        .unwrap_err();

    match err {
        IngestError::Feed { source, .. } => assert!(source.is_parse_error()),
        other => panic!("Expected feed error, got {other:?}"),
    }
    assert!(tables.rows(SHOWS_TABLE).is_empty());
    assert!(tables.rows(EPISODES_TABLE).is_empty());
}

#[tokio::test]
async fn entry_without_audio_fails_request() {
    let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>All In</title>
  <item><title>Trailer</title></item>
</channel></rss>"#;
    let client = Arc::new(MockHttpClient::new(feed.to_string()));
    let tables = Arc::new(MemoryTabularStore::new());

    let err = ingestor(client, Arc::new(MemoryObjectStore::new()), tables.clone())
        .ingest(&IngestRequest::new("All In", 5))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Feed { .. }));
    assert!(tables.rows(SHOWS_TABLE).is_empty());
}

#[tokio::test]
async fn spelling_variants_share_one_show() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(1)));
    let tables = Arc::new(MemoryTabularStore::new());
    let catalog = PodcastCatalog::new()
        .with_podcast(
            "All In!",
            PodcastEntry {
                rss: FEED_URL.to_string(),
                title: None,
            },
        )
        .with_podcast(
            "all in",
            PodcastEntry {
                rss: FEED_URL.to_string(),
                title: None,
            },
        );
    let ingestor = Ingestor::new(
        catalog,
        IngestOptions::new("podcast-audio"),
        client,
        Arc::new(MemoryObjectStore::new()),
        tables.clone(),
        NoopReporter::shared(),
    );

    let first = ingestor.ingest(&IngestRequest::new("All In!", 1)).await.unwrap();
    let second = ingestor.ingest(&IngestRequest::new("all in", 1)).await.unwrap();

    assert_eq!(sanitize_title("All In!"), sanitize_title("all in"));
    assert_eq!(first.show_id, second.show_id);
    assert_eq!(second.skipped, 1);
    assert_eq!(tables.rows(SHOWS_TABLE).len(), 1);
}

#[tokio::test]
async fn stored_size_comes_from_transfer() {
    let client = Arc::new(MockHttpClient::new(numbered_feed(1)));
    let tables = Arc::new(MemoryTabularStore::new());
    let objects = Arc::new(MemoryObjectStore::new());

    ingestor(client, objects.clone(), tables.clone())
        .ingest(&IngestRequest::new("All In", 1))
        .await
        .unwrap();

    let audio = &tables.rows(AUDIO_TABLE)[0];
    let path = audio["gcsObjectPath"].as_str().unwrap();
    assert!(path.starts_with("audio/all-in/episode-1-"));
    assert!(path.ends_with(".mp3"));
    assert_eq!(audio["gcsBucket"], "podcast-audio");

    let stored = objects.get("podcast-audio", path).unwrap();
    assert_eq!(audio["fileSize"], stored.len() as u64);
    assert_ne!(audio["fileSize"], 1);
}

#[tokio::test]
async fn end_to_end_with_sqlite_and_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MockHttpClient::new(numbered_feed(2)));
    let tables = Arc::new(SqliteTabularStore::open(&dir.path().join("meta.db")).await.unwrap());
    let objects = Arc::new(FsObjectStore::new(dir.path().join("objects")));
    let ingestor = ingestor(client, objects.clone(), tables.clone());

    let first = ingestor.ingest(&IngestRequest::new("All In", 2)).await.unwrap();
    let second = ingestor.ingest(&IngestRequest::new("All In", 2)).await.unwrap();

    assert_eq!(first.processed, 2);
    assert_eq!(second.skipped, 2);

    let shows = tables.query(SHOWS_TABLE, &Filter::new()).await.unwrap();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0]["tags"], serde_json::json!(["Business"]));

    let audio = tables.query(AUDIO_TABLE, &Filter::new()).await.unwrap();
    assert_eq!(audio.len(), 2);
    for row in &audio {
        let path = row["gcsObjectPath"].as_str().unwrap();
        assert!(objects.exists("podcast-audio", path).await.unwrap());
    }
}
