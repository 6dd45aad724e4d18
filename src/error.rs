use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading the podcast table
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read podcast table {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse podcast table {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Podcast '{name}' has no RSS URL configured")]
    MissingRssUrl { name: String },
}

/// Transport-level failures reported by an [`HttpClient`](crate::http::HttpClient)
#[derive(Error, Debug)]
pub enum HttpError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("HTTP error {status} fetching feed {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out after {after:?} fetching feed {url}")]
    Timeout { url: String, after: Duration },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Failed to parse Atom feed: {0}")]
    AtomParseFailed(#[from] feed_rs::parser::ParseFeedError),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed has no title")]
    MissingTitle,

    #[error("Feed entry #{index} has no title")]
    MissingEpisodeTitle { index: usize },

    #[error("Episode '{title}' has no enclosure (audio file)")]
    MissingEnclosure { title: String },
}

impl FeedError {
    /// Whether this error came from the document itself rather than the transport
    pub fn is_parse_error(&self) -> bool {
        !matches!(
            self,
            FeedError::FetchFailed { .. } | FeedError::HttpStatus { .. } | FeedError::Timeout { .. }
        )
    }
}

/// Errors raised by object and tabular storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Source stream failed: {0}")]
    Body(#[source] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unknown table {0}")]
    UnknownTable(String),

    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Invalid row for {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("Failed to (de)serialize row: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors that can occur while pulling an episode's audio from its source
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out after {after:?} waiting for {url}")]
    Timeout { url: String, after: Duration },

    #[error("Stream error while downloading {url}: {reason}")]
    StreamFailed { url: String, reason: String },
}

/// Errors that can occur while writing audio into the object store
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to store {bucket}/{path}: {source}")]
    StoreFailed {
        bucket: String,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Timed out after {after:?} storing {bucket}/{path}")]
    Timeout {
        bucket: String,
        path: String,
        after: Duration,
    },
}

/// Errors that can occur while writing metadata rows
#[derive(Error, Debug)]
pub enum MetadataWriteError {
    #[error("Failed to write show {show_id}: {source}")]
    Show {
        show_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write audio row {audio_id}: {source}")]
    Audio {
        audio_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write episode row {episode_id}: {source}")]
    Episode {
        episode_id: String,
        #[source]
        source: StoreError,
    },
}

/// Failure of a single episode; recorded in the summary, never fatal to the request
#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("metadata write failed: {0}")]
    Metadata(#[from] MetadataWriteError),
}

impl EpisodeError {
    /// Short label for the failing stage
    pub fn stage(&self) -> &'static str {
        match self {
            EpisodeError::Download(_) => "download",
            EpisodeError::Upload(_) => "upload",
            EpisodeError::Metadata(_) => "metadata",
        }
    }
}

/// Request-level errors; any of these aborts the whole ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Podcast '{name}' not found in configuration")]
    UnknownPodcast { name: String },

    #[error("Feed error for '{podcast}': {source}")]
    Feed {
        podcast: String,
        #[source]
        source: FeedError,
    },

    #[error("Failed to resolve '{podcast}' against stored metadata: {source}")]
    Resolve {
        podcast: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to write show '{podcast}': {source}")]
    ShowWrite {
        podcast: String,
        #[source]
        source: MetadataWriteError,
    },
}
