pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod identity;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod store;

// Re-export main types for convenience
pub use config::{IngestOptions, PodcastCatalog, PodcastEntry, Timeouts};
pub use episode::{AudioMaterializer, TransferContext};
pub use error::{
    ConfigError, DownloadError, EpisodeError, FeedError, HttpError, IngestError,
    MetadataWriteError, StoreError, UploadError,
};
pub use feed::{Enclosure, EpisodeEntry, Podcast, fetch_feed, parse_feed};
pub use http::{ByteStream, HttpClient, HttpResponse, ReqwestClient};
pub use identity::{audio_id, episode_id, object_path, sanitize_title, show_id};
pub use metadata::MetadataWriter;
pub use model::{Audio, Episode, Show};
pub use pipeline::{EpisodeFailure, IngestRequest, IngestResponse, IngestSummary, Ingestor};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{
    Filter, FsObjectStore, GcsObjectStore, MemoryObjectStore, MemoryTabularStore, ObjectStore,
    Row, SqliteTabularStore, TabularStore,
};
