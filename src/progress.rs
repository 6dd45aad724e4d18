use std::sync::Arc;

/// Events emitted during an ingestion for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { podcast: String, url: String },

    /// Feed has been parsed successfully
    FeedParsed {
        feed_title: String,
        total_episodes: usize,
    },

    /// The show to write under is known
    ShowResolved {
        show_id: String,
        show_title: String,
        /// No stored show matched
        is_new: bool,
    },

    /// Candidates have been classified against stored episodes
    PlanReady {
        to_ingest: usize,
        already_present: usize,
        total_episodes: usize,
    },

    /// An episode transfer is starting
    TransferStarting {
        /// Identifies the worker slot (0 to max_concurrent-1)
        slot: usize,
        episode_title: String,
        /// Index of this episode among the ones to ingest
        episode_index: usize,
        total_to_ingest: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Transfer progress update
    TransferProgress {
        slot: usize,
        episode_title: String,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    },

    /// Audio and metadata for an episode are stored
    EpisodeStored {
        slot: usize,
        episode_title: String,
        object_path: String,
        file_size: u64,
    },

    /// An episode failed; the rest of the request carries on
    EpisodeFailed {
        slot: usize,
        episode_title: String,
        /// `download`, `upload` or `metadata`
        stage: &'static str,
        error: String,
    },

    /// The request deadline passed before this episode started
    EpisodeNotAttempted { episode_title: String },

    /// Ingestion finished
    IngestCompleted {
        processed: usize,
        skipped: usize,
        failed: usize,
        not_attempted: usize,
    },
}

/// Trait for reporting progress events during ingestion.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
