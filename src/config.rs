use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, IngestError};

/// One configured podcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastEntry {
    /// URL of the RSS (or Atom) feed
    pub rss: String,
    /// Display title for the show; the podcast name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Mapping of podcast display name to feed location
///
/// Loaded once at startup and handed to the [`Ingestor`](crate::pipeline::Ingestor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodcastCatalog {
    entries: BTreeMap<String, PodcastEntry>,
}

impl PodcastCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    pub fn with_podcast(mut self, name: impl Into<String>, entry: PodcastEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PodcastEntry> {
        self.entries.get(name)
    }

    /// Look up a podcast a request names
    pub fn require(&self, name: &str) -> Result<&PodcastEntry, IngestError> {
        self.get(name).ok_or_else(|| IngestError::UnknownPodcast {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a JSON podcast table
    ///
    /// Shape: `{ "All In": { "rss": "https://...", "title": "All-In" } }`
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let catalog: PodcastCatalog =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseFailed {
                path: origin.to_path_buf(),
                source: e,
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load the podcast table from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content, path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.entries.iter().find(|(_, e)| e.rss.trim().is_empty()) {
            Some((name, _)) => Err(ConfigError::MissingRssUrl { name: name.clone() }),
            None => Ok(()),
        }
    }
}

/// Upper bounds on each network operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Whole feed fetch, request through body
    pub fetch: Duration,
    /// Time to first byte of the audio source, and between chunks
    pub download: Duration,
    /// Whole object store write
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(10),
            download: Duration::from_secs(30),
            upload: Duration::from_secs(300),
        }
    }
}

/// Options for podcast ingestion
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Destination bucket for audio objects
    pub bucket: String,
    /// Maximum number of episodes materialized at once (1 = sequential)
    pub max_concurrent: usize,
    pub timeouts: Timeouts,
}

impl IngestOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            max_concurrent: 1,
            timeouts: Timeouts::default(),
        }
    }
}
