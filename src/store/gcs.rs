//! Google Cloud Storage over its JSON API.
//!
//! Authentication is a caller-supplied OAuth2 access token; obtaining and
//! refreshing it is left to the environment (e.g. `gcloud auth
//! print-access-token` or a metadata-server sidecar).

use async_trait::async_trait;
use url::Url;

use crate::error::StoreError;
use crate::http::{ByteStream, is_success};

use super::ObjectStore;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Object store writing to Google Cloud Storage
#[derive(Clone)]
pub struct GcsObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl GcsObjectStore {
    pub fn new(client: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("valid default endpoint"),
            token: token.into(),
        }
    }

    /// Point at a different endpoint (an emulator such as fake-gcs-server)
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// `POST /upload/storage/v1/b/<bucket>/o?uploadType=media&name=<path>`
    pub fn upload_url(&self, bucket: &str, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        }
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);
        url
    }

    /// `GET /storage/v1/b/<bucket>/o/<url-encoded path>`
    pub fn metadata_url(&self, bucket: &str, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            // push() percent-encodes the slashes inside the object name
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "b", bucket, "o"])
                .push(path);
        }
        url
    }

    async fn error_for(url: &Url, response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StoreError::HttpStatus {
            url: url.to_string(),
            status,
            body,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, bucket: &str, path: &str, body: ByteStream) -> Result<u64, StoreError> {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU64, Ordering};

        use futures::StreamExt;

        let url = self.upload_url(bucket, path);
        let sent = Arc::new(AtomicU64::new(0));
        let counter = sent.clone();
        let counted = body.inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            }
        });

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(counted))
            .send()
            .await
            .map_err(|e| StoreError::Http {
                url: url.to_string(),
                source: e,
            })?;

        if !is_success(response.status().as_u16()) {
            return Err(Self::error_for(&url, response).await);
        }

        Ok(sent.load(Ordering::Relaxed))
    }

    async fn exists(&self, bucket: &str, path: &str) -> Result<bool, StoreError> {
        let url = self.metadata_url(bucket, path);
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StoreError::Http {
                url: url.to_string(),
                source: e,
            })?;

        match response.status().as_u16() {
            404 => Ok(false),
            status if is_success(status) => Ok(true),
            _ => Err(Self::error_for(&url, response).await),
        }
    }
}
