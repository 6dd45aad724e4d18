use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::error::DownloadError;
use crate::http::{ByteStream, HttpClient, is_success};

/// Audio source opened for streaming
pub struct SourceStream {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

/// Request the audio and wait for the response headers
///
/// Gives up after `timeout` without a response, and on non-2xx statuses.
pub async fn open_source<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<SourceStream, DownloadError> {
    let response = tokio::time::timeout(timeout, client.get_stream(url))
        .await
        .map_err(|_| DownloadError::Timeout {
            url: url.to_string(),
            after: timeout,
        })?
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !is_success(response.status) {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(SourceStream {
        content_length: response.content_length,
        content_type: response.content_type,
        body: response.body,
    })
}

/// Callback receiving the running byte count
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Default)]
struct TapState {
    bytes: u64,
    hasher: Sha256,
    failure: Option<DownloadError>,
}

/// Observer attached to a source stream on its way into the object store
///
/// Counts and hashes every chunk that passes through and remembers whether
/// the stream ended because the source failed, so a failed `put` can be
/// blamed on the right side.
#[derive(Clone)]
pub struct SourceTap {
    state: Arc<Mutex<TapState>>,
}

impl SourceTap {
    /// Bytes that have passed through so far
    pub fn bytes(&self) -> u64 {
        self.lock().bytes
    }

    /// `sha256:<hex>` of the bytes that have passed through
    pub fn content_hash(&self) -> String {
        let hasher = self.lock().hasher.clone();
        format!("sha256:{:x}", hasher.finalize())
    }

    /// The source failure that ended the stream, if any
    pub fn take_failure(&self) -> Option<DownloadError> {
        self.lock().failure.take()
    }

    fn lock(&self) -> MutexGuard<'_, TapState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wrap `body` so every chunk is counted, hashed and reported
///
/// A source that stays silent for longer than `idle` ends the stream with a
/// timeout. Source errors end the stream too; in both cases the failure is
/// recorded on the returned tap.
pub fn tap_source(
    body: ByteStream,
    url: &str,
    idle: Duration,
    on_progress: ProgressFn,
) -> (ByteStream, SourceTap) {
    let tap = SourceTap {
        state: Arc::new(Mutex::new(TapState::default())),
    };
    let observer = tap.clone();
    let url = url.to_string();

    let stream = futures::stream::unfold(Some(body), move |body| {
        let tap = observer.clone();
        let url = url.clone();
        let on_progress = on_progress.clone();

        async move {
            let mut body = body?;
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let total = record_chunk(&tap, &chunk);
                    on_progress(total);
                    Some((Ok(chunk), Some(body)))
                }
                Ok(Some(Err(e))) => {
                    tap.lock().failure = Some(DownloadError::StreamFailed {
                        url,
                        reason: e.to_string(),
                    });
                    Some((Err(e), None))
                }
                Ok(None) => None,
                Err(_) => {
                    tap.lock().failure = Some(DownloadError::Timeout { url, after: idle });
                    let err = std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("source idle for {idle:?}"),
                    );
                    Some((Err(err), None))
                }
            }
        }
    });

    (Box::pin(stream), tap)
}

fn record_chunk(tap: &SourceTap, chunk: &Bytes) -> u64 {
    let mut state = tap.lock();
    state.bytes += chunk.len() as u64;
    state.hasher.update(chunk);
    state.bytes
}
