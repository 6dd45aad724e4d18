// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::{HttpClient, is_success};

use super::parse::{Podcast, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
///
/// Fails on transport errors, non-2xx statuses, or when the whole exchange
/// takes longer than `timeout`.
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Bytes, FeedError> {
    let response = tokio::time::timeout(timeout, client.get_bytes(url))
        .await
        .map_err(|_| FeedError::Timeout {
            url: url.to_string(),
            after: timeout,
        })?
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !is_success(response.status) {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}

/// Fetch and parse a podcast feed from a URL
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Podcast, FeedError> {
    let feed_url = Url::parse(url)?;
    let bytes = fetch_feed_bytes(client, url, timeout).await?;
    parse_feed(&bytes, feed_url)
}
