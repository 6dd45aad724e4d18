// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use url::Url;

use crate::error::FeedError;

/// Represents a parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub description: Option<String>,
    /// Website of the show
    pub link: Option<Url>,
    pub image_url: Option<Url>,
    pub language: Option<String>,
    /// Channel and iTunes categories, deduplicated and sorted
    pub tags: Vec<String>,
    pub feed_url: Url,
    /// Episodes, newest first
    pub episodes: Vec<EpisodeEntry>,
}

/// Represents a single feed entry
#[derive(Debug, Clone)]
pub struct EpisodeEntry {
    pub title: String,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub enclosure: Enclosure,
}

/// Represents the audio file attached to an episode
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: Url,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// Parse RSS (or Atom) feed bytes into a Podcast
///
/// Every entry must have a title and an audio URL; a single bad entry fails
/// the whole feed.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let mut podcast = match rss::Channel::read_from(xml_bytes) {
        Ok(channel) => parse_channel(&channel, feed_url)?,
        Err(rss::Error::InvalidStartTag) => parse_atom(xml_bytes, feed_url)?,
        Err(e) => return Err(e.into()),
    };

    order_newest_first(&mut podcast.episodes);
    Ok(podcast)
}

fn parse_channel(channel: &rss::Channel, feed_url: Url) -> Result<Podcast, FeedError> {
    let title = non_empty(channel.title()).ok_or(FeedError::MissingTitle)?;

    let episodes = channel
        .items()
        .iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    let itunes = channel.itunes_ext();

    let image_url = channel
        .image()
        .and_then(|img| Url::parse(img.url()).ok())
        .or_else(|| {
            itunes
                .and_then(|ext| ext.image())
                .and_then(|url| Url::parse(url).ok())
        });

    let description = non_empty(channel.description()).or_else(|| {
        itunes.and_then(|ext| {
            ext.subtitle()
                .and_then(non_empty)
                .or_else(|| ext.summary().and_then(non_empty))
        })
    });

    let mut tags: BTreeSet<String> = channel
        .categories()
        .iter()
        .filter_map(|c| non_empty(c.name()))
        .collect();
    if let Some(ext) = itunes {
        for category in ext.categories() {
            tags.extend(non_empty(category.text()));
            if let Some(sub) = category.subcategory() {
                tags.extend(non_empty(sub.text()));
            }
        }
    }

    Ok(Podcast {
        title,
        description,
        link: Url::parse(channel.link()).ok(),
        image_url,
        language: channel.language().and_then(non_empty),
        tags: tags.into_iter().collect(),
        feed_url,
        episodes,
    })
}

fn parse_item(index: usize, item: &rss::Item) -> Result<EpisodeEntry, FeedError> {
    let title = item
        .title()
        .and_then(non_empty)
        .ok_or(FeedError::MissingEpisodeTitle { index })?;

    let enclosure = item
        .enclosure()
        .filter(|e| !e.url().trim().is_empty())
        .ok_or_else(|| FeedError::MissingEnclosure {
            title: title.clone(),
        })?;

    let enclosure_url = Url::parse(enclosure.url().trim())?;

    let pub_date = item.pub_date().and_then(parse_date);

    let itunes = item.itunes_ext();

    let description = item
        .description()
        .and_then(non_empty)
        .or_else(|| itunes.and_then(|ext| ext.summary()).and_then(non_empty));

    Ok(EpisodeEntry {
        title,
        description,
        pub_date,
        duration_seconds: itunes.and_then(|ext| ext.duration()).and_then(parse_duration),
        enclosure: Enclosure {
            url: enclosure_url,
            length: enclosure.length().parse().ok(),
            mime_type: non_empty(enclosure.mime_type()),
        },
    })
}

fn parse_atom(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let feed = feed_rs::parser::parse(xml_bytes)?;

    let title = feed
        .title
        .as_ref()
        .and_then(|t| non_empty(&t.content))
        .ok_or(FeedError::MissingTitle)?;

    let episodes = feed
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_atom_entry(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let link = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .and_then(|l| Url::parse(&l.href).ok());

    let image_url = feed
        .logo
        .as_ref()
        .or(feed.icon.as_ref())
        .and_then(|img| Url::parse(&img.uri).ok());

    let tags: BTreeSet<String> = feed
        .categories
        .iter()
        .filter_map(|c| non_empty(&c.term))
        .collect();

    Ok(Podcast {
        title,
        description: feed.description.as_ref().and_then(|t| non_empty(&t.content)),
        link,
        image_url,
        language: feed.language.as_deref().and_then(non_empty),
        tags: tags.into_iter().collect(),
        feed_url,
        episodes,
    })
}

fn parse_atom_entry(
    index: usize,
    entry: &feed_rs::model::Entry,
) -> Result<EpisodeEntry, FeedError> {
    let title = entry
        .title
        .as_ref()
        .and_then(|t| non_empty(&t.content))
        .ok_or(FeedError::MissingEpisodeTitle { index })?;

    let link_enclosure = entry.links.iter().find(|l| {
        l.rel.as_deref() == Some("enclosure")
            || l.media_type.as_deref().is_some_and(|m| m.starts_with("audio/"))
    });
    let media = entry.media.first();
    let media_content = media.and_then(|m| m.content.iter().find(|c| c.url.is_some()));

    let enclosure = match (link_enclosure, media_content) {
        (Some(link), _) => Enclosure {
            url: Url::parse(link.href.trim())?,
            length: link.length,
            mime_type: link.media_type.clone(),
        },
        (None, Some(content)) => Enclosure {
            url: content
                .url
                .clone()
                .ok_or_else(|| FeedError::MissingEnclosure {
                    title: title.clone(),
                })?,
            length: content.size,
            mime_type: content.content_type.as_ref().map(|m| m.to_string()),
        },
        (None, None) => return Err(FeedError::MissingEnclosure { title }),
    };

    let duration_seconds = media
        .and_then(|m| m.duration.or_else(|| m.content.first().and_then(|c| c.duration)))
        .map(|d| d.as_secs());

    Ok(EpisodeEntry {
        title,
        description: entry.summary.as_ref().and_then(|t| non_empty(&t.content)),
        pub_date: entry.published.or(entry.updated),
        duration_seconds,
        enclosure,
    })
}

/// Keep feed order unless every entry is dated, then sort newest first
fn order_newest_first(episodes: &mut [EpisodeEntry]) {
    if episodes.iter().all(|e| e.pub_date.is_some()) {
        episodes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a publication date, normalised to UTC
fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .ok()
        .or_else(|| parse_relaxed_date(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            // No offset at all: assume UTC
            NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
}

/// Parse an iTunes duration (`HH:MM:SS`, `MM:SS` or plain seconds)
fn parse_duration(duration_str: &str) -> Option<u64> {
    let parts = duration_str
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>();

    let seconds = match parts.as_deref() {
        Ok([s]) => Some(*s),
        Ok([m, s]) => m.checked_mul(60).and_then(|m| m.checked_add(*s)),
        Ok([h, m, s]) => h
            .checked_mul(3600)
            .zip(m.checked_mul(60))
            .and_then(|(h, m)| h.checked_add(m))
            .and_then(|hm| hm.checked_add(*s)),
        _ => None,
    };

    if seconds.is_none() {
        tracing::debug!(duration = duration_str, "Unrecognized duration format");
    }
    seconds
}
