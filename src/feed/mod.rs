mod fetch;
mod parse;

pub use fetch::{fetch_feed, fetch_feed_bytes};
pub use parse::{Enclosure, EpisodeEntry, Podcast, parse_feed};
