//! Feed-type detection from raw bytes, before any real parsing.
//!
//! The classifier looks for format fingerprints in a bounded prefix of
//! the data. It never fails on malformed input: with complete data and
//! no fingerprint the answer is `NotAFeed`; with partial data and no
//! conclusive answer it is `Unknown`, which means "need more bytes",
//! not "give up".

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    Rss,
    Atom,
    JsonFeed,
    RssInJson,
    NotAFeed,
    Unknown,
}

/// Bytes of the prefix inspected for fingerprints. Feeds declare
/// themselves early; anything later is body text.
const DETECTION_WINDOW: usize = 4096;

/// Classify fully buffered data.
pub fn feed_type(data: &[u8]) -> FeedType {
    feed_type_with_partial(data, false)
}

/// Classify possibly truncated data. With `is_partial_data`, an
/// inconclusive scan yields `Unknown` unless the data is conclusively
/// HTML.
pub fn feed_type_with_partial(data: &[u8], is_partial_data: bool) -> FeedType {
    let prefix = decoded_prefix(data);
    let prefix = prefix.to_lowercase();

    if looks_like_json(&prefix) {
        if prefix.contains("jsonfeed.org/version/") {
            return FeedType::JsonFeed;
        }
        if prefix.contains("\"rss\"") && prefix.contains("\"channel\"") {
            return FeedType::RssInJson;
        }
        if is_partial_data {
            // The identifying keys may simply not have arrived yet.
            return FeedType::Unknown;
        }
        return FeedType::NotAFeed;
    }

    if prefix.contains("<rss") || prefix.contains("<rdf") {
        return FeedType::Rss;
    }
    if prefix.contains("<feed") {
        return FeedType::Atom;
    }

    if prefix.contains("<html") || prefix.contains("<!doctype html") {
        return FeedType::NotAFeed;
    }

    if is_partial_data {
        FeedType::Unknown
    } else {
        FeedType::NotAFeed
    }
}

/// Decode the detection window as text, skipping a UTF-8 BOM and
/// tolerating non-UTF-8 bytes.
fn decoded_prefix(data: &[u8]) -> Cow<'_, str> {
    let data = data.strip_prefix(b"\xef\xbb\xbf").unwrap_or(data);
    let window = &data[..data.len().min(DETECTION_WINDOW)];
    String::from_utf8_lossy(window)
}

fn looks_like_json(prefix: &str) -> bool {
    prefix.trim_start().starts_with('{')
}
