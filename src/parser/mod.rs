//! Feed parsing: format detection plus one parser per syndication
//! format, all producing the same canonical [`ParsedFeed`] model.

pub mod atom;
pub mod date;
pub mod entities;
pub mod feed_type;
pub mod json_feed;
pub mod rss;
pub mod rss_in_json;

use chrono::{DateTime, Utc};
use tracing::debug;

pub use date::parse_date;
pub use entities::{decode_entities, decoded_text_field};
pub use feed_type::{feed_type, feed_type_with_partial, FeedType};

use crate::app::error::FormatError;
use crate::domain::parsed::sha256_hex;
use crate::domain::ParsedFeed;

/// Detect the format of `data` and parse it with the matching parser.
pub fn parse_feed(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FormatError> {
    let detected = feed_type(data);
    debug!(feed_url, ?detected, "parsing feed");
    match detected {
        FeedType::Rss => rss::parse(data, feed_url),
        FeedType::Atom => atom::parse(data, feed_url),
        FeedType::JsonFeed => json_feed::parse(data, feed_url),
        FeedType::RssInJson => rss_in_json::parse(data, feed_url),
        FeedType::NotAFeed | FeedType::Unknown => Err(FormatError::NotAFeed),
    }
}

/// Derived unique id for items whose feed supplies none, digesting the
/// fields most likely to be stable across fetches. Content is used only
/// when nothing else is available, since content edits would then
/// change the item's identity.
pub(crate) fn calculated_unique_id(
    date_published: Option<DateTime<Utc>>,
    title: Option<&str>,
    url: Option<&str>,
    author_email: Option<&str>,
    attachment_url: Option<&str>,
    content_html: Option<&str>,
    content_text: Option<&str>,
) -> String {
    let mut s = String::new();
    if let Some(date) = date_published {
        s.push_str(&date.timestamp().to_string());
    }
    s.push_str(title.unwrap_or_default());
    s.push_str(url.unwrap_or_default());
    s.push_str(author_email.unwrap_or_default());
    s.push_str(attachment_url.unwrap_or_default());
    if s.is_empty() {
        s.push_str(content_text.or(content_html).unwrap_or_default());
    }
    sha256_hex(&[&s])
}

pub(crate) fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
