//! RSS 0.9x/2.0 parsing into the canonical model.
//!
//! The interesting part is guid handling. An RSS guid is defined to be a
//! permalink unless `isPermaLink="false"`, but feeds get this wrong in
//! both directions: non-URL guids marked as permalinks, and one fixed
//! guid reused across distinct items. A guid is promoted to the item URL
//! only when it is marked (or defaulted) as a permalink, plausibly looks
//! like a URL, and is unique within this parse pass.

use std::collections::HashMap;

use rss::Channel;
use url::Url;

use crate::app::error::FormatError;
use crate::domain::{ParsedAttachment, ParsedAuthor, ParsedFeed, ParsedItem};
use crate::parser::date::parse_date;
use crate::parser::entities::decoded_text_field;
use crate::parser::{calculated_unique_id, non_empty};

pub fn parse(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FormatError> {
    let channel = Channel::read_from(data).map_err(map_error)?;

    let mut feed = ParsedFeed::new(feed_url);
    feed.title = decoded_text_field(Some(channel.title()));
    feed.home_page_url = non_empty(channel.link());
    feed.description = decoded_text_field(Some(channel.description()));
    feed.language = channel.language().and_then(non_empty);

    // One pass to spot reused guids before promoting any of them.
    let mut guid_counts: HashMap<&str, usize> = HashMap::new();
    for item in channel.items() {
        if let Some(guid) = item.guid() {
            *guid_counts.entry(guid.value()).or_insert(0) += 1;
        }
    }

    let home_page = feed.home_page_url.clone();
    for item in channel.items() {
        if let Some(parsed) = parse_item(item, feed_url, home_page.as_deref(), &guid_counts) {
            feed.items.push(parsed);
        }
    }

    Ok(feed)
}

fn parse_item(
    item: &rss::Item,
    feed_url: &str,
    home_page: Option<&str>,
    guid_counts: &HashMap<&str, usize>,
) -> Option<ParsedItem> {
    let title = decoded_text_field(item.title());

    // content:encoded wins over description; both are markup.
    let content_html = item
        .content()
        .and_then(non_empty)
        .or_else(|| item.description().and_then(non_empty));

    // Malformed/empty items are dropped, not errors.
    if title.is_none() && content_html.is_none() {
        return None;
    }

    let external_url = item
        .link()
        .and_then(non_empty)
        .map(|link| url_string(&link, home_page, feed_url));

    let date_published = item
        .pub_date()
        .and_then(parse_date)
        .or_else(|| dublin_core_date(item));

    let mut authors = Vec::new();
    if let Some(email) = item.author().and_then(non_empty) {
        authors.push(ParsedAuthor {
            email_address: Some(email),
            ..Default::default()
        });
    }
    if let Some(dc) = item.dublin_core_ext() {
        for creator in dc.creators() {
            if let Some(name) = non_empty(creator) {
                authors.push(ParsedAuthor {
                    name: Some(name),
                    ..Default::default()
                });
            }
        }
    }

    let tags: Vec<String> = item
        .categories()
        .iter()
        .filter_map(|category| non_empty(category.name()))
        .collect();

    let attachments = parse_enclosure(item);

    let mut url = None;
    let guid = item.guid().filter(|g| !g.value().trim().is_empty());
    let unique_id = match guid {
        Some(guid) => {
            let guid_value = guid.value().trim();
            let reused = guid_counts.get(guid.value()).copied().unwrap_or(0) > 1;
            if guid.is_permalink() && !reused && string_is_probably_url(guid_value) {
                url = Some(url_string(guid_value, home_page, feed_url));
            }
            guid_value.to_string()
        }
        None => calculated_unique_id(
            date_published,
            title.as_deref(),
            external_url.as_deref(),
            authors.first().and_then(|a| a.email_address.as_deref()),
            attachments.first().map(|a| a.url.as_str()),
            content_html.as_deref(),
            None,
        ),
    };

    let mut parsed = ParsedItem::new(feed_url, &unique_id);
    parsed.url = url;
    parsed.external_url = external_url;
    parsed.title = title;
    parsed.content_html = content_html;
    parsed.date_published = date_published;
    parsed.authors = authors;
    parsed.tags = tags;
    parsed.attachments = attachments;
    Some(parsed)
}

fn dublin_core_date(item: &rss::Item) -> Option<chrono::DateTime<chrono::Utc>> {
    item.dublin_core_ext()?
        .dates()
        .first()
        .and_then(|date| parse_date(date))
}

fn parse_enclosure(item: &rss::Item) -> Vec<ParsedAttachment> {
    let Some(enclosure) = item.enclosure() else {
        return Vec::new();
    };
    if enclosure.url().is_empty() {
        return Vec::new();
    }
    vec![ParsedAttachment {
        url: enclosure.url().to_string(),
        mime_type: non_empty(enclosure.mime_type()),
        title: None,
        size_in_bytes: enclosure.length().parse().ok(),
        duration_in_seconds: None,
    }]
}

/// Guids that are just identifiers (integers, `tag:` URIs) must not be
/// promoted to URLs even when marked as permalinks.
fn string_is_probably_url(s: &str) -> bool {
    if !s.contains('/') {
        return false;
    }
    if s.to_lowercase().starts_with("tag:") {
        return false;
    }
    true
}

/// Best attempt at turning a string into a URL string: absolute URLs
/// pass through, everything else resolves against the home page (or the
/// feed URL). Not guaranteed to be valid — a best attempt, no heroics.
fn url_string(s: &str, home_page: Option<&str>, feed_url: &str) -> String {
    if s.to_lowercase().starts_with("http") {
        return s.to_string();
    }
    let base = home_page.unwrap_or(feed_url);
    match Url::parse(base).and_then(|base| base.join(s)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => s.to_string(),
    }
}

fn map_error(error: rss::Error) -> FormatError {
    match error {
        rss::Error::InvalidStartTag | rss::Error::Eof => FormatError::RootElementNotFound,
        other => FormatError::Xml(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example &amp; Sons</title>
    <link>https://example.com/</link>
    <description>A test feed</description>
    <language>en-us</language>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <guid>https://example.com/first-permalink</guid>
      <pubDate>Fri, 28 May 2010 21:03:38 +0000</pubDate>
      <description>Hello &lt;em&gt;world&lt;/em&gt;</description>
      <category>news</category>
      <enclosure url="https://example.com/audio.mp3" length="1234" type="audio/mpeg"/>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/second</link>
      <guid isPermaLink="false">some-identifier-2</guid>
      <author>writer@example.com</author>
    </item>
  </channel>
</rss>"#;

    const NO_GUID: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com/</link>
    <description>d</description>
    <item>
      <title>Stable item</title>
      <link>https://example.com/stable</link>
      <pubDate>Fri, 28 May 2010 21:03:38 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    const REUSED_GUID: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>https://example.com/</link>
    <description>d</description>
    <item>
      <title>One</title>
      <guid>https://example.com/fixed</guid>
    </item>
    <item>
      <title>Two</title>
      <guid>https://example.com/fixed</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_feed_metadata() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        assert_eq!(feed.title, Some("Example & Sons".into()));
        assert_eq!(feed.home_page_url, Some("https://example.com/".into()));
        assert_eq!(feed.language, Some("en-us".into()));
        assert_eq!(feed.items.len(), 2);
    }

    #[test]
    fn test_guid_promoted_to_url_when_permalink() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(item.unique_id, "https://example.com/first-permalink");
        assert_eq!(item.url, Some("https://example.com/first-permalink".into()));
        assert_eq!(item.external_url, Some("https://example.com/first".into()));
    }

    #[test]
    fn test_guid_not_promoted_when_not_permalink() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        let item = &feed.items[1];
        assert_eq!(item.unique_id, "some-identifier-2");
        assert_eq!(item.url, None);
    }

    #[test]
    fn test_reused_guid_never_promoted() {
        let feed = parse(REUSED_GUID.as_bytes(), "https://example.com/feed.xml").unwrap();
        assert_eq!(feed.items.len(), 2);
        for item in &feed.items {
            assert_eq!(item.unique_id, "https://example.com/fixed");
            assert_eq!(item.url, None, "reused guid must not resolve");
        }
    }

    #[test]
    fn test_missing_guid_hashes_deterministically() {
        let one = parse(NO_GUID.as_bytes(), "https://example.com/feed.xml").unwrap();
        let two = parse(NO_GUID.as_bytes(), "https://example.com/feed.xml").unwrap();
        assert_eq!(one.items[0].unique_id, two.items[0].unique_id);
        assert!(!one.items[0].unique_id.is_empty());
        assert!(one.items[0]
            .unique_id
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_dates_and_content() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(
            item.date_published.map(|d| d.to_rfc3339()),
            Some("2010-05-28T21:03:38+00:00".into())
        );
        assert_eq!(item.content_html, Some("Hello <em>world</em>".into()));
    }

    #[test]
    fn test_enclosure_and_category() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(item.tags, vec!["news".to_string()]);
        assert_eq!(item.attachments.len(), 1);
        assert_eq!(item.attachments[0].url, "https://example.com/audio.mp3");
        assert_eq!(item.attachments[0].size_in_bytes, Some(1234));
        assert_eq!(item.attachments[0].mime_type, Some("audio/mpeg".into()));
    }

    #[test]
    fn test_author_email() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/feed.xml").unwrap();
        let item = &feed.items[1];
        assert_eq!(item.authors.len(), 1);
        assert_eq!(
            item.authors[0].email_address,
            Some("writer@example.com".into())
        );
    }

    #[test]
    fn test_not_rss_is_error() {
        let err = parse(b"<feed xmlns=\"http://www.w3.org/2005/Atom\"/>", "u").unwrap_err();
        assert!(matches!(
            err,
            FormatError::RootElementNotFound | FormatError::Xml(_)
        ));
    }

    #[test]
    fn test_string_is_probably_url() {
        assert!(string_is_probably_url("https://example.com/a"));
        assert!(string_is_probably_url("/2010/05/post.html"));
        assert!(!string_is_probably_url("12345"));
        assert!(!string_is_probably_url("tag:example.com,2010:post"));
    }

    #[test]
    fn test_url_string_resolves_relative() {
        assert_eq!(
            url_string("/a/b", Some("https://example.com/"), "ignored"),
            "https://example.com/a/b"
        );
        assert_eq!(
            url_string("HTTPS://example.com/x", None, "f"),
            "HTTPS://example.com/x"
        );
    }
}
