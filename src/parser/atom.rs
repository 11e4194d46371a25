//! Atom parsing into the canonical model.
//!
//! Atom is the easy one: entry ids are mandatory and serve directly as
//! unique ids, and dates are RFC 3339. The only judgement call is link
//! selection, where `rel="alternate"` (or no rel at all) marks the
//! permalink.

use atom_syndication::{Entry, Feed, Link};
use chrono::Utc;

use crate::app::error::FormatError;
use crate::domain::{ParsedAuthor, ParsedFeed, ParsedItem};
use crate::parser::entities::decoded_text_field;
use crate::parser::non_empty;

pub fn parse(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FormatError> {
    let atom = Feed::read_from(data).map_err(map_error)?;

    let mut feed = ParsedFeed::new(feed_url);
    feed.title = decoded_text_field(Some(atom.title().as_str()));
    feed.home_page_url = alternate_link(atom.links());
    feed.description = atom
        .subtitle()
        .and_then(|subtitle| decoded_text_field(Some(subtitle.as_str())));

    for entry in atom.entries() {
        if let Some(item) = parse_entry(entry, feed_url) {
            feed.items.push(item);
        }
    }

    Ok(feed)
}

fn parse_entry(entry: &Entry, feed_url: &str) -> Option<ParsedItem> {
    let title = decoded_text_field(Some(entry.title().as_str()));

    let content_html = entry
        .content()
        .and_then(|content| content.value())
        .and_then(non_empty)
        .or_else(|| {
            entry
                .summary()
                .and_then(|summary| non_empty(summary.as_str()))
        });

    if title.is_none() && content_html.is_none() {
        return None;
    }

    let unique_id = entry.id().trim();
    if unique_id.is_empty() {
        return None;
    }

    let mut item = ParsedItem::new(feed_url, unique_id);
    item.title = title;
    item.content_html = content_html;
    item.url = alternate_link(entry.links());
    item.date_published = entry
        .published()
        .or(Some(entry.updated()))
        .map(|date| date.with_timezone(&Utc));
    item.date_modified = Some(entry.updated().with_timezone(&Utc));

    for person in entry.authors() {
        let author = ParsedAuthor {
            name: non_empty(person.name()),
            email_address: person.email().and_then(non_empty),
            url: person.uri().and_then(non_empty),
            ..Default::default()
        };
        if !author.is_empty() {
            item.authors.push(author);
        }
    }

    item.tags = entry
        .categories()
        .iter()
        .filter_map(|category| non_empty(category.term()))
        .collect();

    Some(item)
}

/// The permalink is the link whose rel is `alternate`, with an
/// unspecified rel meaning the same thing. Falls back to the first link.
fn alternate_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel() == "alternate" || link.rel().is_empty())
        .or_else(|| links.first())
        .and_then(|link| non_empty(link.href()))
}

fn map_error(error: atom_syndication::Error) -> FormatError {
    match error {
        atom_syndication::Error::InvalidStartTag | atom_syndication::Error::Eof => {
            FormatError::RootElementNotFound
        }
        other => FormatError::Xml(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom &amp; Co</title>
  <subtitle>Posts about things</subtitle>
  <link rel="alternate" type="text/html" href="https://example.com/"/>
  <link rel="self" href="https://example.com/atom.xml"/>
  <id>https://example.com/</id>
  <updated>2010-05-28T21:03:38Z</updated>
  <entry>
    <title>An entry</title>
    <id>tag:example.com,2010:entry-1</id>
    <link rel="alternate" href="https://example.com/entry-1"/>
    <published>2010-05-28T21:03:38Z</published>
    <updated>2010-06-01T08:00:00Z</updated>
    <author>
      <name>Jo Writer</name>
      <email>jo@example.com</email>
    </author>
    <category term="essays"/>
    <content type="html">&lt;p&gt;Body.&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Updated only</title>
    <id>tag:example.com,2010:entry-2</id>
    <link href="https://example.com/entry-2"/>
    <updated>2010-06-02T09:30:00Z</updated>
    <summary>Short take.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_feed_metadata() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        assert_eq!(feed.title, Some("Example Atom & Co".into()));
        assert_eq!(feed.home_page_url, Some("https://example.com/".into()));
        assert_eq!(feed.description, Some("Posts about things".into()));
        assert_eq!(feed.items.len(), 2);
    }

    #[test]
    fn test_entry_identity_and_link() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(item.unique_id, "tag:example.com,2010:entry-1");
        assert_eq!(item.url, Some("https://example.com/entry-1".into()));
        assert_eq!(item.content_html, Some("<p>Body.</p>".into()));
    }

    #[test]
    fn test_published_and_updated() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(
            item.date_published.map(|d| d.to_rfc3339()),
            Some("2010-05-28T21:03:38+00:00".into())
        );
        assert_eq!(
            item.date_modified.map(|d| d.to_rfc3339()),
            Some("2010-06-01T08:00:00+00:00".into())
        );
    }

    #[test]
    fn test_updated_fills_in_for_missing_published() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        let item = &feed.items[1];
        assert_eq!(
            item.date_published.map(|d| d.to_rfc3339()),
            Some("2010-06-02T09:30:00+00:00".into())
        );
    }

    #[test]
    fn test_relless_link_is_permalink() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        assert_eq!(
            feed.items[1].url,
            Some("https://example.com/entry-2".into())
        );
    }

    #[test]
    fn test_author_and_category() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        let item = &feed.items[0];
        assert_eq!(item.authors.len(), 1);
        assert_eq!(item.authors[0].name, Some("Jo Writer".into()));
        assert_eq!(item.authors[0].email_address, Some("jo@example.com".into()));
        assert_eq!(item.tags, vec!["essays".to_string()]);
    }

    #[test]
    fn test_summary_is_content_fallback() {
        let feed = parse(SAMPLE.as_bytes(), "https://example.com/atom.xml").unwrap();
        assert_eq!(feed.items[1].content_html, Some("Short take.".into()));
    }

    #[test]
    fn test_not_atom_is_error() {
        assert!(parse(b"<rss version=\"2.0\"/>", "u").is_err());
    }
}
