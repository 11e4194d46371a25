//! JSON Feed (v1 and v1.1) parsing into the canonical model.
//!
//! Structural requirements are strict: the version must carry the
//! jsonfeed.org prefix, and `items` and `title` must be present.
//! Item-level problems are lenient: an item without an id or without
//! any content is dropped, never an error.

use serde_json::{Map, Value};

use crate::app::error::FormatError;
use crate::domain::{ParsedAttachment, ParsedAuthor, ParsedFeed, ParsedHub, ParsedItem};
use crate::parser::date::parse_date;
use crate::parser::entities::decoded_text_field;

const VERSION_PREFIX: &str = "https://jsonfeed.org/version/";

pub fn parse(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FormatError> {
    let root: Value = serde_json::from_slice(data).map_err(|_| FormatError::InvalidJson)?;
    let root = root.as_object().ok_or(FormatError::InvalidJson)?;

    let version = root
        .get("version")
        .and_then(Value::as_str)
        .ok_or(FormatError::JsonFeedVersionNotFound)?;
    if !version.starts_with(VERSION_PREFIX) {
        return Err(FormatError::JsonFeedVersionNotFound);
    }

    let items = root
        .get("items")
        .and_then(Value::as_array)
        .ok_or(FormatError::JsonFeedItemsNotFound)?;

    let title = root
        .get("title")
        .and_then(Value::as_str)
        .ok_or(FormatError::JsonFeedTitleNotFound)?;

    let mut feed = ParsedFeed::new(feed_url);
    feed.title = decoded_text_field(Some(title));
    feed.home_page_url = string_field(root, "home_page_url");
    feed.description = decoded_text_field(root.get("description").and_then(Value::as_str));
    feed.next_url = string_field(root, "next_url");
    feed.icon_url = string_field(root, "icon");
    feed.favicon_url = string_field(root, "favicon");
    feed.language = string_field(root, "language");
    feed.expired = root
        .get("expired")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    feed.authors = parse_authors(root);
    feed.hubs = parse_hubs(root);

    for item in items {
        if let Some(object) = item.as_object() {
            if let Some(parsed) = parse_item(object, feed_url) {
                feed.items.push(parsed);
            }
        }
    }

    Ok(feed)
}

fn parse_item(item: &Map<String, Value>, feed_url: &str) -> Option<ParsedItem> {
    let unique_id = coerced_id(item.get("id")?)?;

    let content_html = string_field(item, "content_html");
    let content_text = string_field(item, "content_text");
    // An item with nothing to render is dropped.
    if content_html.is_none() && content_text.is_none() {
        return None;
    }

    let mut parsed = ParsedItem::new(feed_url, &unique_id);
    parsed.content_html = content_html;
    parsed.content_text = content_text;
    parsed.url = string_field(item, "url");
    parsed.external_url = string_field(item, "external_url");
    parsed.title = decoded_text_field(item.get("title").and_then(Value::as_str));
    parsed.summary = decoded_text_field(item.get("summary").and_then(Value::as_str));
    parsed.image_url = string_field(item, "image");
    parsed.banner_image_url = string_field(item, "banner_image");
    parsed.date_published = item
        .get("date_published")
        .and_then(Value::as_str)
        .and_then(parse_date);
    parsed.date_modified = item
        .get("date_modified")
        .and_then(Value::as_str)
        .and_then(parse_date);
    parsed.authors = parse_authors(item);
    parsed.tags = item
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    parsed.attachments = parse_attachments(item);
    Some(parsed)
}

/// Ids are strings per the format, but numeric ids are widespread in
/// the wild and are coerced rather than dropped.
fn coerced_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// v1.1 `authors` wins over the v1 singular `author`.
fn parse_authors(object: &Map<String, Value>) -> Vec<ParsedAuthor> {
    if let Some(authors) = object.get("authors").and_then(Value::as_array) {
        return authors
            .iter()
            .filter_map(Value::as_object)
            .filter_map(parse_author)
            .collect();
    }
    object
        .get("author")
        .and_then(Value::as_object)
        .and_then(parse_author)
        .into_iter()
        .collect()
}

fn parse_author(author: &Map<String, Value>) -> Option<ParsedAuthor> {
    let author = ParsedAuthor {
        name: string_field(author, "name"),
        url: string_field(author, "url"),
        avatar_url: string_field(author, "avatar"),
        email_address: None,
    };
    if author.is_empty() {
        None
    } else {
        Some(author)
    }
}

fn parse_hubs(object: &Map<String, Value>) -> Vec<ParsedHub> {
    let Some(hubs) = object.get("hubs").and_then(Value::as_array) else {
        return Vec::new();
    };
    hubs.iter()
        .filter_map(Value::as_object)
        .filter_map(|hub| {
            Some(ParsedHub {
                hub_type: string_field(hub, "type")?,
                url: string_field(hub, "url")?,
            })
        })
        .collect()
}

fn parse_attachments(item: &Map<String, Value>) -> Vec<ParsedAttachment> {
    let Some(attachments) = item.get("attachments").and_then(Value::as_array) else {
        return Vec::new();
    };
    attachments
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|attachment| {
            Some(ParsedAttachment {
                url: string_field(attachment, "url")?,
                mime_type: string_field(attachment, "mime_type"),
                title: string_field(attachment, "title"),
                size_in_bytes: attachment.get("size_in_bytes").and_then(Value::as_i64),
                duration_in_seconds: attachment.get("duration_in_seconds").and_then(Value::as_i64),
            })
        })
        .collect()
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let value = object.get(key)?.as_str()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
