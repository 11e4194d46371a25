//! RSS-in-JSON parsing: the RSS 2.0 object model serialized as JSON.
//!
//! Structure is `{"rss": {"channel": {...}}}`, with items under the
//! channel's `item` key. Real-world producers disagree on details, so
//! items are accepted as a single object or an array, under `item` or
//! `items`, and at the channel or the root.

use serde_json::{Map, Value};

use crate::app::error::FormatError;
use crate::domain::{ParsedAttachment, ParsedAuthor, ParsedFeed, ParsedItem};
use crate::parser::date::parse_date;
use crate::parser::entities::decoded_text_field;
use crate::parser::calculated_unique_id;

pub fn parse(data: &[u8], feed_url: &str) -> Result<ParsedFeed, FormatError> {
    let root: Value = serde_json::from_slice(data).map_err(|_| FormatError::InvalidJson)?;
    let root = root.as_object().ok_or(FormatError::InvalidJson)?;

    let channel = root
        .get("rss")
        .and_then(Value::as_object)
        .and_then(|rss| rss.get("channel"))
        .and_then(Value::as_object)
        .ok_or(FormatError::RssChannelNotFound)?;

    let items = items_value(channel)
        .or_else(|| items_value(root))
        .ok_or(FormatError::RssItemsNotFound)?;

    let mut feed = ParsedFeed::new(feed_url);
    feed.title = decoded_text_field(channel.get("title").and_then(Value::as_str));
    feed.home_page_url = string_field(channel, "link");
    feed.description = decoded_text_field(channel.get("description").and_then(Value::as_str));
    feed.language = string_field(channel, "language");

    for item in &items {
        if let Some(object) = item.as_object() {
            if let Some(parsed) = parse_item(object, feed_url) {
                feed.items.push(parsed);
            }
        }
    }

    Ok(feed)
}

/// Items live under `item` (as the format draft has it) or `items`, as
/// either an array or a single bare object.
fn items_value(object: &Map<String, Value>) -> Option<Vec<Value>> {
    let value = object.get("item").or_else(|| object.get("items"))?;
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(_) => Some(vec![value.clone()]),
        _ => None,
    }
}

fn parse_item(item: &Map<String, Value>, feed_url: &str) -> Option<ParsedItem> {
    let title = decoded_text_field(item.get("title").and_then(Value::as_str));

    // The description is HTML when it contains markup, plain text
    // otherwise. There is no way to know for sure; `<` is the tell.
    let mut content_html = None;
    let mut content_text = None;
    if let Some(description) = string_field(item, "description") {
        if description.contains('<') {
            content_html = Some(description);
        } else {
            content_text = Some(description);
        }
    }

    if title.is_none() && content_html.is_none() && content_text.is_none() {
        return None;
    }

    let url = string_field(item, "link");
    let date_published = item
        .get("pubDate")
        .and_then(Value::as_str)
        .and_then(parse_date);

    let mut authors = Vec::new();
    if let Some(email) = string_field(item, "author") {
        authors.push(ParsedAuthor {
            email_address: Some(email),
            ..Default::default()
        });
    }

    let tags = parse_categories(item);
    let attachments = parse_enclosure(item);

    let unique_id = match string_field(item, "guid") {
        Some(guid) => guid,
        None => calculated_unique_id(
            date_published,
            title.as_deref(),
            url.as_deref(),
            authors.first().and_then(|a| a.email_address.as_deref()),
            attachments.first().map(|a| a.url.as_str()),
            content_html.as_deref(),
            content_text.as_deref(),
        ),
    };

    let mut parsed = ParsedItem::new(feed_url, &unique_id);
    parsed.title = title;
    parsed.url = url;
    parsed.content_html = content_html;
    parsed.content_text = content_text;
    parsed.date_published = date_published;
    parsed.authors = authors;
    parsed.tags = tags;
    parsed.attachments = attachments;
    Some(parsed)
}

/// A category is a string, a `{"#value": ...}` object, or an array of
/// either.
fn parse_categories(item: &Map<String, Value>) -> Vec<String> {
    let Some(value) = item.get("category") else {
        return Vec::new();
    };
    match value {
        Value::Array(values) => values.iter().filter_map(category_name).collect(),
        single => category_name(single).into_iter().collect(),
    }
}

fn category_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.trim(),
        Value::Object(object) => object.get("#value")?.as_str()?.trim(),
        _ => return None,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_enclosure(item: &Map<String, Value>) -> Vec<ParsedAttachment> {
    let Some(enclosure) = item.get("enclosure").and_then(Value::as_object) else {
        return Vec::new();
    };
    let Some(url) = string_field(enclosure, "url") else {
        return Vec::new();
    };
    // Producers emit length as either a number or a string.
    let size_in_bytes = match enclosure.get("length") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    vec![ParsedAttachment {
        url,
        mime_type: string_field(enclosure, "type"),
        title: None,
        size_in_bytes,
        duration_in_seconds: None,
    }]
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    let value = object.get(key)?.as_str()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
