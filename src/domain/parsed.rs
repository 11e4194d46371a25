use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Transient output of a single feed parse. Never persisted as-is;
/// consumed immediately by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub home_page_url: Option<String>,
    pub feed_url: String,
    pub description: Option<String>,
    pub next_url: Option<String>,
    pub icon_url: Option<String>,
    pub favicon_url: Option<String>,
    pub language: Option<String>,
    pub authors: Vec<ParsedAuthor>,
    pub expired: bool,
    pub hubs: Vec<ParsedHub>,
    pub items: Vec<ParsedItem>,
}

impl ParsedFeed {
    pub fn new(feed_url: &str) -> Self {
        Self {
            feed_url: feed_url.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    /// Identity assigned by a remote aggregator. When present it takes
    /// precedence over the locally derived article ID.
    pub sync_service_id: Option<String>,
    /// Feed-local identity, either from the source or derived by hashing.
    /// Always non-empty.
    pub unique_id: String,
    pub feed_url: String,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub authors: Vec<ParsedAuthor>,
    pub tags: Vec<String>,
    pub attachments: Vec<ParsedAttachment>,
}

impl ParsedItem {
    pub fn new(feed_url: &str, unique_id: &str) -> Self {
        Self {
            unique_id: unique_id.to_string(),
            feed_url: feed_url.to_string(),
            ..Default::default()
        }
    }

    /// Stable article identity: the sync service's ID when one exists,
    /// otherwise a digest of the feed ID and the feed-local unique ID.
    /// Stable across re-fetches of the same feed.
    pub fn article_id(&self, feed_id: &str) -> String {
        match &self.sync_service_id {
            Some(id) => id.clone(),
            None => sha256_hex(&[feed_id, " ", &self.unique_id]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedAuthor {
    pub name: Option<String>,
    pub url: Option<String>,
    pub avatar_url: Option<String>,
    pub email_address: Option<String>,
}

impl ParsedAuthor {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.avatar_url.is_none()
            && self.email_address.is_none()
    }

    /// Deterministic ID derived from the author's fields, used as the
    /// primary key of the authors table and in the author lookup table.
    pub fn author_id(&self) -> String {
        sha256_hex(&[
            self.name.as_deref().unwrap_or_default(),
            self.url.as_deref().unwrap_or_default(),
            self.avatar_url.as_deref().unwrap_or_default(),
            self.email_address.as_deref().unwrap_or_default(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedHub {
    pub hub_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedAttachment {
    pub url: String,
    pub mime_type: Option<String>,
    pub title: Option<String>,
    pub size_in_bytes: Option<i64>,
    pub duration_in_seconds: Option<i64>,
}

/// SHA-256 over the concatenated parts, hex-encoded.
pub(crate) fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
