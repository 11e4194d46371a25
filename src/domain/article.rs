use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ParsedAuthor;

/// The durable article record. Identity is `(account_id, article_id)`;
/// two values with equal identity are the same article no matter what
/// their other fields hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub account_id: String,
    pub article_id: String,
    pub feed_id: String,
    pub unique_id: String,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub authors: Vec<ParsedAuthor>,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.account_id == other.account_id && self.article_id == other.article_id
    }
}

impl Eq for Article {}

impl Hash for Article {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.account_id.hash(state);
        self.article_id.hash(state);
    }
}

impl Article {
    /// The item's best publish-sort key: date_published, falling back to
    /// date_modified. None means "use arrival time" downstream.
    pub fn sort_date(&self) -> Option<DateTime<Utc>> {
        self.date_published.or(self.date_modified)
    }
}

/// Read/starred state, owned independently of article content.
/// Created exactly once per article ID; `date_arrived` is fixed at
/// creation and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStatus {
    pub article_id: String,
    pub read: bool,
    pub starred: bool,
    pub date_arrived: DateTime<Utc>,
}

impl ArticleStatus {
    pub fn new(article_id: String, read: bool, date_arrived: DateTime<Utc>) -> Self {
        Self {
            article_id,
            read,
            starred: false,
            date_arrived,
        }
    }

    pub fn flag(&self, key: StatusKey) -> bool {
        match key {
            StatusKey::Read => self.read,
            StatusKey::Starred => self.starred,
        }
    }

    pub fn set_flag(&mut self, key: StatusKey, flag: bool) {
        match key {
            StatusKey::Read => self.read = flag,
            StatusKey::Starred => self.starred = flag,
        }
    }
}

/// The kind of a status flag, also used as the ledger's column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKey {
    Read,
    Starred,
}

impl StatusKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKey::Read => "read",
            StatusKey::Starred => "starred",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read" => Some(StatusKey::Read),
            "starred" => Some(StatusKey::Starred),
            _ => None,
        }
    }
}

/// A pending local status change awaiting delivery to a remote sync
/// service. At most one row exists per `(article_id, key)`; `selected`
/// marks a row claimed by an in-flight sync operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncStatus {
    pub article_id: String,
    pub key: StatusKey,
    pub flag: bool,
    pub selected: bool,
}

impl SyncStatus {
    pub fn new(article_id: String, key: StatusKey, flag: bool) -> Self {
        Self {
            article_id,
            key,
            flag,
            selected: false,
        }
    }
}

/// Field-level diff between a freshly resolved article and its stored
/// version. Only changed fields are present; a string field set to the
/// empty string records a clear. Empty change set means nothing to write.
///
/// Date fields are never cleared: a feed that stops sending a known date
/// is assumed to be doing so in error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub unique_id: Option<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub date_published: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        *self == ChangeSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn article(account_id: &str, article_id: &str, title: Option<&str>) -> Article {
        Article {
            account_id: account_id.into(),
            article_id: article_id.into(),
            feed_id: "feed-1".into(),
            unique_id: "u1".into(),
            title: title.map(Into::into),
            content_html: None,
            content_text: None,
            url: None,
            external_url: None,
            summary: None,
            image_url: None,
            banner_image_url: None,
            date_published: None,
            date_modified: None,
            authors: Vec::new(),
            tags: Vec::new(),
            status: ArticleStatus::new(article_id.into(), false, Utc::now()),
        }
    }

    #[test]
    fn test_equality_is_identity_based() {
        let a = article("acct", "a1", Some("One title"));
        let b = article("acct", "a1", Some("A different title"));
        assert_eq!(a, b);

        let c = article("other-acct", "a1", Some("One title"));
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_follows_identity() {
        let a = article("acct", "a1", Some("One title"));
        let b = article("acct", "a1", Some("A different title"));
        let set: HashSet<Article> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_status_flags() {
        let mut status = ArticleStatus::new("a1".into(), false, Utc::now());
        assert!(!status.flag(StatusKey::Read));
        status.set_flag(StatusKey::Read, true);
        assert!(status.flag(StatusKey::Read));
        assert!(!status.flag(StatusKey::Starred));
        status.set_flag(StatusKey::Starred, true);
        assert!(status.flag(StatusKey::Starred));
    }

    #[test]
    fn test_status_key_round_trip() {
        assert_eq!(StatusKey::from_str("read"), Some(StatusKey::Read));
        assert_eq!(StatusKey::from_str("starred"), Some(StatusKey::Starred));
        assert_eq!(StatusKey::from_str("bogus"), None);
        assert_eq!(StatusKey::Read.as_str(), "read");
    }

    #[test]
    fn test_empty_changeset() {
        assert!(ChangeSet::default().is_empty());
        let changes = ChangeSet {
            title: Some("New".into()),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
