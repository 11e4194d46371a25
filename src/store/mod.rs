//! Persistence: a serialized SQLite queue, the articles and statuses
//! tables, relation lookup tables, and the sync ledger.

pub mod articles;
pub mod lookup;
pub mod queue;
pub mod statuses;
pub mod sync_ledger;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::app::error::Result;
use crate::domain::{Article, ArticleStatus, ParsedItem, StatusKey, SyncStatus};

pub use articles::{ArticleChanges, ArticlesTable};
pub use lookup::DatabaseLookupTable;
pub use queue::DatabaseQueue;
pub use statuses::{StatusCache, StatusesTable};
pub use sync_ledger::SyncStatusTable;

/// The article store: every read and write goes through the shared
/// [`DatabaseQueue`]. Clone-cheap; clones share the queue and caches.
#[derive(Clone)]
pub struct ArticleStore {
    queue: Arc<DatabaseQueue>,
    articles: Arc<ArticlesTable>,
}

impl ArticleStore {
    pub fn new(queue: Arc<DatabaseQueue>) -> Self {
        Self {
            queue,
            articles: Arc::new(ArticlesTable::default()),
        }
    }

    /// Ingest one feed fetch. See [`ArticlesTable::update_articles`].
    pub fn update_articles(
        &self,
        account_id: &str,
        feed_id: &str,
        items: Vec<ParsedItem>,
    ) -> Result<ArticleChanges> {
        let articles = Arc::clone(&self.articles);
        let account_id = account_id.to_string();
        let feed_id = feed_id.to_string();
        let now = Utc::now();
        self.queue.run_sync(move |connection| {
            articles.update_articles(connection, &account_id, &feed_id, &items, now)
        })
    }

    pub fn fetch_articles_for_feed(&self, account_id: &str, feed_id: &str) -> Result<Vec<Article>> {
        let articles = Arc::clone(&self.articles);
        let account_id = account_id.to_string();
        let feed_id = feed_id.to_string();
        self.queue.run_sync(move |connection| {
            articles.fetch_articles_for_feed(connection, &account_id, &feed_id)
        })
    }

    pub fn fetch_articles(
        &self,
        account_id: &str,
        article_ids: Vec<String>,
    ) -> Result<HashMap<String, Article>> {
        let articles = Arc::clone(&self.articles);
        let account_id = account_id.to_string();
        self.queue.run_sync(move |connection| {
            articles.fetch_articles_by_ids(connection, &account_id, &article_ids)
        })
    }

    pub fn fetch_unread_article_ids(&self) -> Result<HashSet<String>> {
        let articles = Arc::clone(&self.articles);
        self.queue
            .run_sync(move |connection| articles.fetch_unread_article_ids(connection))
    }

    pub fn fetch_starred_article_ids(&self) -> Result<HashSet<String>> {
        let articles = Arc::clone(&self.articles);
        self.queue
            .run_sync(move |connection| articles.fetch_starred_article_ids(connection))
    }

    /// Set a status flag, returning the statuses that actually changed.
    pub fn mark(
        &self,
        article_ids: Vec<String>,
        key: StatusKey,
        flag: bool,
    ) -> Result<Vec<ArticleStatus>> {
        let articles = Arc::clone(&self.articles);
        let now = Utc::now();
        self.queue.run_sync(move |connection| {
            articles.mark(connection, &article_ids, key, flag, now)
        })
    }

    /// Fire-and-forget mark, for callers that do not need the changed
    /// statuses back.
    pub fn mark_async(&self, article_ids: Vec<String>, key: StatusKey, flag: bool) -> Result<()> {
        let articles = Arc::clone(&self.articles);
        let now = Utc::now();
        self.queue.run_async(move |connection| {
            articles.mark(connection, &article_ids, key, flag, now)?;
            Ok(())
        })
    }

    pub fn unread_counts(&self, account_id: &str) -> Result<HashMap<String, i64>> {
        let articles = Arc::clone(&self.articles);
        let account_id = account_id.to_string();
        self.queue
            .run_sync(move |connection| articles.unread_counts(connection, &account_id))
    }

    pub fn delete_articles(&self, account_id: &str, article_ids: Vec<String>) -> Result<()> {
        let articles = Arc::clone(&self.articles);
        let account_id = account_id.to_string();
        self.queue.run_sync(move |connection| {
            articles.delete_articles(connection, &account_id, &article_ids)
        })
    }

    /// Stop accepting database work, e.g. when the app is backgrounded.
    pub fn suspend(&self) {
        self.queue.suspend();
    }

    pub fn resume(&self) {
        self.queue.resume();
    }
}

/// Pending sync changes, sharing the store's queue.
#[derive(Clone)]
pub struct SyncLedger {
    queue: Arc<DatabaseQueue>,
    table: Arc<SyncStatusTable>,
}

impl SyncLedger {
    pub fn new(queue: Arc<DatabaseQueue>) -> Self {
        Self {
            queue,
            table: Arc::new(SyncStatusTable),
        }
    }

    /// Record local changes for later upload. Statuses are usually the
    /// changed ones returned by [`ArticleStore::mark`].
    pub fn record(&self, statuses: Vec<SyncStatus>) -> Result<()> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.insert_statuses(connection, &statuses))
    }

    /// Claim a batch of pending changes for an upload pass.
    pub fn claim_batch(&self, limit: usize) -> Result<Vec<SyncStatus>> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.select_for_processing(connection, limit))
    }

    /// The given articles' claimed changes were delivered; forget them.
    /// Claimed rows for other articles stay claimed.
    pub fn confirm(&self, article_ids: Vec<String>) -> Result<()> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.delete_selected(connection, &article_ids))
    }

    /// Delivery failed; put the claimed rows back.
    pub fn release(&self, article_ids: Vec<String>) -> Result<()> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.reset_selected(connection, &article_ids))
    }

    pub fn release_all(&self) -> Result<()> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.reset_all_selected(connection))
    }

    pub fn pending_count(&self) -> Result<i64> {
        let table = Arc::clone(&self.table);
        self.queue
            .run_sync(move |connection| table.pending_count(connection))
    }
}
