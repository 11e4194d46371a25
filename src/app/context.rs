use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::app::error::{Result, TributaryError};
use crate::config::Config;
use crate::domain::{StatusKey, SyncStatus};
use crate::parser::parse_feed;
use crate::store::{ArticleChanges, ArticleStore, DatabaseQueue, SyncLedger};

/// Everything a caller needs: the store, the sync ledger, and the
/// configuration they were built from.
pub struct AppContext {
    pub store: ArticleStore,
    pub ledger: SyncLedger,
    pub config: Config,
}

impl AppContext {
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        Self::with_config(db_path, Config::load()?)
    }

    pub fn with_config(db_path: Option<PathBuf>, config: Config) -> Result<Self> {
        let db_path = match db_path.or_else(|| config.database_path.clone()) {
            Some(path) => path,
            None => Self::default_db_path()?,
        };
        info!(path = %db_path.display(), "opening article database");
        let queue = Arc::new(DatabaseQueue::open(&db_path)?);
        let context = Self::from_queue(queue, config);
        // A crash between claim and confirm leaves rows claimed by a
        // pass that no longer exists; put them back.
        context.ledger.release_all()?;
        Ok(context)
    }

    pub fn in_memory() -> Result<Self> {
        let queue = Arc::new(DatabaseQueue::open_in_memory()?);
        Ok(Self::from_queue(queue, Config::default()))
    }

    fn from_queue(queue: Arc<DatabaseQueue>, config: Config) -> Self {
        Self {
            store: ArticleStore::new(Arc::clone(&queue)),
            ledger: SyncLedger::new(queue),
            config,
        }
    }

    /// Parse raw feed bytes and ingest the result under `feed_id`.
    pub fn ingest_feed(&self, feed_id: &str, feed_url: &str, data: &[u8]) -> Result<ArticleChanges> {
        let parsed = parse_feed(data, feed_url)?;
        self.store
            .update_articles(&self.config.account_id, feed_id, parsed.items)
    }

    /// Mark articles and record the resulting changes in the ledger, so
    /// a later sync pass can deliver them.
    pub fn mark_articles(
        &self,
        article_ids: Vec<String>,
        key: StatusKey,
        flag: bool,
    ) -> Result<usize> {
        let changed = self.store.mark(article_ids, key, flag)?;
        if changed.is_empty() {
            return Ok(0);
        }
        let pending: Vec<SyncStatus> = changed
            .iter()
            .map(|status| SyncStatus::new(status.article_id.clone(), key, status.flag(key)))
            .collect();
        let count = pending.len();
        self.ledger.record(pending)?;
        Ok(count)
    }

    /// Claim the next batch of pending sync changes, sized by
    /// configuration.
    pub fn claim_pending(&self) -> Result<Vec<SyncStatus>> {
        self.ledger.claim_batch(self.config.sync_batch_limit)
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TributaryError::Config("Could not find data directory".into()))?;
        let tributary_dir = data_dir.join("tributary");
        std::fs::create_dir_all(&tributary_dir)?;
        Ok(tributary_dir.join("tributary.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "version": "https://jsonfeed.org/version/1.1",
        "title": "Test",
        "items": [
            {"id": "1", "title": "One", "content_html": "<p>1</p>"}
        ]
    }"#;

    #[test]
    fn test_ingest_and_mark() {
        let context = AppContext::in_memory().unwrap();
        let report = context
            .ingest_feed("feed-1", "https://example.com/feed.json", FEED.as_bytes())
            .unwrap();
        assert_eq!(report.new_articles.len(), 1);

        let article_id = report.new_articles[0].article_id.clone();
        let recorded = context
            .mark_articles(vec![article_id], StatusKey::Read, true)
            .unwrap();
        assert_eq!(recorded, 1);
        assert_eq!(context.ledger.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_redundant_mark_records_nothing() {
        let context = AppContext::in_memory().unwrap();
        let report = context
            .ingest_feed("feed-1", "https://example.com/feed.json", FEED.as_bytes())
            .unwrap();
        let article_id = report.new_articles[0].article_id.clone();

        context
            .mark_articles(vec![article_id.clone()], StatusKey::Read, true)
            .unwrap();
        let recorded = context
            .mark_articles(vec![article_id], StatusKey::Read, true)
            .unwrap();
        assert_eq!(recorded, 0);
        assert_eq!(context.ledger.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_claim_uses_configured_limit() {
        let context = AppContext::in_memory().unwrap();
        assert_eq!(context.config.sync_batch_limit, 100);
        assert!(context.claim_pending().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_releases_claims_left_by_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.db");

        {
            let context =
                AppContext::with_config(Some(path.clone()), Config::default()).unwrap();
            let report = context
                .ingest_feed("feed-1", "https://example.com/feed.json", FEED.as_bytes())
                .unwrap();
            let article_id = report.new_articles[0].article_id.clone();
            context
                .mark_articles(vec![article_id], StatusKey::Read, true)
                .unwrap();
            let batch = context.claim_pending().unwrap();
            assert_eq!(batch.len(), 1);
            // Dropped without confirm or release, as a crash would.
        }

        let context = AppContext::with_config(Some(path), Config::default()).unwrap();
        let batch = context.claim_pending().unwrap();
        assert_eq!(batch.len(), 1, "the stranded claim is pending again");
    }

    #[test]
    fn test_file_backed_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.db");
        let context =
            AppContext::with_config(Some(path.clone()), Config::default()).unwrap();
        context
            .ingest_feed("feed-1", "https://example.com/feed.json", FEED.as_bytes())
            .unwrap();
        drop(context);
        assert!(path.exists());
    }
}
