//! The statuses table and its in-memory cache.
//!
//! Status rows exist independently of article rows so that read state
//! survives an article dropping out of its feed and reappearing later.
//! A row is created at most once per article ID; `date_arrived` is set
//! at creation and never changes afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::app::error::Result;
use crate::domain::{ArticleStatus, StatusKey};
use crate::store::lookup::placeholders;

/// Cache of every status seen this session. The cache is authoritative
/// over the database: once a status is cached, later fetches and
/// creations must not replace it.
#[derive(Default)]
pub struct StatusCache {
    statuses: Mutex<HashMap<String, ArticleStatus>>,
}

impl StatusCache {
    /// Insert `status` unless one is already cached for its article,
    /// returning whichever is now cached.
    pub fn add_if_not_cached(&self, status: ArticleStatus) -> ArticleStatus {
        let mut statuses = self.lock();
        statuses
            .entry(status.article_id.clone())
            .or_insert(status)
            .clone()
    }

    pub fn get(&self, article_id: &str) -> Option<ArticleStatus> {
        self.lock().get(article_id).cloned()
    }

    /// Replace the cached status. Only for writes that already hit the
    /// database.
    fn update(&self, status: ArticleStatus) {
        self.lock().insert(status.article_id.clone(), status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ArticleStatus>> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default)]
pub struct StatusesTable {
    cache: StatusCache,
}

impl StatusesTable {
    /// Guarantee a status row exists for every ID, creating missing
    /// ones with `read = read_by_default` and `date_arrived = now`.
    /// Returns the status for every requested ID.
    pub fn ensure_statuses(
        &self,
        connection: &Connection,
        article_ids: &[String],
        read_by_default: bool,
        now: DateTime<Utc>,
    ) -> Result<HashMap<String, ArticleStatus>> {
        let mut result = HashMap::new();
        let mut missing: Vec<&String> = Vec::new();
        for article_id in article_ids {
            match self.cache.get(article_id) {
                Some(status) => {
                    result.insert(article_id.clone(), status);
                }
                None => missing.push(article_id),
            }
        }

        if !missing.is_empty() {
            for status in self.fetch_statuses(connection, &missing)? {
                let status = self.cache.add_if_not_cached(status);
                result.insert(status.article_id.clone(), status);
            }
        }

        let to_create: Vec<&&String> = missing
            .iter()
            .filter(|id| !result.contains_key(id.as_str()))
            .collect();
        if !to_create.is_empty() {
            debug!(count = to_create.len(), "creating status rows");
        }
        for article_id in to_create {
            connection.execute(
                "INSERT OR IGNORE INTO statuses (article_id, read, starred, date_arrived)
                 VALUES (?1, ?2, 0, ?3)",
                params![article_id, read_by_default, now],
            )?;
            let status =
                ArticleStatus::new((*article_id).clone(), read_by_default, now);
            let status = self.cache.add_if_not_cached(status);
            result.insert(status.article_id.clone(), status);
        }

        Ok(result)
    }

    /// Set `key` to `flag` for the given articles. Returns the statuses
    /// that actually changed; articles already in the requested state
    /// are skipped.
    pub fn mark(
        &self,
        connection: &Connection,
        article_ids: &[String],
        key: StatusKey,
        flag: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ArticleStatus>> {
        // Marking unseen articles still works: rows are created first.
        // Read state for brand-new rows defaults to false so a mark-read
        // registers as a change.
        let statuses = self.ensure_statuses(connection, article_ids, false, now)?;

        let mut changed = Vec::new();
        for article_id in article_ids {
            let Some(status) = statuses.get(article_id) else {
                continue;
            };
            if status.flag(key) == flag {
                continue;
            }
            let mut updated = status.clone();
            updated.set_flag(key, flag);
            let sql = match key {
                StatusKey::Read => "UPDATE statuses SET read = ?1 WHERE article_id = ?2",
                StatusKey::Starred => "UPDATE statuses SET starred = ?1 WHERE article_id = ?2",
            };
            connection.execute(sql, params![flag, article_id])?;
            self.cache.update(updated.clone());
            changed.push(updated);
        }
        Ok(changed)
    }

    pub fn fetch_unread_article_ids(&self, connection: &Connection) -> Result<HashSet<String>> {
        self.fetch_article_ids(connection, "SELECT article_id FROM statuses WHERE read = 0")
    }

    pub fn fetch_starred_article_ids(&self, connection: &Connection) -> Result<HashSet<String>> {
        self.fetch_article_ids(connection, "SELECT article_id FROM statuses WHERE starred = 1")
    }

    fn fetch_statuses(
        &self,
        connection: &Connection,
        article_ids: &[&String],
    ) -> Result<Vec<ArticleStatus>> {
        let sql = format!(
            "SELECT article_id, read, starred, date_arrived FROM statuses
             WHERE article_id IN ({})",
            placeholders(article_ids.len())
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(
            rusqlite::params_from_iter(article_ids.iter()),
            |row| {
                Ok(ArticleStatus {
                    article_id: row.get(0)?,
                    read: row.get(1)?,
                    starred: row.get(2)?,
                    date_arrived: row.get(3)?,
                })
            },
        )?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    fn fetch_article_ids(&self, connection: &Connection, sql: &str) -> Result<HashSet<String>> {
        let mut statement = connection.prepare(sql)?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::queue::open_connection;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_ensure_creates_once() {
        let connection = open_connection(None).unwrap();
        let table = StatusesTable::default();

        let statuses = table
            .ensure_statuses(&connection, &ids(&["a1", "a2"]), false, now())
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses["a1"].read);
        assert_eq!(statuses["a1"].date_arrived, now());

        // A second ensure with a different default and time changes
        // nothing.
        let later = now() + chrono::Duration::days(1);
        let statuses = table
            .ensure_statuses(&connection, &ids(&["a1"]), true, later)
            .unwrap();
        assert!(!statuses["a1"].read);
        assert_eq!(statuses["a1"].date_arrived, now());
    }

    #[test]
    fn test_date_arrived_immutable_across_cache_miss() {
        let connection = open_connection(None).unwrap();
        {
            let table = StatusesTable::default();
            table
                .ensure_statuses(&connection, &ids(&["a1"]), false, now())
                .unwrap();
        }
        // Fresh table, cold cache: the row comes back from the
        // database with its original arrival date.
        let table = StatusesTable::default();
        let later = now() + chrono::Duration::days(2);
        let statuses = table
            .ensure_statuses(&connection, &ids(&["a1"]), true, later)
            .unwrap();
        assert_eq!(statuses["a1"].date_arrived, now());
    }

    #[test]
    fn test_mark_returns_only_changes() {
        let connection = open_connection(None).unwrap();
        let table = StatusesTable::default();
        table
            .ensure_statuses(&connection, &ids(&["a1", "a2"]), false, now())
            .unwrap();

        let changed = table
            .mark(&connection, &ids(&["a1", "a2"]), StatusKey::Read, true, now())
            .unwrap();
        assert_eq!(changed.len(), 2);

        // Second identical mark: no-op.
        let changed = table
            .mark(&connection, &ids(&["a1", "a2"]), StatusKey::Read, true, now())
            .unwrap();
        assert!(changed.is_empty());

        let changed = table
            .mark(&connection, &ids(&["a1"]), StatusKey::Read, false, now())
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert!(!changed[0].read);
    }

    #[test]
    fn test_mark_persists() {
        let connection = open_connection(None).unwrap();
        let table = StatusesTable::default();
        table
            .ensure_statuses(&connection, &ids(&["a1"]), false, now())
            .unwrap();
        table
            .mark(&connection, &ids(&["a1"]), StatusKey::Starred, true, now())
            .unwrap();

        let starred: bool = connection
            .query_row(
                "SELECT starred FROM statuses WHERE article_id = 'a1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(starred);
    }

    #[test]
    fn test_unread_and_starred_fetches() {
        let connection = open_connection(None).unwrap();
        let table = StatusesTable::default();
        table
            .ensure_statuses(&connection, &ids(&["a1", "a2", "a3"]), false, now())
            .unwrap();
        table
            .mark(&connection, &ids(&["a1"]), StatusKey::Read, true, now())
            .unwrap();
        table
            .mark(&connection, &ids(&["a2"]), StatusKey::Starred, true, now())
            .unwrap();

        let unread = table.fetch_unread_article_ids(&connection).unwrap();
        assert_eq!(unread, ["a2", "a3"].iter().map(|s| s.to_string()).collect());

        let starred = table.fetch_starred_article_ids(&connection).unwrap();
        assert_eq!(starred, ["a2"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn test_cache_add_if_not_cached() {
        let cache = StatusCache::default();
        let original = ArticleStatus::new("a1".into(), false, now());
        let cached = cache.add_if_not_cached(original.clone());
        assert_eq!(cached, original);

        let mut competing = original.clone();
        competing.read = true;
        let cached = cache.add_if_not_cached(competing);
        // The first entry wins.
        assert!(!cached.read);
    }
}
