//! The articles table: the ingest path for parsed items and the fetch
//! path back out.
//!
//! `update_articles` is the heart of the store. Feeds resend all their
//! items on every fetch, so the update path is built around diffing:
//! unchanged items touch nothing, new items insert, and changed items
//! rewrite only the columns that differ.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::app::error::{Result, TributaryError};
use crate::domain::{Article, ArticleStatus, ChangeSet, ParsedAuthor, ParsedItem, StatusKey};
use crate::resolver::{changes, max_allowed_date, resolve_article};
use crate::store::lookup::{placeholders, DatabaseLookupTable};
use crate::store::statuses::StatusesTable;

/// Outcome of one ingest pass.
#[derive(Debug, Default)]
pub struct ArticleChanges {
    pub new_articles: Vec<Article>,
    pub updated_articles: Vec<(Article, ChangeSet)>,
}

impl ArticleChanges {
    pub fn is_empty(&self) -> bool {
        self.new_articles.is_empty() && self.updated_articles.is_empty()
    }
}

pub struct ArticlesTable {
    pub(crate) statuses: StatusesTable,
    authors_lookup: DatabaseLookupTable,
    tags_lookup: DatabaseLookupTable,
}

impl Default for ArticlesTable {
    fn default() -> Self {
        Self {
            statuses: StatusesTable::default(),
            authors_lookup: DatabaseLookupTable::new("author_lookup", "article_id", "author_id"),
            tags_lookup: DatabaseLookupTable::new("tag_lookup", "article_id", "tag"),
        }
    }
}

impl ArticlesTable {
    /// Ingest the items of one feed fetch. Status rows are ensured
    /// before anything else, so every stored article has one. Returns
    /// what actually changed; an all-duplicates fetch returns an empty
    /// change report and writes nothing.
    pub fn update_articles(
        &self,
        connection: &mut Connection,
        account_id: &str,
        feed_id: &str,
        items: &[ParsedItem],
        now: DateTime<Utc>,
    ) -> Result<ArticleChanges> {
        let article_ids: Vec<String> = items.iter().map(|item| item.article_id(feed_id)).collect();
        let cutoff = max_allowed_date(now);

        let transaction = connection.transaction()?;
        let statuses = self
            .statuses
            .ensure_statuses(&transaction, &article_ids, false, now)?;
        let existing = self.fetch_articles_by_ids(&transaction, account_id, &article_ids)?;

        let mut report = ArticleChanges::default();
        for item in items {
            let article_id = item.article_id(feed_id);
            let Some(status) = statuses.get(&article_id) else {
                continue;
            };
            let incoming = resolve_article(item, account_id, feed_id, status.clone(), cutoff);

            match existing.get(&article_id) {
                None => {
                    self.insert_article(&transaction, &incoming)?;
                    self.save_authors(&transaction, &incoming)?;
                    self.save_tags(&transaction, &incoming)?;
                    report.new_articles.push(incoming);
                }
                Some(stored) => {
                    let set = changes(stored, &incoming);
                    if let Some(set) = &set {
                        apply_changes(&transaction, account_id, &article_id, set)?;
                    }
                    // Authors replace only when the feed still sends
                    // some; a feed that drops its authors is assumed
                    // to be wrong about that.
                    if !incoming.authors.is_empty() && incoming.authors != stored.authors {
                        self.save_authors(&transaction, &incoming)?;
                    }
                    if incoming.tags != stored.tags {
                        self.save_tags(&transaction, &incoming)?;
                    }
                    if let Some(set) = set {
                        report.updated_articles.push((incoming, set));
                    }
                }
            }
        }
        transaction.commit()?;

        if !report.is_empty() {
            info!(
                feed_id,
                new = report.new_articles.len(),
                updated = report.updated_articles.len(),
                "articles updated"
            );
        }
        Ok(report)
    }

    pub fn fetch_articles_for_feed(
        &self,
        connection: &Connection,
        account_id: &str,
        feed_id: &str,
    ) -> Result<Vec<Article>> {
        let sql = format!("{ARTICLE_SELECT} WHERE a.account_id = ?1 AND a.feed_id = ?2");
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query(params![account_id, feed_id])?;
        let mut articles = Vec::new();
        while let Some(row) = rows.next()? {
            articles.push(article_from_row(row)?);
        }
        self.attach_relations(connection, &mut articles)?;
        Ok(articles)
    }

    pub fn fetch_articles_by_ids(
        &self,
        connection: &Connection,
        account_id: &str,
        article_ids: &[String],
    ) -> Result<HashMap<String, Article>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "{ARTICLE_SELECT} WHERE a.account_id = ?1 AND a.article_id IN ({})",
            shifted_placeholders(article_ids.len(), 2)
        );
        let mut statement = connection.prepare(&sql)?;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&account_id];
        for id in article_ids {
            values.push(id);
        }
        let mut rows = statement.query(values.as_slice())?;
        let mut articles = Vec::new();
        while let Some(row) = rows.next()? {
            articles.push(article_from_row(row)?);
        }
        self.attach_relations(connection, &mut articles)?;
        Ok(articles
            .into_iter()
            .map(|article| (article.article_id.clone(), article))
            .collect())
    }

    pub fn fetch_unread_article_ids(&self, connection: &Connection) -> Result<HashSet<String>> {
        self.statuses.fetch_unread_article_ids(connection)
    }

    pub fn fetch_starred_article_ids(&self, connection: &Connection) -> Result<HashSet<String>> {
        self.statuses.fetch_starred_article_ids(connection)
    }

    pub fn mark(
        &self,
        connection: &Connection,
        article_ids: &[String],
        key: StatusKey,
        flag: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ArticleStatus>> {
        self.statuses.mark(connection, article_ids, key, flag, now)
    }

    /// Per-feed unread counts for one account. Feeds with nothing
    /// unread are absent.
    pub fn unread_counts(
        &self,
        connection: &Connection,
        account_id: &str,
    ) -> Result<HashMap<String, i64>> {
        let mut statement = connection.prepare(
            "SELECT a.feed_id, count(*) FROM articles a
             JOIN statuses s ON s.article_id = a.article_id
             WHERE a.account_id = ?1 AND s.read = 0
             GROUP BY a.feed_id",
        )?;
        let rows = statement.query_map(params![account_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = HashMap::new();
        for row in rows {
            let (feed_id, count) = row?;
            counts.insert(feed_id, count);
        }
        Ok(counts)
    }

    /// Delete article rows and their relation rows. Status rows are
    /// kept: read state must survive an article leaving its feed and
    /// coming back.
    pub fn delete_articles(
        &self,
        connection: &Connection,
        account_id: &str,
        article_ids: &[String],
    ) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        debug!(count = article_ids.len(), "deleting articles");
        let sql = format!(
            "DELETE FROM articles WHERE account_id = ?1 AND article_id IN ({})",
            shifted_placeholders(article_ids.len(), 2)
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&account_id];
        for id in article_ids {
            values.push(id);
        }
        connection.execute(&sql, values.as_slice())?;
        self.authors_lookup.remove_owners(connection, article_ids)?;
        self.tags_lookup.remove_owners(connection, article_ids)?;
        Ok(())
    }

    fn insert_article(&self, connection: &Connection, article: &Article) -> Result<()> {
        connection.execute(
            "INSERT OR REPLACE INTO articles
             (article_id, account_id, feed_id, unique_id, title, content_html, content_text,
              url, external_url, summary, image_url, banner_image_url,
              date_published, date_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                article.article_id,
                article.account_id,
                article.feed_id,
                article.unique_id,
                article.title,
                article.content_html,
                article.content_text,
                article.url,
                article.external_url,
                article.summary,
                article.image_url,
                article.banner_image_url,
                article.date_published,
                article.date_modified,
            ],
        )?;
        Ok(())
    }

    fn save_authors(&self, connection: &Connection, article: &Article) -> Result<()> {
        let mut author_ids = HashSet::new();
        for author in &article.authors {
            let author_id = author.author_id();
            connection.execute(
                "INSERT OR REPLACE INTO authors (author_id, name, url, avatar_url, email_address)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    author_id,
                    author.name,
                    author.url,
                    author.avatar_url,
                    author.email_address
                ],
            )?;
            author_ids.insert(author_id);
        }
        self.authors_lookup
            .save_related_ids(connection, &article.article_id, &author_ids)
    }

    fn save_tags(&self, connection: &Connection, article: &Article) -> Result<()> {
        let tags: HashSet<String> = article.tags.iter().cloned().collect();
        self.tags_lookup
            .save_related_ids(connection, &article.article_id, &tags)
    }

    /// Fill in authors and tags for freshly decoded article rows.
    fn attach_relations(&self, connection: &Connection, articles: &mut [Article]) -> Result<()> {
        if articles.is_empty() {
            return Ok(());
        }
        let article_ids: Vec<String> = articles
            .iter()
            .map(|article| article.article_id.clone())
            .collect();

        let mut authors = fetch_authors(connection, &article_ids)?;
        let mut tags = self.tags_lookup.fetch_related_ids(connection, &article_ids)?;
        for article in articles {
            if let Some(article_authors) = authors.remove(&article.article_id) {
                article.authors = article_authors;
            }
            if let Some(article_tags) = tags.remove(&article.article_id) {
                let mut sorted: Vec<String> = article_tags.into_iter().collect();
                sorted.sort();
                article.tags = sorted;
            }
        }
        Ok(())
    }
}

const ARTICLE_SELECT: &str = "SELECT a.article_id, a.account_id, a.feed_id, a.unique_id, a.title,
        a.content_html, a.content_text, a.url, a.external_url, a.summary,
        a.image_url, a.banner_image_url, a.date_published, a.date_modified,
        s.read, s.starred, s.date_arrived
 FROM articles a LEFT JOIN statuses s ON s.article_id = a.article_id";

fn article_from_row(row: &Row<'_>) -> Result<Article> {
    let article_id: String = row.get(0)?;
    let read: Option<bool> = row.get(14)?;
    let starred: Option<bool> = row.get(15)?;
    let date_arrived: Option<DateTime<Utc>> = row.get(16)?;

    // Every article row is created after its status row; a missing
    // status means the database was modified out from under us.
    let (Some(read), Some(starred), Some(date_arrived)) = (read, starred, date_arrived) else {
        return Err(TributaryError::MissingColumn("statuses.article_id"));
    };

    Ok(Article {
        account_id: row.get(1)?,
        feed_id: row.get(2)?,
        unique_id: row.get(3)?,
        title: row.get(4)?,
        content_html: row.get(5)?,
        content_text: row.get(6)?,
        url: row.get(7)?,
        external_url: row.get(8)?,
        summary: row.get(9)?,
        image_url: row.get(10)?,
        banner_image_url: row.get(11)?,
        date_published: row.get(12)?,
        date_modified: row.get(13)?,
        authors: Vec::new(),
        tags: Vec::new(),
        status: ArticleStatus {
            article_id: article_id.clone(),
            read,
            starred,
            date_arrived,
        },
        article_id,
    })
}

/// Write only the columns a change set names. An empty-string entry
/// clears the column to NULL.
fn apply_changes(
    connection: &Connection,
    account_id: &str,
    article_id: &str,
    set: &ChangeSet,
) -> Result<()> {
    let mut assignments: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    let mut push_string = |column: &str, value: &Option<String>| {
        if let Some(value) = value {
            assignments.push(format!("{column} = ?{}", assignments.len() + 1));
            if value.is_empty() {
                values.push(SqlValue::Null);
            } else {
                values.push(SqlValue::Text(value.clone()));
            }
        }
    };
    push_string("unique_id", &set.unique_id);
    push_string("title", &set.title);
    push_string("content_html", &set.content_html);
    push_string("content_text", &set.content_text);
    push_string("url", &set.url);
    push_string("external_url", &set.external_url);
    push_string("summary", &set.summary);
    push_string("image_url", &set.image_url);
    push_string("banner_image_url", &set.banner_image_url);

    let mut push_date = |column: &str, value: Option<DateTime<Utc>>| {
        if let Some(value) = value {
            assignments.push(format!("{column} = ?{}", assignments.len() + 1));
            values.push(SqlValue::Text(value.to_rfc3339()));
        }
    };
    push_date("date_published", set.date_published);
    push_date("date_modified", set.date_modified);

    if assignments.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "UPDATE articles SET {} WHERE account_id = ?{} AND article_id = ?{}",
        assignments.join(", "),
        values.len() + 1,
        values.len() + 2,
    );
    values.push(SqlValue::Text(account_id.to_string()));
    values.push(SqlValue::Text(article_id.to_string()));
    connection.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(())
}

fn fetch_authors(
    connection: &Connection,
    article_ids: &[String],
) -> Result<HashMap<String, Vec<ParsedAuthor>>> {
    let sql = format!(
        "SELECT l.article_id, au.name, au.url, au.avatar_url, au.email_address
         FROM author_lookup l JOIN authors au ON au.author_id = l.author_id
         WHERE l.article_id IN ({})
         ORDER BY l.article_id, au.author_id",
        placeholders(article_ids.len())
    );
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query(rusqlite::params_from_iter(article_ids.iter()))?;
    let mut authors: HashMap<String, Vec<ParsedAuthor>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let article_id: String = row.get(0)?;
        authors.entry(article_id).or_default().push(ParsedAuthor {
            name: row.get(1)?,
            url: row.get(2)?,
            avatar_url: row.get(3)?,
            email_address: row.get(4)?,
        });
    }
    Ok(authors)
}

/// `?N, ?N+1, ...`, for IN clauses that follow earlier parameters.
fn shifted_placeholders(count: usize, start: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
