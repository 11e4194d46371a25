//! # Tributary
//!
//! The syndication core of a feed reader: feed parsing, article
//! identity, persistence, and the ledger of status changes awaiting
//! delivery to a sync service.
//!
//! ## Architecture
//!
//! ```text
//! bytes → Parser → Resolver → Store ⇄ Sync ledger
//! ```
//!
//! - [`parser`]: format detection plus RSS, Atom, JSON Feed and
//!   RSS-in-JSON parsers producing one canonical model
//! - [`resolver`]: turns parsed items into durable articles and diffs
//!   them against what is stored
//! - [`store`]: SQLite persistence behind a serialized queue
//!
//! ## Quick Start
//!
//! ```no_run
//! use tributary::app::AppContext;
//! use tributary::domain::StatusKey;
//!
//! # fn main() -> tributary::app::Result<()> {
//! let context = AppContext::in_memory()?;
//! let data = std::fs::read("feed.xml")?;
//! let report = context.ingest_feed("feed-1", "https://example.com/feed.xml", &data)?;
//!
//! let ids: Vec<String> = report
//!     .new_articles
//!     .iter()
//!     .map(|article| article.article_id.clone())
//!     .collect();
//! context.mark_articles(ids, StatusKey::Read, true)?;
//!
//! // Later, a sync pass uploads the pending changes.
//! let batch = context.claim_pending()?;
//! # let _ = batch;
//! # Ok(())
//! # }
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires together the store, the sync
/// ledger and the configuration.
pub mod app;

/// Configuration, read from `~/.config/tributary/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`ParsedFeed`](domain::ParsedFeed) / [`ParsedItem`](domain::ParsedItem):
///   transient parse output
/// - [`Article`](domain::Article): the durable record, with
///   identity-based equality
/// - [`ArticleStatus`](domain::ArticleStatus) / [`SyncStatus`](domain::SyncStatus):
///   read/starred state and pending sync changes
pub mod domain;

/// Feed parsing.
///
/// [`feed_type`](parser::feed_type) fingerprints raw bytes;
/// [`parse_feed`](parser::parse_feed) dispatches to the right format
/// parser. Includes the two-grammar date parser and HTML entity
/// decoding for human-readable fields.
pub mod parser;

/// Parsed items → durable articles.
///
/// Assigns article identity, rejects implausible future dates, and
/// produces per-column [`ChangeSet`](domain::ChangeSet)s so refetches
/// write only what changed.
pub mod resolver;

/// SQLite persistence.
///
/// - [`DatabaseQueue`](store::DatabaseQueue): one worker thread owns
///   the connection; suspendable
/// - [`ArticleStore`](store::ArticleStore): articles, statuses, and
///   relation lookup tables
/// - [`SyncLedger`](store::SyncLedger): pending status changes with a
///   claim/confirm/release protocol
pub mod store;
