//! Many-to-many lookup tables (article/author, article/tag) with a
//! negative cache.
//!
//! Most articles have no authors and no tags, so the common case of a
//! relationship fetch is an empty result. Owners known to have no rows
//! are remembered and skipped on later fetches; saves and removals keep
//! the cache honest.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::trace;

use crate::app::error::Result;

pub struct DatabaseLookupTable {
    table: &'static str,
    owner_key: &'static str,
    related_key: &'static str,
    owners_with_no_relations: Mutex<HashSet<String>>,
}

impl DatabaseLookupTable {
    pub fn new(table: &'static str, owner_key: &'static str, related_key: &'static str) -> Self {
        Self {
            table,
            owner_key,
            related_key,
            owners_with_no_relations: Mutex::new(HashSet::new()),
        }
    }

    /// Related IDs for each owner, keyed by owner. Owners with no
    /// relations are absent from the result and enter the negative
    /// cache.
    pub fn fetch_related_ids(
        &self,
        connection: &Connection,
        owner_ids: &[String],
    ) -> Result<HashMap<String, HashSet<String>>> {
        let to_fetch: Vec<&String> = {
            let cache = self.lock_cache();
            owner_ids.iter().filter(|id| !cache.contains(*id)).collect()
        };
        if to_fetch.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT {owner}, {related} FROM {table} WHERE {owner} IN ({vars})",
            owner = self.owner_key,
            related = self.related_key,
            table = self.table,
            vars = placeholders(to_fetch.len()),
        );
        let mut statement = connection.prepare(&sql)?;
        let mut rows = statement.query(rusqlite::params_from_iter(to_fetch.iter()))?;

        let mut result: HashMap<String, HashSet<String>> = HashMap::new();
        while let Some(row) = rows.next()? {
            let owner: String = row.get(0)?;
            let related: String = row.get(1)?;
            result.entry(owner).or_default().insert(related);
        }

        let mut cache = self.lock_cache();
        for owner in to_fetch {
            if !result.contains_key(owner.as_str()) {
                cache.insert(owner.clone());
            }
        }
        Ok(result)
    }

    /// Make the stored relations for `owner_id` exactly `related_ids`,
    /// touching only rows that differ.
    pub fn save_related_ids(
        &self,
        connection: &Connection,
        owner_id: &str,
        related_ids: &HashSet<String>,
    ) -> Result<()> {
        let current = self.related_ids_for_owner(connection, owner_id)?;
        if current == *related_ids {
            return Ok(());
        }
        trace!(table = self.table, owner_id, "updating lookup rows");

        for related in related_ids.difference(&current) {
            let sql = format!(
                "INSERT OR IGNORE INTO {table} ({related_key}, {owner_key}) VALUES (?1, ?2)",
                table = self.table,
                related_key = self.related_key,
                owner_key = self.owner_key,
            );
            connection.execute(&sql, params![related, owner_id])?;
        }
        for related in current.difference(related_ids) {
            let sql = format!(
                "DELETE FROM {table} WHERE {related_key} = ?1 AND {owner_key} = ?2",
                table = self.table,
                related_key = self.related_key,
                owner_key = self.owner_key,
            );
            connection.execute(&sql, params![related, owner_id])?;
        }

        let mut cache = self.lock_cache();
        if related_ids.is_empty() {
            cache.insert(owner_id.to_string());
        } else {
            cache.remove(owner_id);
        }
        Ok(())
    }

    /// Delete every relation row for the given owners.
    pub fn remove_owners(&self, connection: &Connection, owner_ids: &[String]) -> Result<()> {
        if owner_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM {table} WHERE {owner} IN ({vars})",
            table = self.table,
            owner = self.owner_key,
            vars = placeholders(owner_ids.len()),
        );
        connection.execute(&sql, rusqlite::params_from_iter(owner_ids.iter()))?;

        let mut cache = self.lock_cache();
        for owner in owner_ids {
            cache.insert(owner.clone());
        }
        Ok(())
    }

    fn related_ids_for_owner(
        &self,
        connection: &Connection,
        owner_id: &str,
    ) -> Result<HashSet<String>> {
        if self.lock_cache().contains(owner_id) {
            return Ok(HashSet::new());
        }
        let sql = format!(
            "SELECT {related} FROM {table} WHERE {owner} = ?1",
            related = self.related_key,
            table = self.table,
            owner = self.owner_key,
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map(params![owner_id], |row| row.get::<_, String>(0))?;
        let mut result = HashSet::new();
        for row in rows {
            result.insert(row?);
        }
        Ok(result)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.owners_with_no_relations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `?1, ?2, ...` for an IN clause.
pub(crate) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
