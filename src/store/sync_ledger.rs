//! The ledger of local status changes not yet delivered to a sync
//! service.
//!
//! One row per `(article_id, key)`: a newer local change to the same
//! flag replaces the older pending row, so the service only ever hears
//! the latest state. The claim/confirm/release protocol uses the
//! `selected` column: a sync pass claims a batch, then either confirms
//! (deleting the rows) or releases them (clearing `selected`) after a
//! failed upload.

use rusqlite::{params, Connection, Row};
use tracing::warn;

use crate::app::error::Result;
use crate::domain::{StatusKey, SyncStatus};
use crate::store::lookup::placeholders;

#[derive(Default)]
pub struct SyncStatusTable;

impl SyncStatusTable {
    /// Record pending changes, replacing any older pending change to
    /// the same flag. Newly inserted rows are never selected.
    pub fn insert_statuses(&self, connection: &Connection, statuses: &[SyncStatus]) -> Result<()> {
        for status in statuses {
            connection.execute(
                "INSERT OR REPLACE INTO sync_statuses (article_id, key, flag, selected)
                 VALUES (?1, ?2, ?3, 0)",
                params![status.article_id, status.key.as_str(), status.flag],
            )?;
        }
        Ok(())
    }

    /// Claim up to `limit` unselected rows for an upload pass. Claimed
    /// rows stay claimed until confirmed or released, so overlapping
    /// passes never pick up the same change twice.
    pub fn select_for_processing(
        &self,
        connection: &mut Connection,
        limit: usize,
    ) -> Result<Vec<SyncStatus>> {
        let transaction = connection.transaction()?;
        let statuses = {
            let mut statement = transaction.prepare(
                "SELECT article_id, key, flag, selected FROM sync_statuses
                 WHERE selected = 0 LIMIT ?1",
            )?;
            let rows = statement.query_map(params![limit], row_to_parts)?;
            let mut statuses: Vec<SyncStatus> = Vec::new();
            for row in rows {
                match status_from_parts(row?) {
                    Some(status) => statuses.push(status),
                    None => continue,
                }
            }
            statuses
        };

        for status in &statuses {
            transaction.execute(
                "UPDATE sync_statuses SET selected = 1 WHERE article_id = ?1 AND key = ?2",
                params![status.article_id, status.key.as_str()],
            )?;
        }
        transaction.commit()?;

        Ok(statuses
            .into_iter()
            .map(|mut status| {
                status.selected = true;
                status
            })
            .collect())
    }

    /// Confirm delivery for the given articles: drop their claimed
    /// rows only. Claimed rows outside the set stay claimed for the
    /// caller's next confirmation, and a change re-recorded after the
    /// claim is pending again, so it survives too.
    pub fn delete_selected(&self, connection: &Connection, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM sync_statuses WHERE selected = 1 AND article_id IN ({})",
            placeholders(article_ids.len())
        );
        connection.execute(&sql, rusqlite::params_from_iter(article_ids.iter()))?;
        Ok(())
    }

    /// Release a failed batch back to pending.
    pub fn reset_selected(&self, connection: &Connection, article_ids: &[String]) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE sync_statuses SET selected = 0 WHERE article_id IN ({})",
            placeholders(article_ids.len())
        );
        connection.execute(&sql, rusqlite::params_from_iter(article_ids.iter()))?;
        Ok(())
    }

    /// Release every claimed row, whatever pass claimed it.
    pub fn reset_all_selected(&self, connection: &Connection) -> Result<()> {
        connection.execute("UPDATE sync_statuses SET selected = 0 WHERE selected = 1", [])?;
        Ok(())
    }

    pub fn pending_count(&self, connection: &Connection) -> Result<i64> {
        let count =
            connection.query_row("SELECT count(*) FROM sync_statuses", [], |row| row.get(0))?;
        Ok(count)
    }
}

type RowParts = (String, String, bool, bool);

fn row_to_parts(row: &Row<'_>) -> rusqlite::Result<RowParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn status_from_parts((article_id, key, flag, selected): RowParts) -> Option<SyncStatus> {
    let Some(key) = StatusKey::from_str(&key) else {
        warn!(article_id, key, "ignoring sync status row with unknown key");
        return None;
    };
    Some(SyncStatus {
        article_id,
        key,
        flag,
        selected,
    })
}
