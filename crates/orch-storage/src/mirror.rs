#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::support::now_timestamp;
use crate::types::MirrorStatus;
use crate::SqliteStore;
use rusqlite::{params, Row, Transaction};
use std::collections::BTreeMap;

pub(crate) fn bump_version_tx(tx: &Transaction<'_>) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE mirror_meta
            SET db_version = db_version + 1,
                updated_at = ?1
          WHERE id = 1",
        params![now_timestamp()],
    )?;
    Ok(())
}

fn mirror_status_from_row(row: &Row<'_>) -> rusqlite::Result<MirrorStatus> {
    let db_version: i64 = row.get(0)?;
    let md_version: i64 = row.get(1)?;
    Ok(MirrorStatus {
        db_version,
        md_version,
        md_path: row.get(2)?,
        outdated: db_version != md_version,
        updated_at: row.get(3)?,
    })
}

impl SqliteStore {
    pub fn mirror_status(&self) -> Result<MirrorStatus, StoreError> {
        Ok(self.conn().query_row(
            "SELECT db_version, md_version, md_path, updated_at
               FROM mirror_meta
              WHERE id = 1",
            [],
            mirror_status_from_row,
        )?)
    }

    /// Copy `db_version` into `md_version` and record the mirror path.
    pub fn mark_mirror_refreshed(&mut self, mirror_path: &str) -> Result<MirrorStatus, StoreError> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "UPDATE mirror_meta
                SET md_version = db_version,
                    md_path = ?1,
                    updated_at = ?2
              WHERE id = 1",
            params![mirror_path, now_timestamp()],
        )?;
        let status = tx.query_row(
            "SELECT db_version, md_version, md_path, updated_at
               FROM mirror_meta
              WHERE id = 1",
            [],
            mirror_status_from_row,
        )?;
        tx.commit()?;
        Ok(status)
    }

    pub fn task_status_counts(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(status, count);
        }
        Ok(counts)
    }
}
