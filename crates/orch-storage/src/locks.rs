#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{lease_timestamp, now_timestamp};
use crate::types::{Lock, LockAcquireArgs};
use crate::{SqliteStore, DEFAULT_LOCK_TTL_SECONDS};
use orch_core::scope::{normalize_scope_path, scopes_conflict, ScopeType};
use rusqlite::{params, OptionalExtension, Row};

const LOCK_COLUMNS: &str =
    "id, scope_type, scope_path, owner_session, lease_until, heartbeat_at, state";

fn lock_from_row(row: &Row<'_>) -> rusqlite::Result<Lock> {
    Ok(Lock {
        id: row.get(0)?,
        scope_type: row.get(1)?,
        scope_path: row.get(2)?,
        owner_session: row.get(3)?,
        lease_until: row.get(4)?,
        heartbeat_at: row.get(5)?,
        state: row.get(6)?,
    })
}

impl SqliteStore {
    /// Acquire a scope lock. Stale active locks are expired first; any
    /// remaining active lock with a conflicting scope rejects the acquire.
    pub fn acquire_lock(&mut self, args: LockAcquireArgs) -> Result<Lock, StoreError> {
        let Some(scope_type) = ScopeType::parse(&args.scope_type) else {
            return Err(StoreError::InvalidInput(
                "scope_type must be one of: prefix, file",
            ));
        };
        let scope_path = normalize_scope_path(&args.scope_path);
        if scope_path.is_empty() {
            return Err(StoreError::InvalidInput("scope_path is required"));
        }
        let owner_session = args.owner_session.trim().to_string();
        if owner_session.is_empty() {
            return Err(StoreError::InvalidInput("owner_session is required"));
        }
        let ttl_seconds = if args.ttl_seconds <= 0 {
            DEFAULT_LOCK_TTL_SECONDS
        } else {
            args.ttl_seconds
        };

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "UPDATE locks
                SET state = 'expired'
              WHERE state = 'active'
                AND lease_until < ?1",
            params![now],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {LOCK_COLUMNS} FROM locks WHERE state = 'active'"
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let active = lock_from_row(row)?;
                let Some(active_type) = ScopeType::parse(&active.scope_type) else {
                    continue;
                };
                if scopes_conflict(scope_type, &scope_path, active_type, &active.scope_path) {
                    return Err(StoreError::LockConflict {
                        lock_id: active.id,
                        scope_type: active.scope_type,
                        scope_path: active.scope_path,
                    });
                }
            }
        }

        let lease_until = lease_timestamp(ttl_seconds);
        tx.execute(
            "INSERT INTO locks(scope_type, scope_path, owner_session, lease_until, heartbeat_at, state)
             VALUES(?1, ?2, ?3, ?4, ?5, 'active')",
            params![
                scope_type.as_str(),
                scope_path,
                owner_session,
                lease_until,
                now
            ],
        )?;
        let lock_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        tx.commit()?;

        Ok(Lock {
            id: lock_id,
            scope_type: scope_type.as_str().to_string(),
            scope_path,
            owner_session,
            lease_until,
            heartbeat_at: now,
            state: "active".to_string(),
        })
    }

    pub fn heartbeat_lock(&mut self, lock_id: i64, ttl_seconds: i64) -> Result<Lock, StoreError> {
        let ttl_seconds = if ttl_seconds <= 0 {
            DEFAULT_LOCK_TTL_SECONDS
        } else {
            ttl_seconds
        };

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let lease_until = lease_timestamp(ttl_seconds);
        let changed = tx.execute(
            "UPDATE locks
                SET heartbeat_at = ?1, lease_until = ?2
              WHERE id = ?3 AND state = 'active'",
            params![now, lease_until, lock_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "active lock",
                id: lock_id,
            });
        }
        bump_version_tx(&tx)?;
        let lock = tx.query_row(
            &format!("SELECT {LOCK_COLUMNS} FROM locks WHERE id = ?1"),
            params![lock_id],
            lock_from_row,
        )?;
        tx.commit()?;
        Ok(lock)
    }

    pub fn release_lock(&mut self, lock_id: i64) -> Result<Lock, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE locks
                SET state = 'released',
                    heartbeat_at = ?1,
                    lease_until = ?2
              WHERE id = ?3 AND state = 'active'",
            params![now, now, lock_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "active lock",
                id: lock_id,
            });
        }
        bump_version_tx(&tx)?;
        let lock = tx.query_row(
            &format!("SELECT {LOCK_COLUMNS} FROM locks WHERE id = ?1"),
            params![lock_id],
            lock_from_row,
        )?;
        tx.commit()?;
        Ok(lock)
    }

    /// Lazily expire overdue leases, then return the remaining active locks.
    pub fn list_active_locks(&mut self) -> Result<Vec<Lock>, StoreError> {
        let now = now_timestamp();
        let _ = self.conn().execute(
            "UPDATE locks
                SET state = 'expired'
              WHERE state = 'active'
                AND lease_until < ?1",
            params![now],
        );

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LOCK_COLUMNS} FROM locks WHERE state = 'active' ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut locks = Vec::new();
        while let Some(row) = rows.next()? {
            locks.push(lock_from_row(row)?);
        }
        Ok(locks)
    }

    pub fn get_lock(&self, lock_id: i64) -> Result<Lock, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {LOCK_COLUMNS} FROM locks WHERE id = ?1"),
                params![lock_id],
                lock_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "lock",
                id: lock_id,
            })
    }
}
