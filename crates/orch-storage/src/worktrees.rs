#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{lease_timestamp, now_timestamp, nullable_text, timestamp_is_future};
use crate::types::{
    MainMergeLock, MainMergeQueueItem, MainMergeRequestArgs, MergeRequest, MergeRequestArgs,
    Worktree, WorktreeCreateArgs,
};
use crate::{SqliteStore, DEFAULT_MAIN_MERGE_LOCK_TTL_SECONDS};
use rusqlite::{params, OptionalExtension, Row};

const WORKTREE_COLUMNS: &str = "id, task_id, path, branch, status, kind, parent_worktree_id, owner_session_id, merge_state, created_at, merged_at";

const QUEUE_COLUMNS: &str = "id, session_id, from_worktree_id, target_branch, state, started_at, completed_at, error_message, created_at, updated_at";

fn worktree_from_row(row: &Row<'_>) -> rusqlite::Result<Worktree> {
    Ok(Worktree {
        id: row.get(0)?,
        task_id: row.get(1)?,
        path: row.get(2)?,
        branch: row.get(3)?,
        status: row.get(4)?,
        kind: row.get(5)?,
        parent_worktree_id: row.get(6)?,
        owner_session_id: row.get(7)?,
        merge_state: row.get(8)?,
        created_at: row.get(9)?,
        merged_at: row.get(10)?,
    })
}

fn queue_item_from_row(row: &Row<'_>) -> rusqlite::Result<MainMergeQueueItem> {
    Ok(MainMergeQueueItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        from_worktree_id: row.get(2)?,
        target_branch: row.get(3)?,
        state: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        error_message: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn main_merge_lock_from_row(row: &Row<'_>) -> rusqlite::Result<MainMergeLock> {
    Ok(MainMergeLock {
        id: row.get(0)?,
        holder_session_id: row.get(1)?,
        lease_until: row.get(2)?,
        state: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn merge_request_from_row(row: &Row<'_>) -> rusqlite::Result<MergeRequest> {
    Ok(MergeRequest {
        id: row.get(0)?,
        feature_task_id: row.get(1)?,
        status: row.get(2)?,
        reviewer_session: row.get(3)?,
        notes_json: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl SqliteStore {
    pub fn create_worktree_record(
        &mut self,
        mut args: WorktreeCreateArgs,
    ) -> Result<Worktree, StoreError> {
        if args.path.trim().is_empty() {
            return Err(StoreError::InvalidInput("path is required"));
        }
        if args.branch.trim().is_empty() {
            return Err(StoreError::InvalidInput("branch is required"));
        }
        if args.status.trim().is_empty() {
            args.status = "planned".to_string();
        }
        if args.kind.trim().is_empty() {
            args.kind = "task_branch".to_string();
        }
        if args.merge_state.trim().is_empty() {
            args.merge_state = "active".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO worktrees(task_id, path, branch, status, kind, parent_worktree_id, owner_session_id, merge_state, created_at, merged_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
            params![
                args.task_id,
                args.path,
                args.branch,
                args.status,
                args.kind,
                args.parent_worktree_id,
                args.owner_session_id,
                args.merge_state,
                now_timestamp()
            ],
        )?;
        let worktree_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let worktree = tx.query_row(
            &format!("SELECT {WORKTREE_COLUMNS} FROM worktrees WHERE id = ?1"),
            params![worktree_id],
            worktree_from_row,
        )?;
        tx.commit()?;
        Ok(worktree)
    }

    pub fn list_worktrees(&self) -> Result<Vec<Worktree>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {WORKTREE_COLUMNS} FROM worktrees ORDER BY id DESC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut worktrees = Vec::new();
        while let Some(row) = rows.next()? {
            worktrees.push(worktree_from_row(row)?);
        }
        Ok(worktrees)
    }

    pub fn get_worktree(&self, worktree_id: i64) -> Result<Worktree, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {WORKTREE_COLUMNS} FROM worktrees WHERE id = ?1"),
                params![worktree_id],
                worktree_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "worktree",
                id: worktree_id,
            })
    }

    /// Return the `main` worktree for a repository path, creating the record
    /// on first use.
    pub fn create_or_get_main_worktree(
        &mut self,
        repo_path: &str,
        branch: &str,
    ) -> Result<Worktree, StoreError> {
        let existing = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {WORKTREE_COLUMNS}
                       FROM worktrees
                      WHERE kind = 'main' AND path = ?1
                      ORDER BY id DESC
                      LIMIT 1"
                ),
                params![repo_path],
                worktree_from_row,
            )
            .optional()?;
        if let Some(worktree) = existing {
            return Ok(worktree);
        }

        self.create_worktree_record(WorktreeCreateArgs {
            task_id: 0,
            path: repo_path.to_string(),
            branch: branch.to_string(),
            status: "active".to_string(),
            kind: "main".to_string(),
            merge_state: "attached".to_string(),
            ..WorktreeCreateArgs::default()
        })
    }

    pub fn mark_worktree_merged_to_parent(
        &mut self,
        worktree_id: i64,
    ) -> Result<Worktree, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let changed = tx.execute(
            "UPDATE worktrees
                SET merge_state = 'merged_to_parent',
                    status = 'closed',
                    merged_at = ?1
              WHERE id = ?2",
            params![now_timestamp(), worktree_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "worktree",
                id: worktree_id,
            });
        }
        bump_version_tx(&tx)?;
        let worktree = tx.query_row(
            &format!("SELECT {WORKTREE_COLUMNS} FROM worktrees WHERE id = ?1"),
            params![worktree_id],
            worktree_from_row,
        )?;
        tx.commit()?;
        Ok(worktree)
    }

    /// Enqueue a mainline merge. Rejected while the source worktree still has
    /// task-branch children that have not merged back to their parent.
    pub fn enqueue_main_merge(
        &mut self,
        args: MainMergeRequestArgs,
    ) -> Result<MainMergeQueueItem, StoreError> {
        if args.session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }
        if args.from_worktree_id <= 0 {
            return Err(StoreError::InvalidInput("from_worktree_id is required"));
        }
        let mut target_branch = args.target_branch.trim().to_string();
        if target_branch.is_empty() {
            target_branch = "main".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let unmerged_children: i64 = tx.query_row(
            "SELECT COUNT(*)
               FROM worktrees
              WHERE parent_worktree_id = ?1
                AND kind = 'task_branch'
                AND COALESCE(merge_state, '') != 'merged_to_parent'",
            params![args.from_worktree_id],
            |row| row.get(0),
        )?;
        if unmerged_children > 0 {
            return Err(StoreError::UnmergedChildren {
                count: unmerged_children,
            });
        }

        let now = now_timestamp();
        tx.execute(
            "INSERT INTO merge_main_queue(session_id, from_worktree_id, target_branch, state, started_at, completed_at, error_message, created_at, updated_at)
             VALUES(?1, ?2, ?3, 'queued', NULL, NULL, NULL, ?4, ?5)",
            params![args.session_id, args.from_worktree_id, target_branch, now, now],
        )?;
        let request_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let item = tx.query_row(
            &format!("SELECT {QUEUE_COLUMNS} FROM merge_main_queue WHERE id = ?1"),
            params![request_id],
            queue_item_from_row,
        )?;
        tx.commit()?;
        Ok(item)
    }

    pub fn get_main_merge_request(
        &self,
        request_id: i64,
    ) -> Result<MainMergeQueueItem, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {QUEUE_COLUMNS} FROM merge_main_queue WHERE id = ?1"),
                params![request_id],
                queue_item_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "main merge request",
                id: request_id,
            })
    }

    /// FIFO head of the queue, if any item is still queued.
    pub fn next_main_merge_request(&self) -> Result<Option<MainMergeQueueItem>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {QUEUE_COLUMNS}
                       FROM merge_main_queue
                      WHERE state = 'queued'
                      ORDER BY id ASC
                      LIMIT 1"
                ),
                [],
                queue_item_from_row,
            )
            .optional()?)
    }

    /// Acquire the singleton mainline merge lock. Re-acquisition by the
    /// current holder renews the lease; a live lease held by another session
    /// rejects the acquire.
    pub fn acquire_main_merge_lock(
        &mut self,
        session_id: i64,
        ttl_seconds: i64,
    ) -> Result<MainMergeLock, StoreError> {
        if session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }
        let ttl_seconds = if ttl_seconds <= 0 {
            DEFAULT_MAIN_MERGE_LOCK_TTL_SECONDS
        } else {
            ttl_seconds
        };

        let tx = self.conn_mut().transaction()?;
        let lock = tx.query_row(
            "SELECT id, holder_session_id, lease_until, state, updated_at
               FROM merge_main_lock
              WHERE id = 1",
            [],
            main_merge_lock_from_row,
        )?;

        if lock.state.eq_ignore_ascii_case("locked") {
            if let Some(lease_until) = &lock.lease_until {
                if timestamp_is_future(lease_until)
                    && lock.holder_session_id.is_some()
                    && lock.holder_session_id != Some(session_id)
                {
                    return Err(StoreError::MainMergeLockHeld {
                        holder_session_id: lock.holder_session_id.unwrap_or(0),
                        lease_until: lease_until.clone(),
                    });
                }
            }
        }

        let lease_until = lease_timestamp(ttl_seconds);
        tx.execute(
            "UPDATE merge_main_lock
                SET holder_session_id = ?1, lease_until = ?2, state = 'locked', updated_at = ?3
              WHERE id = 1",
            params![session_id, lease_until, now_timestamp()],
        )?;
        bump_version_tx(&tx)?;
        let lock = tx.query_row(
            "SELECT id, holder_session_id, lease_until, state, updated_at
               FROM merge_main_lock
              WHERE id = 1",
            [],
            main_merge_lock_from_row,
        )?;
        tx.commit()?;
        Ok(lock)
    }

    pub fn release_main_merge_lock(
        &mut self,
        session_id: i64,
    ) -> Result<MainMergeLock, StoreError> {
        if session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }

        let tx = self.conn_mut().transaction()?;
        let changed = tx.execute(
            "UPDATE merge_main_lock
                SET holder_session_id = NULL, lease_until = NULL, state = 'unlocked', updated_at = ?1
              WHERE id = 1
                AND (holder_session_id = ?2 OR holder_session_id IS NULL)",
            params![now_timestamp(), session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::MainMergeLockNotOwned);
        }
        bump_version_tx(&tx)?;
        let lock = tx.query_row(
            "SELECT id, holder_session_id, lease_until, state, updated_at
               FROM merge_main_lock
              WHERE id = 1",
            [],
            main_merge_lock_from_row,
        )?;
        tx.commit()?;
        Ok(lock)
    }

    pub fn create_merge_request(
        &mut self,
        args: MergeRequestArgs,
    ) -> Result<MergeRequest, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO merge_requests(feature_task_id, status, reviewer_session, notes_json, created_at, updated_at)
             VALUES(?1, 'requested', ?2, ?3, ?4, ?5)",
            params![
                args.feature_task_id,
                nullable_text(&args.reviewer_session),
                nullable_text(&args.notes_json),
                now,
                now
            ],
        )?;
        let merge_request_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let merge_request = tx.query_row(
            "SELECT id, feature_task_id, status, reviewer_session, notes_json, created_at, updated_at
               FROM merge_requests WHERE id = ?1",
            params![merge_request_id],
            merge_request_from_row,
        )?;
        tx.commit()?;
        Ok(merge_request)
    }

    pub fn get_merge_request(&self, merge_request_id: i64) -> Result<MergeRequest, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, feature_task_id, status, reviewer_session, notes_json, created_at, updated_at
                   FROM merge_requests WHERE id = ?1",
                params![merge_request_id],
                merge_request_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "merge request",
                id: merge_request_id,
            })
    }
}
