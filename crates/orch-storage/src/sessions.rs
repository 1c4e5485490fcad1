#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{cutoff_timestamp, now_timestamp, nullable_text};
use crate::types::{
    CurrentRef, CurrentRefUpsertArgs, ResumeCandidate, Session, SessionContext, SessionOpenArgs,
    SessionUpdateArgs,
};
use crate::{SqliteStore, DEFAULT_HEARTBEAT_TIMEOUT_SECONDS};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const SESSION_COLUMNS: &str = "id, agent_role, owner, repo_path, terminal_fingerprint, intent, main_worktree_id, session_root_worktree_id, root_thread_id, tmux_session_name, runtime_state, delegation_state, delegation_root_thread_id, delegation_issued_at, delegation_acked_at, started_at, last_seen_at, status";

const CURRENT_REF_COLUMNS: &str = "id, session_id, node_type, node_id, checkpoint_id, mode, status, next_action, summary, required_files_json, acked_at, version, created_at, updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        agent_role: row.get(1)?,
        owner: row.get(2)?,
        repo_path: row.get(3)?,
        terminal_fingerprint: row.get(4)?,
        intent: row.get(5)?,
        main_worktree_id: row.get(6)?,
        session_root_worktree_id: row.get(7)?,
        root_thread_id: row.get(8)?,
        tmux_session_name: row.get(9)?,
        runtime_state: row.get(10)?,
        delegation_state: row.get(11)?,
        delegation_root_thread_id: row.get(12)?,
        delegation_issued_at: row.get(13)?,
        delegation_acked_at: row.get(14)?,
        started_at: row.get(15)?,
        last_seen_at: row.get(16)?,
        status: row.get(17)?,
    })
}

fn current_ref_from_row(row: &Row<'_>) -> rusqlite::Result<CurrentRef> {
    Ok(CurrentRef {
        id: row.get(0)?,
        session_id: row.get(1)?,
        node_type: row.get(2)?,
        node_id: row.get(3)?,
        checkpoint_id: row.get(4)?,
        mode: row.get(5)?,
        status: row.get(6)?,
        next_action: row.get(7)?,
        summary: row.get(8)?,
        required_files_json: row.get(9)?,
        acked_at: row.get(10)?,
        version: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl SqliteStore {
    pub fn open_session(&mut self, args: SessionOpenArgs) -> Result<Session, StoreError> {
        let mut agent_role = args.agent_role.trim().to_string();
        if agent_role.is_empty() {
            agent_role = "codex".to_string();
        }
        let mut owner = args.owner.trim().to_string();
        if owner.is_empty() {
            owner = "unknown".to_string();
        }
        let mut intent = args.intent.trim().to_string();
        if intent.is_empty() {
            intent = "auto".to_string();
        }
        let repo_path = args.repo_path.trim().to_string();
        if repo_path.is_empty() {
            return Err(StoreError::InvalidInput("repo_path is required"));
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO sessions(agent_role, owner, started_at, last_seen_at, status, repo_path, terminal_fingerprint, intent, delegation_state)
             VALUES(?1, ?2, ?3, ?4, 'opened', ?5, ?6, ?7, 'caller_active')",
            params![
                agent_role,
                owner,
                now,
                now,
                repo_path,
                nullable_text(&args.terminal_fingerprint),
                intent
            ],
        )?;
        let session_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let session = tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![session_id],
            session_from_row,
        )?;
        tx.commit()?;
        Ok(session)
    }

    pub fn heartbeat_session(&mut self, session_id: i64) -> Result<Session, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let changed = tx.execute(
            "UPDATE sessions
                SET last_seen_at = ?1,
                    status = CASE WHEN status = 'opened' THEN 'active_new' ELSE status END
              WHERE id = ?2",
            params![now_timestamp(), session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "session",
                id: session_id,
            });
        }
        bump_version_tx(&tx)?;
        let session = tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![session_id],
            session_from_row,
        )?;
        tx.commit()?;
        Ok(session)
    }

    pub fn close_session(&mut self, session_id: i64) -> Result<Session, StoreError> {
        self.update_session(
            session_id,
            SessionUpdateArgs {
                status: Some("closed".to_string()),
                ..SessionUpdateArgs::default()
            },
        )
    }

    pub fn update_session(
        &mut self,
        session_id: i64,
        args: SessionUpdateArgs,
    ) -> Result<Session, StoreError> {
        let mut set_clauses: Vec<&'static str> = Vec::new();
        let mut bind: Vec<SqlValue> = Vec::new();

        if let Some(status) = args.status {
            set_clauses.push("status = ?");
            bind.push(SqlValue::Text(status));
        }
        if let Some(main_worktree_id) = args.main_worktree_id {
            set_clauses.push("main_worktree_id = ?");
            bind.push(SqlValue::Integer(main_worktree_id));
        }
        if let Some(session_root_worktree_id) = args.session_root_worktree_id {
            set_clauses.push("session_root_worktree_id = ?");
            bind.push(SqlValue::Integer(session_root_worktree_id));
        }
        if let Some(root_thread_id) = args.root_thread_id {
            set_clauses.push("root_thread_id = ?");
            bind.push(SqlValue::Integer(root_thread_id));
        }
        if let Some(tmux_session_name) = args.tmux_session_name {
            set_clauses.push("tmux_session_name = ?");
            bind.push(SqlValue::Text(tmux_session_name));
        }
        if let Some(runtime_state) = args.runtime_state {
            set_clauses.push("runtime_state = ?");
            bind.push(SqlValue::Text(runtime_state));
        }
        if let Some(intent) = args.intent {
            set_clauses.push("intent = ?");
            bind.push(SqlValue::Text(intent));
        }
        if let Some(delegation_state) = args.delegation_state {
            set_clauses.push("delegation_state = ?");
            bind.push(SqlValue::Text(delegation_state));
        }
        if let Some(delegation_root_thread_id) = args.delegation_root_thread_id {
            set_clauses.push("delegation_root_thread_id = ?");
            bind.push(SqlValue::Integer(delegation_root_thread_id));
        }
        if let Some(delegation_issued_at) = args.delegation_issued_at {
            set_clauses.push("delegation_issued_at = ?");
            bind.push(SqlValue::Text(delegation_issued_at));
        }
        if let Some(delegation_acked_at) = args.delegation_acked_at {
            set_clauses.push("delegation_acked_at = ?");
            match nullable_text(&delegation_acked_at) {
                Some(text) => bind.push(SqlValue::Text(text)),
                None => bind.push(SqlValue::Null),
            }
        }

        set_clauses.push("last_seen_at = ?");
        bind.push(SqlValue::Text(now_timestamp()));
        bind.push(SqlValue::Integer(session_id));

        let tx = self.conn_mut().transaction()?;
        let sql = format!(
            "UPDATE sessions SET {} WHERE id = ?",
            set_clauses.join(", ")
        );
        let changed = tx.execute(&sql, params_from_iter(bind))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "session",
                id: session_id,
            });
        }
        bump_version_tx(&tx)?;
        let session = tx.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![session_id],
            session_from_row,
        )?;
        tx.commit()?;
        Ok(session)
    }

    pub fn get_session(&self, session_id: i64) -> Result<Session, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                session_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "session",
                id: session_id,
            })
    }

    pub fn list_active_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS}
               FROM sessions
              WHERE status != 'closed'
              ORDER BY id DESC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(session_from_row(row)?);
        }
        Ok(sessions)
    }

    /// Close sessions on this repository whose heartbeat went stale; returns
    /// the sessions that were transitioned.
    pub fn cleanup_stale_sessions(
        &mut self,
        repo_path: &str,
        timeout_seconds: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let cutoff = cutoff_timestamp(timeout_seconds.max(1));
        let stale: Vec<i64> = {
            let mut stmt = self.conn().prepare(
                "SELECT id
                   FROM sessions
                  WHERE repo_path = ?1
                    AND status != 'closed'
                    AND last_seen_at < ?2
                  ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![repo_path, cutoff])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                ids.push(row.get(0)?);
            }
            ids
        };

        let mut closed = Vec::with_capacity(stale.len());
        for session_id in stale {
            closed.push(self.close_session(session_id)?);
        }
        Ok(closed)
    }

    pub fn create_session_handoff(
        &mut self,
        from_session_id: i64,
        to_session_id: i64,
        state: &str,
    ) -> Result<(), StoreError> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO session_handoffs(from_session_id, to_session_id, state, created_at, completed_at)
             VALUES(?1, ?2, ?3, ?4, NULL)",
            params![from_session_id, to_session_id, state, now_timestamp()],
        )?;
        bump_version_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn complete_session_handoff(
        &mut self,
        from_session_id: i64,
        to_session_id: i64,
    ) -> Result<(), StoreError> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "UPDATE session_handoffs
                SET state = 'completed', completed_at = ?1
              WHERE from_session_id = ?2 AND to_session_id = ?3 AND completed_at IS NULL",
            params![now_timestamp(), from_session_id, to_session_id],
        )?;
        bump_version_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Suspended sessions on the same repository that hold an active current
    /// ref and have not heartbeat within the timeout.
    pub fn list_resume_candidates(
        &self,
        repo_path: &str,
        requester_session_id: i64,
        heartbeat_timeout_seconds: i64,
    ) -> Result<Vec<ResumeCandidate>, StoreError> {
        let timeout = if heartbeat_timeout_seconds <= 0 {
            DEFAULT_HEARTBEAT_TIMEOUT_SECONDS
        } else {
            heartbeat_timeout_seconds
        };
        let cutoff = cutoff_timestamp(timeout);

        let suspended: Vec<Session> = {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                   FROM sessions
                  WHERE repo_path = ?1
                    AND id != ?2
                    AND status IN ('active_new', 'active_resume', 'handoff_attached')
                    AND last_seen_at < ?3
                  ORDER BY last_seen_at ASC"
            ))?;
            let mut rows = stmt.query(params![repo_path, requester_session_id, cutoff])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(session_from_row(row)?);
            }
            sessions
        };

        let mut candidates = Vec::with_capacity(suspended.len());
        for session in suspended {
            let current_ref = self.get_current_ref(session.id, true)?;
            let Some(current_ref) = current_ref else {
                continue;
            };
            if current_ref.status != "active" {
                continue;
            }

            let session_root = match session.session_root_worktree_id {
                Some(worktree_id) => Some(self.get_worktree(worktree_id)?),
                None => None,
            };

            candidates.push(ResumeCandidate {
                session,
                current_ref: Some(current_ref),
                session_root_worktree: session_root,
            });
        }
        Ok(candidates)
    }

    pub fn get_current_ref(
        &self,
        session_id: i64,
        active_only: bool,
    ) -> Result<Option<CurrentRef>, StoreError> {
        let mut sql = format!(
            "SELECT {CURRENT_REF_COLUMNS} FROM current_refs WHERE session_id = ?1"
        );
        if active_only {
            sql.push_str(" AND status = 'active'");
        }
        sql.push_str(" ORDER BY updated_at DESC, id DESC LIMIT 1");

        Ok(self
            .conn()
            .query_row(&sql, params![session_id], current_ref_from_row)
            .optional()?)
    }

    /// Upsert the session's single active current-ref row; the version is
    /// monotone and the acknowledgement is cleared on every update.
    pub fn upsert_current_ref(
        &mut self,
        args: CurrentRefUpsertArgs,
    ) -> Result<CurrentRef, StoreError> {
        if args.session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }
        if args.node_type.trim().is_empty() {
            return Err(StoreError::InvalidInput("node_type is required"));
        }
        if args.node_id <= 0 {
            return Err(StoreError::InvalidInput("node_id is required"));
        }
        let mut mode = args.mode.trim().to_string();
        if mode.is_empty() {
            mode = "compact".to_string();
        }
        let mut status = args.status.trim().to_string();
        if status.is_empty() {
            status = "active".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, version
                   FROM current_refs
                  WHERE session_id = ?1 AND status = 'active'
                  ORDER BY updated_at DESC, id DESC
                  LIMIT 1",
                params![args.session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let ref_id = match existing {
            Some((ref_id, version)) => {
                tx.execute(
                    "UPDATE current_refs
                        SET node_type = ?1, node_id = ?2, checkpoint_id = ?3, mode = ?4,
                            status = ?5, next_action = ?6, summary = ?7,
                            required_files_json = ?8, version = ?9, updated_at = ?10,
                            acked_at = NULL
                      WHERE id = ?11",
                    params![
                        args.node_type,
                        args.node_id,
                        args.checkpoint_id,
                        mode,
                        status,
                        nullable_text(&args.next_action),
                        nullable_text(&args.summary),
                        nullable_text(&args.required_files_json),
                        version + 1,
                        now,
                        ref_id
                    ],
                )?;
                ref_id
            }
            None => {
                tx.execute(
                    "INSERT INTO current_refs(session_id, node_type, node_id, checkpoint_id, mode, status, next_action, summary, required_files_json, acked_at, version, created_at, updated_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 1, ?10, ?11)",
                    params![
                        args.session_id,
                        args.node_type,
                        args.node_id,
                        args.checkpoint_id,
                        mode,
                        status,
                        nullable_text(&args.next_action),
                        nullable_text(&args.summary),
                        nullable_text(&args.required_files_json),
                        now,
                        now
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        bump_version_tx(&tx)?;
        let current_ref = tx.query_row(
            &format!("SELECT {CURRENT_REF_COLUMNS} FROM current_refs WHERE id = ?1"),
            params![ref_id],
            current_ref_from_row,
        )?;
        tx.commit()?;
        Ok(current_ref)
    }

    pub fn ack_current_ref(
        &mut self,
        session_id: i64,
        ref_id: i64,
    ) -> Result<CurrentRef, StoreError> {
        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE current_refs
                SET acked_at = ?1, updated_at = ?2, version = version + 1
              WHERE id = ?3 AND session_id = ?4",
            params![now, now, ref_id, session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "current_ref",
                id: ref_id,
            });
        }
        bump_version_tx(&tx)?;
        let current_ref = tx.query_row(
            &format!("SELECT {CURRENT_REF_COLUMNS} FROM current_refs WHERE id = ?1"),
            params![ref_id],
            current_ref_from_row,
        )?;
        tx.commit()?;
        Ok(current_ref)
    }

    /// Attach the requester to a suspended target session: inherit its
    /// worktrees, mirror its current ref in resume mode, and log a handoff.
    pub fn attach_resume_candidate(
        &mut self,
        requester_session_id: i64,
        target_session_id: i64,
    ) -> Result<SessionContext, StoreError> {
        let target = self.get_session(target_session_id)?;
        if target.session_root_worktree_id.is_none() {
            return Err(StoreError::NotFound {
                entity: "target session-root worktree for session",
                id: target_session_id,
            });
        }

        let requester = self.update_session(
            requester_session_id,
            SessionUpdateArgs {
                status: Some("active_resume".to_string()),
                main_worktree_id: target.main_worktree_id,
                session_root_worktree_id: target.session_root_worktree_id,
                intent: Some("resume_work".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        self.update_session(
            target_session_id,
            SessionUpdateArgs {
                status: Some("handoff_attached".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        self.create_session_handoff(target_session_id, requester_session_id, "attached")?;

        let target_ref = self.get_current_ref(target_session_id, true)?;
        let requester_ref = match target_ref {
            Some(target_ref) => Some(self.upsert_current_ref(CurrentRefUpsertArgs {
                session_id: requester_session_id,
                node_type: target_ref.node_type,
                node_id: target_ref.node_id,
                checkpoint_id: target_ref.checkpoint_id,
                mode: "resume".to_string(),
                status: "active".to_string(),
                next_action: target_ref.next_action.unwrap_or_default(),
                summary: target_ref.summary.unwrap_or_default(),
                required_files_json: target_ref.required_files_json.unwrap_or_default(),
            })?),
            None => None,
        };

        let session_root = match requester.session_root_worktree_id {
            Some(worktree_id) => Some(self.get_worktree(worktree_id)?),
            None => None,
        };
        let main_worktree = match requester.main_worktree_id {
            Some(worktree_id) => Some(self.get_worktree(worktree_id)?),
            None => None,
        };

        Ok(SessionContext {
            session: requester,
            main_worktree,
            session_root_worktree: session_root,
            current_ref: requester_ref,
        })
    }

    pub fn build_session_context(&self, session_id: i64) -> Result<SessionContext, StoreError> {
        let session = self.get_session(session_id)?;

        let main_worktree = match session.main_worktree_id {
            Some(worktree_id) => Some(self.get_worktree(worktree_id)?),
            None => None,
        };
        let session_root = match session.session_root_worktree_id {
            Some(worktree_id) => Some(self.get_worktree(worktree_id)?),
            None => None,
        };
        let current_ref = self.get_current_ref(session_id, true)?;

        Ok(SessionContext {
            session,
            main_worktree,
            session_root_worktree: session_root,
            current_ref,
        })
    }
}
