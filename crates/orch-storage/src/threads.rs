#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::mirror::bump_version_tx;
use crate::support::{now_timestamp, nullable_text};
use crate::types::{
    ReviewJob, ReviewJobCreateArgs, ReviewJobUpdateArgs, RuntimePrereqEvent,
    RuntimePrereqEventArgs, Thread, ThreadCreateArgs, ThreadFilter, ThreadUpdateArgs,
};
use crate::SqliteStore;
use orch_core::status::is_thread_terminal_status;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const THREAD_COLUMNS: &str = "id, session_id, parent_thread_id, role, status, title, objective, worktree_id, agent_guide_path, agent_override, task_spec_json, scope_task_ids_json, scope_case_ids_json, scope_node_ids_json, tmux_session_name, tmux_window_name, tmux_pane_id, launch_command, log_file_path, provider_type, created_at, started_at, completed_at, updated_at";

const REVIEW_JOB_COLUMNS: &str = "id, merge_request_id, session_id, reviewer_thread_id, state, notes_json, created_at, updated_at, completed_at";

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        session_id: row.get(1)?,
        parent_thread_id: row.get(2)?,
        role: row.get(3)?,
        status: row.get(4)?,
        title: row.get(5)?,
        objective: row.get(6)?,
        worktree_id: row.get(7)?,
        agent_guide_path: row.get(8)?,
        agent_override: row.get(9)?,
        task_spec_json: row.get(10)?,
        scope_task_ids_json: row.get(11)?,
        scope_case_ids_json: row.get(12)?,
        scope_node_ids_json: row.get(13)?,
        tmux_session_name: row.get(14)?,
        tmux_window_name: row.get(15)?,
        tmux_pane_id: row.get(16)?,
        launch_command: row.get(17)?,
        log_file_path: row.get(18)?,
        provider_type: row.get(19)?,
        created_at: row.get(20)?,
        started_at: row.get(21)?,
        completed_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

fn review_job_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewJob> {
    Ok(ReviewJob {
        id: row.get(0)?,
        merge_request_id: row.get(1)?,
        session_id: row.get(2)?,
        reviewer_thread_id: row.get(3)?,
        state: row.get(4)?,
        notes_json: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

impl SqliteStore {
    pub fn create_thread(&mut self, args: ThreadCreateArgs) -> Result<Thread, StoreError> {
        if args.session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }
        let mut role = args.role.trim().to_string();
        if role.is_empty() {
            role = "worker".to_string();
        }
        let mut status = args.status.trim().to_string();
        if status.is_empty() {
            status = "planned".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        let started_at = if status.eq_ignore_ascii_case("running") {
            Some(now.clone())
        } else {
            None
        };

        tx.execute(
            "INSERT INTO threads(
                session_id, parent_thread_id, role, status, title, objective, worktree_id,
                agent_guide_path, agent_override, task_spec_json, scope_task_ids_json,
                scope_case_ids_json, scope_node_ids_json, tmux_session_name, tmux_window_name,
                tmux_pane_id, launch_command, log_file_path, provider_type, created_at,
                started_at, completed_at, updated_at
            ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, NULL, NULL, NULL, NULL, NULL, ?14, ?15, ?16, NULL, ?17)",
            params![
                args.session_id,
                args.parent_thread_id,
                role,
                status,
                nullable_text(&args.title),
                nullable_text(&args.objective),
                args.worktree_id,
                nullable_text(&args.agent_guide_path),
                nullable_text(&args.agent_override),
                nullable_text(&args.task_spec_json),
                nullable_text(&args.scope_task_ids_json),
                nullable_text(&args.scope_case_ids_json),
                nullable_text(&args.scope_node_ids_json),
                nullable_text(&args.provider_type),
                now,
                started_at,
                now
            ],
        )?;
        let thread_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let thread = tx.query_row(
            &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
            params![thread_id],
            thread_from_row,
        )?;
        tx.commit()?;
        Ok(thread)
    }

    pub fn get_thread(&self, thread_id: i64) -> Result<Thread, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![thread_id],
                thread_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "thread",
                id: thread_id,
            })
    }

    /// Latest thread of the session with no parent, if any.
    pub fn session_root_thread(&self, session_id: i64) -> Result<Option<Thread>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {THREAD_COLUMNS}
                       FROM threads
                      WHERE session_id = ?1 AND parent_thread_id IS NULL
                      ORDER BY id DESC
                      LIMIT 1"
                ),
                params![session_id],
                thread_from_row,
            )
            .optional()?)
    }

    pub fn list_threads(&self, filter: ThreadFilter) -> Result<Vec<Thread>, StoreError> {
        let mut sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE 1=1");
        let mut bind: Vec<SqlValue> = Vec::new();

        if filter.session_id > 0 {
            sql.push_str(" AND session_id = ?");
            bind.push(SqlValue::Integer(filter.session_id));
        }
        if let Some(parent_thread_id) = filter.parent_thread_id {
            sql.push_str(" AND parent_thread_id = ?");
            bind.push(SqlValue::Integer(parent_thread_id));
        }
        if !filter.status.trim().is_empty() {
            sql.push_str(" AND status = ?");
            bind.push(SqlValue::Text(filter.status.trim().to_string()));
        }
        if !filter.role.trim().is_empty() {
            sql.push_str(" AND role = ?");
            bind.push(SqlValue::Text(filter.role.trim().to_string()));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind))?;
        let mut threads = Vec::new();
        while let Some(row) = rows.next()? {
            threads.push(thread_from_row(row)?);
        }
        Ok(threads)
    }

    pub fn update_thread(
        &mut self,
        thread_id: i64,
        args: ThreadUpdateArgs,
    ) -> Result<Thread, StoreError> {
        let mut set_clauses: Vec<&'static str> = Vec::new();
        let mut bind: Vec<SqlValue> = Vec::new();

        if let Some(status) = &args.status {
            let status = status.trim();
            if status.is_empty() {
                return Err(StoreError::InvalidInput("status cannot be empty"));
            }
            set_clauses.push("status = ?");
            bind.push(SqlValue::Text(status.to_string()));

            if status.eq_ignore_ascii_case("running") {
                set_clauses.push("started_at = COALESCE(started_at, ?)");
                bind.push(SqlValue::Text(now_timestamp()));
            }
            if is_thread_terminal_status(status) {
                set_clauses.push("completed_at = COALESCE(completed_at, ?)");
                bind.push(SqlValue::Text(now_timestamp()));
            }
        }
        if let Some(tmux_session_name) = args.tmux_session_name {
            set_clauses.push("tmux_session_name = ?");
            bind.push(opt_text_value(&tmux_session_name));
        }
        if let Some(tmux_window_name) = args.tmux_window_name {
            set_clauses.push("tmux_window_name = ?");
            bind.push(opt_text_value(&tmux_window_name));
        }
        if let Some(tmux_pane_id) = args.tmux_pane_id {
            set_clauses.push("tmux_pane_id = ?");
            bind.push(opt_text_value(&tmux_pane_id));
        }
        if let Some(launch_command) = args.launch_command {
            set_clauses.push("launch_command = ?");
            bind.push(opt_text_value(&launch_command));
        }
        if let Some(log_file_path) = args.log_file_path {
            set_clauses.push("log_file_path = ?");
            bind.push(opt_text_value(&log_file_path));
        }
        if let Some(provider_type) = args.provider_type {
            set_clauses.push("provider_type = ?");
            bind.push(opt_text_value(&provider_type));
        }
        if set_clauses.is_empty() {
            return self.get_thread(thread_id);
        }

        set_clauses.push("updated_at = ?");
        bind.push(SqlValue::Text(now_timestamp()));
        bind.push(SqlValue::Integer(thread_id));

        let tx = self.conn_mut().transaction()?;
        let sql = format!("UPDATE threads SET {} WHERE id = ?", set_clauses.join(", "));
        let changed = tx.execute(&sql, params_from_iter(bind))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "thread",
                id: thread_id,
            });
        }
        bump_version_tx(&tx)?;
        let thread = tx.query_row(
            &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
            params![thread_id],
            thread_from_row,
        )?;
        tx.commit()?;
        Ok(thread)
    }

    pub fn create_review_job(
        &mut self,
        args: ReviewJobCreateArgs,
    ) -> Result<ReviewJob, StoreError> {
        if args.merge_request_id <= 0 {
            return Err(StoreError::InvalidInput("merge_request_id is required"));
        }
        if args.session_id <= 0 {
            return Err(StoreError::InvalidInput("session_id is required"));
        }
        let mut state = args.state.trim().to_string();
        if state.is_empty() {
            state = "requested".to_string();
        }

        let tx = self.conn_mut().transaction()?;
        let now = now_timestamp();
        tx.execute(
            "INSERT INTO review_jobs(merge_request_id, session_id, reviewer_thread_id, state, notes_json, created_at, updated_at, completed_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
            params![
                args.merge_request_id,
                args.session_id,
                args.reviewer_thread_id,
                state,
                nullable_text(&args.notes_json),
                now,
                now
            ],
        )?;
        let review_job_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let review_job = tx.query_row(
            &format!("SELECT {REVIEW_JOB_COLUMNS} FROM review_jobs WHERE id = ?1"),
            params![review_job_id],
            review_job_from_row,
        )?;
        tx.commit()?;
        Ok(review_job)
    }

    pub fn update_review_job(
        &mut self,
        review_job_id: i64,
        args: ReviewJobUpdateArgs,
    ) -> Result<ReviewJob, StoreError> {
        let mut set_clauses: Vec<&'static str> = Vec::new();
        let mut bind: Vec<SqlValue> = Vec::new();

        if let Some(state) = &args.state {
            let state = state.trim();
            if state.is_empty() {
                return Err(StoreError::InvalidInput("state cannot be empty"));
            }
            set_clauses.push("state = ?");
            bind.push(SqlValue::Text(state.to_string()));
            if state.eq_ignore_ascii_case("completed")
                || state.eq_ignore_ascii_case("failed")
                || state.eq_ignore_ascii_case("cancelled")
            {
                set_clauses.push("completed_at = COALESCE(completed_at, ?)");
                bind.push(SqlValue::Text(now_timestamp()));
            }
        }
        if let Some(reviewer_thread_id) = args.reviewer_thread_id {
            set_clauses.push("reviewer_thread_id = ?");
            bind.push(SqlValue::Integer(reviewer_thread_id));
        }
        if let Some(notes_json) = args.notes_json {
            set_clauses.push("notes_json = ?");
            bind.push(opt_text_value(&notes_json));
        }
        if set_clauses.is_empty() {
            return self.get_review_job(review_job_id);
        }

        set_clauses.push("updated_at = ?");
        bind.push(SqlValue::Text(now_timestamp()));
        bind.push(SqlValue::Integer(review_job_id));

        let tx = self.conn_mut().transaction()?;
        let sql = format!(
            "UPDATE review_jobs SET {} WHERE id = ?",
            set_clauses.join(", ")
        );
        let changed = tx.execute(&sql, params_from_iter(bind))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "review job",
                id: review_job_id,
            });
        }
        bump_version_tx(&tx)?;
        let review_job = tx.query_row(
            &format!("SELECT {REVIEW_JOB_COLUMNS} FROM review_jobs WHERE id = ?1"),
            params![review_job_id],
            review_job_from_row,
        )?;
        tx.commit()?;
        Ok(review_job)
    }

    pub fn get_review_job(&self, review_job_id: i64) -> Result<ReviewJob, StoreError> {
        self.conn()
            .query_row(
                &format!("SELECT {REVIEW_JOB_COLUMNS} FROM review_jobs WHERE id = ?1"),
                params![review_job_id],
                review_job_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "review job",
                id: review_job_id,
            })
    }

    pub fn latest_review_job_by_merge_request(
        &self,
        merge_request_id: i64,
    ) -> Result<Option<ReviewJob>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {REVIEW_JOB_COLUMNS}
                       FROM review_jobs
                      WHERE merge_request_id = ?1
                      ORDER BY id DESC
                      LIMIT 1"
                ),
                params![merge_request_id],
                review_job_from_row,
            )
            .optional()?)
    }

    pub fn record_runtime_prereq_event(
        &mut self,
        args: RuntimePrereqEventArgs,
    ) -> Result<RuntimePrereqEvent, StoreError> {
        if args.requirement.trim().is_empty() {
            return Err(StoreError::InvalidInput("requirement is required"));
        }
        if args.status.trim().is_empty() {
            return Err(StoreError::InvalidInput("status is required"));
        }

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO runtime_prereq_events(session_id, requirement, status, detail, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            params![
                args.session_id,
                args.requirement.trim(),
                args.status.trim(),
                nullable_text(&args.detail),
                now_timestamp()
            ],
        )?;
        let event_id = tx.last_insert_rowid();
        bump_version_tx(&tx)?;
        let event = tx.query_row(
            "SELECT id, session_id, requirement, status, detail, created_at
               FROM runtime_prereq_events
              WHERE id = ?1",
            params![event_id],
            |row| {
                Ok(RuntimePrereqEvent {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    requirement: row.get(2)?,
                    status: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(event)
    }
}

fn opt_text_value(value: &str) -> SqlValue {
    match nullable_text(value) {
        Some(text) => SqlValue::Text(text),
        None => SqlValue::Null,
    }
}
