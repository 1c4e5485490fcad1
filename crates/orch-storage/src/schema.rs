#![forbid(unsafe_code)]
//! Additive, idempotent schema migrations.
//!
//! Every statement is create-if-missing or add-column-if-missing; applying
//! the list to an empty database and to an already-migrated database yields
//! the same final schema.

use crate::error::StoreError;
use rusqlite::Connection;

const STATEMENTS: &[&str] = &[
    "PRAGMA foreign_keys = ON;",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        level TEXT NOT NULL,
        parent_id INTEGER NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'todo',
        priority INTEGER NOT NULL DEFAULT 0,
        assignee_session TEXT NULL,
        input_contract TEXT NULL,
        fixtures TEXT NULL,
        next_action TEXT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS steps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        evidence_json TEXT NOT NULL,
        order_no INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(task_id) REFERENCES tasks(id)
    );",
    "CREATE TABLE IF NOT EXISTS checkpoints (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        step_title TEXT NOT NULL,
        snapshot_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(task_id) REFERENCES tasks(id)
    );",
    "CREATE TABLE IF NOT EXISTS locks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_type TEXT NOT NULL,
        scope_path TEXT NOT NULL,
        owner_session TEXT NOT NULL,
        lease_until TEXT NOT NULL,
        heartbeat_at TEXT NOT NULL,
        state TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS worktrees (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL,
        path TEXT NOT NULL,
        branch TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        merged_at TEXT NULL
    );",
    "ALTER TABLE worktrees ADD COLUMN kind TEXT NULL;",
    "ALTER TABLE worktrees ADD COLUMN parent_worktree_id INTEGER NULL;",
    "ALTER TABLE worktrees ADD COLUMN owner_session_id INTEGER NULL;",
    "ALTER TABLE worktrees ADD COLUMN merge_state TEXT NULL;",
    "CREATE TABLE IF NOT EXISTS merge_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        feature_task_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        reviewer_session TEXT NULL,
        notes_json TEXT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(feature_task_id) REFERENCES tasks(id)
    );",
    "CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_role TEXT NOT NULL,
        owner TEXT NOT NULL,
        started_at TEXT NOT NULL,
        last_seen_at TEXT NOT NULL,
        status TEXT NOT NULL
    );",
    "ALTER TABLE sessions ADD COLUMN repo_path TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN terminal_fingerprint TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN intent TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN main_worktree_id INTEGER NULL;",
    "ALTER TABLE sessions ADD COLUMN session_root_worktree_id INTEGER NULL;",
    "ALTER TABLE sessions ADD COLUMN root_thread_id INTEGER NULL;",
    "ALTER TABLE sessions ADD COLUMN tmux_session_name TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN runtime_state TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN delegation_state TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN delegation_root_thread_id INTEGER NULL;",
    "ALTER TABLE sessions ADD COLUMN delegation_issued_at TEXT NULL;",
    "ALTER TABLE sessions ADD COLUMN delegation_acked_at TEXT NULL;",
    "CREATE TABLE IF NOT EXISTS session_handoffs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_session_id INTEGER NOT NULL,
        to_session_id INTEGER NOT NULL,
        state TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT NULL
    );",
    "CREATE TABLE IF NOT EXISTS current_refs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        node_type TEXT NOT NULL,
        node_id INTEGER NOT NULL,
        checkpoint_id INTEGER NULL,
        mode TEXT NOT NULL,
        status TEXT NOT NULL,
        next_action TEXT NULL,
        summary TEXT NULL,
        required_files_json TEXT NULL,
        acked_at TEXT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS graph_nodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_type TEXT NOT NULL,
        facet TEXT NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        parent_id INTEGER NULL,
        worktree_id INTEGER NULL,
        owner_session_id INTEGER NULL,
        summary TEXT NULL,
        risk_level INTEGER NULL,
        token_estimate INTEGER NULL,
        affected_files_json TEXT NULL,
        approval_state TEXT NOT NULL DEFAULT 'none',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS graph_edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_node_id INTEGER NOT NULL,
        to_node_id INTEGER NOT NULL,
        edge_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS node_checklists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id INTEGER NOT NULL,
        item_text TEXT NOT NULL,
        status TEXT NOT NULL,
        order_no INTEGER NOT NULL,
        facet TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS node_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id INTEGER NOT NULL,
        snapshot_type TEXT NOT NULL,
        summary TEXT NULL,
        affected_files_json TEXT NULL,
        next_action TEXT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS planning_rules (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        max_token_per_slice INTEGER NOT NULL,
        max_files_per_slice INTEGER NOT NULL,
        replan_triggers_json TEXT NOT NULL,
        approval_policy TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "INSERT OR IGNORE INTO planning_rules(id, max_token_per_slice, max_files_per_slice, replan_triggers_json, approval_policy, updated_at)
     VALUES(1, 18000, 12, '[\"context_overflow\",\"scope_change\",\"blocked\"]', 'merge-agent-required', strftime('%Y-%m-%dT%H:%M:%fZ','now'));",
    "CREATE TABLE IF NOT EXISTS merge_main_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        from_worktree_id INTEGER NOT NULL,
        target_branch TEXT NOT NULL,
        state TEXT NOT NULL,
        started_at TEXT NULL,
        completed_at TEXT NULL,
        error_message TEXT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS merge_main_lock (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        holder_session_id INTEGER NULL,
        lease_until TEXT NULL,
        state TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );",
    "INSERT OR IGNORE INTO merge_main_lock(id, holder_session_id, lease_until, state, updated_at)
     VALUES(1, NULL, NULL, 'unlocked', strftime('%Y-%m-%dT%H:%M:%fZ','now'));",
    "CREATE TABLE IF NOT EXISTS threads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        parent_thread_id INTEGER NULL,
        role TEXT NOT NULL,
        status TEXT NOT NULL,
        title TEXT NULL,
        objective TEXT NULL,
        worktree_id INTEGER NULL,
        agent_guide_path TEXT NULL,
        agent_override TEXT NULL,
        task_spec_json TEXT NULL,
        scope_task_ids_json TEXT NULL,
        scope_case_ids_json TEXT NULL,
        scope_node_ids_json TEXT NULL,
        tmux_session_name TEXT NULL,
        tmux_window_name TEXT NULL,
        tmux_pane_id TEXT NULL,
        launch_command TEXT NULL,
        log_file_path TEXT NULL,
        provider_type TEXT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT NULL,
        completed_at TEXT NULL,
        updated_at TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_threads_session_parent ON threads(session_id, parent_thread_id, id DESC);",
    "CREATE INDEX IF NOT EXISTS idx_threads_status ON threads(status);",
    "CREATE TABLE IF NOT EXISTS review_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        merge_request_id INTEGER NOT NULL,
        session_id INTEGER NOT NULL,
        reviewer_thread_id INTEGER NULL,
        state TEXT NOT NULL,
        notes_json TEXT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_review_jobs_merge_request ON review_jobs(merge_request_id, id DESC);",
    "CREATE TABLE IF NOT EXISTS inbox_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_thread_id INTEGER NOT NULL,
        receiver_thread_id INTEGER NOT NULL,
        message TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        delivered_at TEXT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_inbox_receiver_status ON inbox_messages(receiver_thread_id, status, id);",
    "CREATE TABLE IF NOT EXISTS runtime_prereq_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NULL,
        requirement TEXT NOT NULL,
        status TEXT NOT NULL,
        detail TEXT NULL,
        created_at TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS mirror_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        db_version INTEGER NOT NULL DEFAULT 0,
        md_version INTEGER NOT NULL DEFAULT 0,
        md_path TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL
    );",
    "INSERT OR IGNORE INTO mirror_meta(id, db_version, md_version, md_path, updated_at)
     VALUES(1, 0, 0, '', strftime('%Y-%m-%dT%H:%M:%fZ','now'));",
];

pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        if let Err(err) = conn.execute_batch(statement) {
            if statement.contains("ALTER TABLE") && err.to_string().contains("duplicate column name")
            {
                continue;
            }
            return Err(StoreError::Sql(err));
        }
    }
    Ok(())
}
