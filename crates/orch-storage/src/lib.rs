#![forbid(unsafe_code)]
//! Durable state for the collaboration orchestrator.
//!
//! One SQLite file per repository, one open connection, one transaction per
//! mutating call. Every mutating transaction bumps the process-wide database
//! version used by the mirror-outdated flag.

mod error;
mod graph;
mod inbox;
mod locks;
mod mirror;
mod schema;
mod sessions;
mod support;
mod tasks;
mod threads;
mod types;
mod worktrees;

use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub use error::StoreError;
pub use types::*;

pub const DEFAULT_LOCK_TTL_SECONDS: i64 = 600;
pub const DEFAULT_MAIN_MERGE_LOCK_TTL_SECONDS: i64 = 600;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECONDS: i64 = 60;
pub const DEFAULT_SESSION_CLEANUP_TIMEOUT_SECONDS: i64 = 3600;

#[derive(Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating parent directories and schema as needed) the store at
    /// the given database file path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        schema::migrate(&conn)?;
        Ok(Self { db_path, conn })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
