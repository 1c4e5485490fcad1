#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    NotFound {
        entity: &'static str,
        id: i64,
    },
    LockConflict {
        lock_id: i64,
        scope_type: String,
        scope_path: String,
    },
    MainMergeLockHeld {
        holder_session_id: i64,
        lease_until: String,
    },
    MainMergeLockNotOwned,
    UnmergedChildren {
        count: i64,
    },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Sql(_) => "INTERNAL",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::LockConflict { .. }
            | Self::MainMergeLockHeld { .. }
            | Self::MainMergeLockNotOwned
            | Self::UnmergedChildren { .. } => "CONFLICT",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "{message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::LockConflict {
                lock_id,
                scope_type,
                scope_path,
            } => write!(f, "lock conflict with #{lock_id} ({scope_type}:{scope_path})"),
            Self::MainMergeLockHeld {
                holder_session_id,
                lease_until,
            } => write!(
                f,
                "main merge lock held by session {holder_session_id} until {lease_until}"
            ),
            Self::MainMergeLockNotOwned => {
                write!(f, "main merge lock is held by another session")
            }
            Self::UnmergedChildren { count } => {
                write!(f, "session-root has {count} unmerged child worktrees")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
