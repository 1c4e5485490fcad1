#![forbid(unsafe_code)]

use orch_storage::StoreError;

/// Failure taxonomy surfaced to the dispatcher. Every variant carries an
/// operator-readable message; the dispatcher encodes them as JSON-RPC errors.
#[derive(Debug)]
pub enum ServiceError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    External(String),
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::External(_) => "external",
            Self::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::External(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        let message = value.to_string();
        match value.code() {
            "INVALID_INPUT" => Self::Validation(message),
            "NOT_FOUND" => Self::NotFound(message),
            "CONFLICT" => Self::Conflict(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(format!("encode/decode failed: {value}"))
    }
}
