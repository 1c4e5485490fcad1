#![forbid(unsafe_code)]
//! Per-thread strategies for reading agent status out of terminal text.
//!
//! Providers are pure functions over text and carry no per-thread state.

mod claude_code;
mod codex;
mod registry;

pub use claude_code::ClaudeCodeProvider;
pub use codex::CodexProvider;
pub use registry::ProviderRegistry;

use crate::error::ServiceError;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Idle,
    Processing,
    Completed,
    WaitingUserAnswer,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::WaitingUserAnswer => "waiting_user_answer",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "waiting_user_answer" => Some(Self::WaitingUserAnswer),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Strategy for one agent CLI running in a multiplexer pane.
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyse terminal output and classify the agent's state.
    fn status(&self, output: &str) -> Status;

    /// Fast-path idle regex applied to pipe-pane log tails.
    fn idle_pattern_for_log(&self) -> &'static str;

    /// Extract the agent's last response block from captured output.
    fn extract_last_response(&self, output: &str) -> String;

    /// Command that exits the agent CLI.
    fn exit_command(&self) -> &'static str;
}

pub fn new_by_type(provider_type: &str) -> Result<Arc<dyn Provider>, ServiceError> {
    match provider_type {
        "codex" => Ok(Arc::new(CodexProvider::new())),
        "claude_code" => Ok(Arc::new(ClaudeCodeProvider::new())),
        other => Err(ServiceError::Validation(format!(
            "unknown provider type: {other}"
        ))),
    }
}
