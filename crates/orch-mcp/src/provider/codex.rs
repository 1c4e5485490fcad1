#![forbid(unsafe_code)]

use super::{Provider, Status};
use regex::Regex;
use std::sync::LazyLock;

static ANSI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
static IDLE_PROMPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:❯|›|codex>)").unwrap());
static IDLE_AT_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^\s*(?:❯|›|codex>)\s*)\s*\z").unwrap());
static USER_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^You\b").unwrap());
static ASSISTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:assistant|codex|agent)\s*:").unwrap());
static WAITING_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:Approve|Allow)\b.*\b(?:y/n|yes/no|yes|no)\b").unwrap());
static ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:Error:|ERROR:|Traceback \(most recent call last\):|panic:)").unwrap()
});

#[derive(Debug, Default)]
pub struct CodexProvider {}

impl CodexProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl Provider for CodexProvider {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn idle_pattern_for_log(&self) -> &'static str {
        r"(?:❯|›|codex>)\s*$"
    }

    fn exit_command(&self) -> &'static str {
        "/exit"
    }

    fn status(&self, output: &str) -> Status {
        let clean = ANSI.replace_all(output, "");

        let last_user_idx = USER_PREFIX.find_iter(&clean).last().map(|m| m.start());

        let after_user = match last_user_idx {
            Some(idx) => &clean[idx..],
            None => &clean[..],
        };
        let assistant_after_user = last_user_idx.is_some() && ASSISTANT.is_match(after_user);
        let has_idle_at_end = IDLE_AT_END.is_match(&clean);

        // Errors and approval prompts only count after the last user message
        // and outside an assistant response block.
        if last_user_idx.is_some() && !assistant_after_user {
            if WAITING_PROMPT.is_match(after_user) {
                return Status::WaitingUserAnswer;
            }
            if ERROR_PATTERN.is_match(after_user) {
                return Status::Error;
            }
        }

        if has_idle_at_end {
            if assistant_after_user {
                return Status::Completed;
            }
            return Status::Idle;
        }

        Status::Processing
    }

    fn extract_last_response(&self, output: &str) -> String {
        let clean = ANSI.replace_all(output, "");
        let lines: Vec<&str> = clean.split('\n').collect();

        let mut response_lines: Vec<String> = Vec::new();
        let mut in_response = false;
        for raw in lines.iter().rev() {
            let line = raw.trim();
            if IDLE_PROMPT.is_match(line) && IDLE_PROMPT.replace_all(line, "").trim().is_empty() {
                continue;
            }
            if ASSISTANT.is_match(line) {
                response_lines.insert(0, ASSISTANT.replace_all(line, "").trim().to_string());
                break;
            }
            if USER_PREFIX.is_match(line) {
                break;
            }
            if in_response || !response_lines.is_empty() || !line.is_empty() {
                response_lines.insert(0, line.to_string());
                in_response = true;
            }
        }

        response_lines.join("\n").trim().to_string()
    }
}
