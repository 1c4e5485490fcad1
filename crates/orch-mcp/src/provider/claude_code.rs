#![forbid(unsafe_code)]

use super::{Provider, Status};
use regex::Regex;
use std::sync::LazyLock;

static ANSI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
static RESPONSE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"⏺(?:\x1b\[[0-9;]*m)*\s+").unwrap());
static PROCESSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[✶✢✽✻·✳].*….*\(esc to interrupt.*\)").unwrap());
static IDLE_PROMPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">[\s\x{00A0}]").unwrap());
static WAITING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"❯.*\d+\.").unwrap());
static SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"─{4,}").unwrap());
static PROMPT_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^>\s").unwrap());

#[derive(Debug, Default)]
pub struct ClaudeCodeProvider {}

impl ClaudeCodeProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl Provider for ClaudeCodeProvider {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn idle_pattern_for_log(&self) -> &'static str {
        r">\s"
    }

    fn exit_command(&self) -> &'static str {
        "/exit"
    }

    fn status(&self, output: &str) -> Status {
        if PROCESSING.is_match(output) {
            return Status::Processing;
        }
        if WAITING.is_match(output) {
            return Status::WaitingUserAnswer;
        }

        let has_response = RESPONSE_MARKER.is_match(output);
        let has_prompt = IDLE_PROMPT.is_match(output);

        if has_prompt && has_response {
            return Status::Completed;
        }
        if has_prompt {
            return Status::Idle;
        }

        Status::Error
    }

    fn extract_last_response(&self, output: &str) -> String {
        let Some(last_match) = RESPONSE_MARKER.find_iter(output).last() else {
            return String::new();
        };

        let remaining = &output[last_match.end()..];
        let mut response_lines: Vec<String> = Vec::new();
        for line in remaining.split('\n') {
            let trimmed = line.trim();
            if PROMPT_LINE.is_match(trimmed) || SEPARATOR.is_match(trimmed) {
                break;
            }
            response_lines.push(trimmed.to_string());
        }

        let result = response_lines.join("\n").trim().to_string();
        ANSI.replace_all(&result, "").to_string()
    }
}
