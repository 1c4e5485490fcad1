#![forbid(unsafe_code)]

use orch_mcp::provider::{ClaudeCodeProvider, CodexProvider, Provider, Status};

#[test]
fn codex_status_classification() {
    let provider = CodexProvider::new();

    assert_eq!(provider.status("Welcome to codex\n❯ "), Status::Idle);
    assert_eq!(
        provider.status("You: fix the bug\ncodex: patched the handler\n❯ "),
        Status::Completed
    );
    assert_eq!(
        provider.status("You: run the migration\nApprove this command? y/n"),
        Status::WaitingUserAnswer
    );
    assert_eq!(
        provider.status("You: run the build\nError: linker exploded"),
        Status::Error
    );
    assert_eq!(
        provider.status("You: refactor everything\nstill chewing on it"),
        Status::Processing
    );
}

#[test]
fn codex_extracts_the_last_assistant_response() {
    let provider = CodexProvider::new();
    let output = "You: what changed?\ncodex: two files were rewritten\n❯";
    assert_eq!(
        provider.extract_last_response(output),
        "two files were rewritten"
    );
}

#[test]
fn claude_code_status_classification() {
    let provider = ClaudeCodeProvider::new();

    assert_eq!(provider.status("> "), Status::Idle);
    assert_eq!(
        provider.status("✶ Pondering… (esc to interrupt)"),
        Status::Processing
    );
    assert_eq!(provider.status("❯ 1. Yes, continue"), Status::WaitingUserAnswer);
    assert_eq!(
        provider.status("⏺ Finished the refactor\n\n> "),
        Status::Completed
    );
    assert_eq!(provider.status("garbage with no prompt"), Status::Error);
}

#[test]
fn claude_code_extracts_the_last_response_block() {
    let provider = ClaudeCodeProvider::new();
    let output = "⏺ All tests pass\nnothing left to do\n────────\n> ";
    assert_eq!(
        provider.extract_last_response(output),
        "All tests pass\nnothing left to do"
    );
}

#[test]
fn status_is_a_pure_function_of_the_text() {
    let codex = CodexProvider::new();
    let claude = ClaudeCodeProvider::new();
    let samples = [
        "❯ ",
        "You: go\ncodex: done\n❯ ",
        "✶ Thinking… (esc to interrupt)",
        "random noise",
    ];
    for sample in samples {
        assert_eq!(codex.status(sample), codex.status(sample), "{sample:?}");
        assert_eq!(claude.status(sample), claude.status(sample), "{sample:?}");
    }
}

#[test]
fn exit_commands_and_idle_patterns_are_stable() {
    let codex = CodexProvider::new();
    let claude = ClaudeCodeProvider::new();
    assert_eq!(codex.exit_command(), "/exit");
    assert_eq!(claude.exit_command(), "/exit");
    assert!(!codex.idle_pattern_for_log().is_empty());
    assert!(!claude.idle_pattern_for_log().is_empty());
    assert_eq!(codex.name(), "codex");
    assert_eq!(claude.name(), "claude_code");
}
