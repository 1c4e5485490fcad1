#![forbid(unsafe_code)]
//! Lifecycle flows against a live terminal multiplexer. Each test exits
//! early when no tmux binary is on PATH, so the suite stays runnable on
//! minimal machines.

mod support;

use serde_json::json;
use std::process::Command;
use support::{call, service_for, temp_git_repo};

fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn kill_tmux_session(name: &str) {
    let _ = Command::new("tmux").args(["kill-session", "-t", name]).output();
}

#[test]
fn child_thread_lifecycle_against_live_panes() {
    if !tmux_available() {
        return;
    }

    let dir = temp_git_repo("child_thread_lifecycle_against_live_panes");
    let mut service = service_for(&dir);

    let opened = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "pane lifecycle" }),
    );
    let session_id = opened["session_context"]["session"]["id"]
        .as_i64()
        .expect("session id");
    let viewer_session = opened["viewer_tmux_session"]
        .as_str()
        .expect("viewer session name")
        .to_string();

    let spawned = call(
        &mut service,
        "thread.child.spawn",
        json!({
            "session_id": session_id,
            "objective": "sleep quietly",
            "launch_command": "sleep 600",
            "skip_ready_check": true,
        }),
    );
    let thread_id = spawned["thread"]["id"].as_i64().expect("thread id");
    assert_eq!(spawned["thread"]["status"], "running");
    let pane_id = spawned["thread"]["tmux_pane_id"]
        .as_str()
        .expect("pane bound")
        .to_string();
    assert!(!pane_id.is_empty());
    let log_path = spawned["thread"]["log_file_path"]
        .as_str()
        .expect("log path")
        .to_string();
    assert!(log_path.ends_with(&format!("thread_{thread_id}.log")));

    // A sleeping pane never matches the provider's idle pattern.
    let waited = call(
        &mut service,
        "thread.child.wait_status",
        json!({ "thread_id": thread_id, "timeout_seconds": 1 }),
    );
    assert_eq!(waited["result"], "timeout");

    let status = call(
        &mut service,
        "thread.child.status",
        json!({ "thread_id": thread_id }),
    );
    assert_eq!(status["pane_exists"], true);

    let interrupted = call(
        &mut service,
        "thread.child.interrupt",
        json!({ "thread_id": thread_id }),
    );
    assert_eq!(interrupted["thread"]["status"], "interrupted");

    let stopped = call(
        &mut service,
        "thread.child.stop",
        json!({ "thread_id": thread_id, "terminate_pane": true }),
    );
    assert_eq!(stopped["thread"]["status"], "stopped");
    assert!(stopped["thread"]["tmux_pane_id"].is_null());

    let attach = call(
        &mut service,
        "thread.attach_info",
        json!({ "session_id": session_id }),
    );
    assert_eq!(attach["tmux_session"], viewer_session.as_str());

    kill_tmux_session(&viewer_session);
}

#[test]
fn bounded_concurrency_recycles_terminal_children() {
    if !tmux_available() {
        return;
    }

    let dir = temp_git_repo("bounded_concurrency_recycles_terminal_children");
    let mut service = service_for(&dir);

    let opened = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "capacity check" }),
    );
    let session_id = opened["session_context"]["session"]["id"]
        .as_i64()
        .expect("session id");
    let viewer_session = opened["viewer_tmux_session"]
        .as_str()
        .expect("viewer session name")
        .to_string();

    let spawn = |service: &mut orch_mcp::service::Service| {
        call(
            service,
            "thread.child.spawn",
            json!({
                "session_id": session_id,
                "launch_command": "sleep 600",
                "skip_ready_check": true,
                "max_concurrent_children": 1,
            }),
        )
    };

    let first = spawn(&mut service);
    let first_id = first["thread"]["id"].as_i64().expect("first thread id");

    // Capacity 1 with a live non-terminal child: the next spawn must fail.
    let err = service
        .handle(
            "thread.child.spawn",
            json!({
                "session_id": session_id,
                "launch_command": "sleep 600",
                "skip_ready_check": true,
                "max_concurrent_children": 1,
            }),
        )
        .expect_err("no recyclable child at capacity");
    assert_eq!(err.kind(), "conflict");
    assert!(err.to_string().contains("child thread limit reached"));

    // A stopped child is recyclable: its pane is killed to admit the next.
    call(
        &mut service,
        "thread.child.stop",
        json!({ "thread_id": first_id }),
    );
    let second = spawn(&mut service);
    assert_eq!(second["thread"]["status"], "running");

    let first_after = call(
        &mut service,
        "thread.child.list",
        json!({ "session_id": session_id }),
    );
    let threads = first_after["threads"].as_array().expect("threads");
    let recycled = threads
        .iter()
        .find(|thread| thread["id"] == first_id)
        .expect("first thread still listed");
    assert_eq!(recycled["status"], "stopped");
    assert!(recycled["tmux_pane_id"].is_null(), "pane binding cleared");

    kill_tmux_session(&viewer_session);
}
