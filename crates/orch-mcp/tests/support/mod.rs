#![forbid(unsafe_code)]

use orch_mcp::service::Service;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Command;

pub fn temp_repo(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("orch_mcp_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp repo dir");
    dir
}

/// A real git repository with one commit, so worktree and branch operations
/// run for real.
pub fn temp_git_repo(test_name: &str) -> PathBuf {
    let dir = temp_repo(test_name);
    git(&dir, &["init", "--initial-branch=main"]);
    git(&dir, &["config", "user.email", "orchestrator@example.test"]);
    git(&dir, &["config", "user.name", "Orchestrator Tests"]);
    git(&dir, &["commit", "--allow-empty", "-m", "init"]);
    dir
}

fn git(dir: &PathBuf, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
}

pub fn service_for(dir: &PathBuf) -> Service {
    Service::new(dir).expect("construct service")
}

/// Open a session in resume_work intent: no worktree allocation, no git and
/// no multiplexer required.
pub fn open_idle_session(service: &mut Service) -> i64 {
    let result = service
        .handle("session.open", json!({ "intent": "resume_work" }))
        .expect("open session");
    result["session"]["id"].as_i64().expect("session id")
}

pub fn call(service: &mut Service, method: &str, params: Value) -> Value {
    service
        .handle(method, params)
        .unwrap_or_else(|err| panic!("{method} failed: {err}"))
}
