#![forbid(unsafe_code)]
//! Flows that exercise the real version-control backend: session bootstrap
//! with an isolated session-root worktree, task-branch spawning, merge-back,
//! the mainline merge queue, and the resume handshake.

mod support;

use serde_json::json;
use support::{call, service_for, temp_git_repo};

#[test]
fn session_open_allocates_a_session_root_worktree() {
    let dir = temp_git_repo("session_open_allocates_a_session_root_worktree");
    let mut service = service_for(&dir);

    let opened = call(
        &mut service,
        "session.open",
        json!({
            "owner": "dev",
            "worktree_name": "Fix the login flow",
        }),
    );

    assert_eq!(opened["worktree_slug"], "fix-login");
    let session = &opened["session_context"]["session"];
    assert_eq!(session["status"], "active_new");
    assert_eq!(session["runtime_state"], "root_local_ready");
    assert_eq!(session["intent"], "new_work");

    let session_root = &opened["session_context"]["session_root_worktree"];
    assert_eq!(session_root["kind"], "session_root");
    assert_eq!(session_root["merge_state"], "active");
    let branch = session_root["branch"].as_str().expect("branch");
    assert!(branch.starts_with("task/"));
    assert!(branch.ends_with("/fix-login"));
    let path = session_root["path"].as_str().expect("path");
    assert!(path.contains(".codex-orch/worktrees/fix-login"));
    assert!(std::path::Path::new(path).is_dir(), "worktree materialised");

    let hint = opened["child_attach_hint"].as_str().expect("attach hint");
    assert!(hint.starts_with("tmux attach -r -t "));
}

#[test]
fn slug_collisions_bump_the_suffix() {
    let dir = temp_git_repo("slug_collisions_bump_the_suffix");
    let mut service = service_for(&dir);

    let first = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "refactor parser" }),
    );
    assert_eq!(first["worktree_slug"], "refactor-parser");

    let second = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "refactor parser" }),
    );
    assert_eq!(second["worktree_slug"], "refactor-parser-2");
}

#[test]
fn main_merge_queue_requires_children_merged_to_parent() {
    let dir = temp_git_repo("main_merge_queue_requires_children_merged_to_parent");
    let mut service = service_for(&dir);

    let opened = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "feature work" }),
    );
    let session_id = opened["session_context"]["session"]["id"]
        .as_i64()
        .expect("session id");
    let session_root_id = opened["session_context"]["session_root_worktree"]["id"]
        .as_i64()
        .expect("session root id");

    let child_a = call(
        &mut service,
        "worktree.spawn",
        json!({
            "session_id": session_id,
            "parent_worktree_id": session_root_id,
            "reason": "write the tests",
        }),
    );
    let child_b = call(
        &mut service,
        "worktree.spawn",
        json!({
            "session_id": session_id,
            "parent_worktree_id": session_root_id,
            "reason": "update the docs",
        }),
    );
    assert_eq!(child_a["kind"], "task_branch");
    assert_eq!(child_b["merge_state"], "active");

    let merged_a = call(
        &mut service,
        "worktree.merge_to_parent",
        json!({
            "session_id": session_id,
            "worktree_id": child_a["id"],
        }),
    );
    assert_eq!(merged_a["result"], "merged_to_parent");
    assert_eq!(merged_a["child_worktree"]["merge_state"], "merged_to_parent");
    assert_eq!(merged_a["child_worktree"]["status"], "closed");

    let err = service
        .handle(
            "merge.main.request",
            json!({
                "session_id": session_id,
                "from_worktree_id": session_root_id,
            }),
        )
        .expect_err("one child is still unmerged");
    assert_eq!(err.kind(), "conflict");
    assert!(err
        .to_string()
        .contains("session-root has 1 unmerged child worktrees"));

    call(
        &mut service,
        "worktree.merge_to_parent",
        json!({
            "session_id": session_id,
            "worktree_id": child_b["id"],
        }),
    );

    let queued = call(
        &mut service,
        "merge.main.request",
        json!({
            "session_id": session_id,
            "from_worktree_id": session_root_id,
        }),
    );
    assert_eq!(queued["main_merge_request"]["state"], "queued");
    assert_eq!(queued["main_merge_request"]["target_branch"], "main");

    let head = call(&mut service, "merge.main.next", json!({}));
    assert_eq!(head["id"], queued["main_merge_request"]["id"]);

    let lock = call(
        &mut service,
        "merge.main.acquire_lock",
        json!({ "session_id": session_id }),
    );
    assert_eq!(lock["state"], "locked");
    let released = call(
        &mut service,
        "merge.main.release_lock",
        json!({ "session_id": session_id }),
    );
    assert_eq!(released["state"], "unlocked");
}

#[test]
fn resume_candidates_attach_inherits_worktrees_and_ref() {
    let dir = temp_git_repo("resume_candidates_attach_inherits_worktrees_and_ref");
    let mut service = service_for(&dir);

    let opened = call(
        &mut service,
        "session.open",
        json!({ "worktree_name": "long running intent" }),
    );
    let suspended_id = opened["session_context"]["session"]["id"]
        .as_i64()
        .expect("suspended session id");
    let session_root_id = opened["session_context"]["session_root_worktree"]["id"]
        .as_i64()
        .expect("session root id");

    let task = call(
        &mut service,
        "task.create",
        json!({ "level": "case", "title": "recoverable case" }),
    );
    let case_id = task["id"].as_i64().expect("case id");
    call(
        &mut service,
        "case.begin",
        json!({ "case_id": case_id, "session_id": suspended_id }),
    );
    call(
        &mut service,
        "step.check",
        json!({
            "case_id": case_id,
            "session_id": suspended_id,
            "step_title": "S1",
            "result": "ok",
        }),
    );
    call(
        &mut service,
        "case.complete",
        json!({
            "case_id": case_id,
            "session_id": suspended_id,
            "summary": "first pass done",
            "next_action": "verify on ci",
        }),
    );
    // Leave an active ref pointing at the case for the resuming session.
    call(
        &mut service,
        "case.begin",
        json!({ "case_id": case_id, "session_id": suspended_id }),
    );

    std::thread::sleep(std::time::Duration::from_millis(1100));

    let reopened = call(
        &mut service,
        "session.open",
        json!({
            "intent": "resume_work",
            "heartbeat_timeout_seconds": 1,
        }),
    );
    assert_eq!(reopened["action_required"], "select_resume_candidate");
    let requester_id = reopened["session"]["id"].as_i64().expect("requester id");
    let candidates = reopened["resume_candidates"].as_array().expect("candidates");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["session"]["id"], suspended_id);
    assert_eq!(candidates[0]["current_ref"]["node_id"], case_id);

    let attached = call(
        &mut service,
        "resume.candidates.attach",
        json!({
            "requester_session_id": requester_id,
            "target_session_id": suspended_id,
        }),
    );
    assert_eq!(attached["session"]["status"], "active_resume");
    assert_eq!(attached["session"]["intent"], "resume_work");
    assert_eq!(
        attached["session_root_worktree"]["id"], session_root_id,
        "requester inherits the target's session-root worktree"
    );
    assert_eq!(attached["current_ref"]["mode"], "resume");
    assert_eq!(attached["current_ref"]["node_id"], case_id);

    let target_context = call(
        &mut service,
        "session.context",
        json!({ "session_id": suspended_id }),
    );
    assert_eq!(target_context["session"]["status"], "handoff_attached");
}
