#![forbid(unsafe_code)]

mod support;

use serde_json::json;
use support::{call, open_idle_session, service_for, temp_repo};

#[test]
fn workspace_init_reports_repo_and_db_paths() {
    let dir = temp_repo("workspace_init_reports_repo_and_db_paths");
    let mut service = service_for(&dir);
    let result = call(&mut service, "workspace.init", json!({}));
    let db_path = result["db_path"].as_str().expect("db path");
    assert!(db_path.ends_with(".codex-orch/state.db"));
}

#[test]
fn unknown_method_is_a_structured_not_found() {
    let dir = temp_repo("unknown_method_is_a_structured_not_found");
    let mut service = service_for(&dir);
    let err = service
        .handle("no.such.method", json!({}))
        .expect_err("unknown method must fail");
    assert_eq!(err.kind(), "not_found");
    assert!(err.to_string().contains("no.such.method"));
}

#[test]
fn decide_worktree_scores_and_reasons_match_the_weights() {
    let dir = temp_repo("decide_worktree_scores_and_reasons_match_the_weights");
    let mut service = service_for(&dir);

    let shared = call(
        &mut service,
        "scheduler.decide_worktree",
        json!({
            "changed_files": 2,
            "estimate_minutes": 15,
            "risk": 1,
            "parallel_workers": 1,
            "conflicting_paths": 1,
        }),
    );
    assert_eq!(shared["mode"], "shared");
    assert_eq!(shared["score"], 9);
    assert_eq!(
        shared["reasons"],
        json!([
            "changed_files=2",
            "estimate_minutes=15(+1)",
            "risk=1(+3)",
            "parallel_workers=1(+2)",
            "conflicting_paths=1(+2)",
        ])
    );

    let isolated = call(
        &mut service,
        "scheduler.decide_worktree",
        json!({
            "changed_files": 6,
            "estimate_minutes": 60,
            "risk": 2,
            "parallel_workers": 2,
            "conflicting_paths": 2,
        }),
    );
    assert_eq!(isolated["mode"], "worktree");
    assert_eq!(isolated["score"], 24);

    for (files, mode) in [(11, "shared"), (12, "worktree"), (13, "worktree")] {
        let result = call(
            &mut service,
            "scheduler.decide_worktree",
            json!({ "changed_files": files }),
        );
        assert_eq!(result["score"], files);
        assert_eq!(result["mode"], mode, "score {files}");
    }
}

#[test]
fn lock_conflict_round_trip_over_dispatch() {
    let dir = temp_repo("lock_conflict_round_trip_over_dispatch");
    let mut service = service_for(&dir);

    let lock = call(
        &mut service,
        "lock.acquire",
        json!({
            "scope_type": "prefix",
            "scope_path": "src/api",
            "owner_session": "A",
            "ttl_seconds": 300,
        }),
    );
    let lock_id = lock["id"].as_i64().expect("lock id");

    let err = service
        .handle(
            "lock.acquire",
            json!({
                "scope_type": "file",
                "scope_path": "src/api/users.go",
                "owner_session": "B",
            }),
        )
        .expect_err("contained file conflicts with the prefix");
    assert_eq!(err.kind(), "conflict");
    assert!(err.to_string().contains(&format!("#{lock_id}")));

    call(&mut service, "lock.release", json!({ "lock_id": lock_id }));
    call(
        &mut service,
        "lock.acquire",
        json!({
            "scope_type": "file",
            "scope_path": "src/api/users.go",
            "owner_session": "B",
        }),
    );
}

#[test]
fn delegation_gate_blocks_mutations_until_handoff_ack() {
    let dir = temp_repo("delegation_gate_blocks_mutations_until_handoff_ack");
    let mut service = service_for(&dir);
    let session_id = open_idle_session(&mut service);

    // First spawn implicitly creates the root thread; no pane without tmux.
    let spawned = call(
        &mut service,
        "thread.child.spawn",
        json!({
            "session_id": session_id,
            "objective": "initial worker",
            "ensure_tmux": false,
        }),
    );
    assert_eq!(spawned["thread"]["status"], "planned");
    assert_eq!(spawned["tmux"]["status"], "skipped");

    let delegated = call(
        &mut service,
        "orchestration.delegate",
        json!({
            "session_id": session_id,
            "user_request": "drive the plan",
            "ensure_tmux": false,
        }),
    );
    let root_thread_id = delegated["root_thread"]["id"].as_i64().expect("root id");
    assert_eq!(delegated["session"]["delegation_state"], "delegated");
    assert!(delegated["session"]["delegation_acked_at"].is_null());
    assert_eq!(delegated["session"]["runtime_state"], "delegated_to_root");

    let err = service
        .handle(
            "thread.child.spawn",
            json!({
                "session_id": session_id,
                "objective": "blocked worker",
                "ensure_tmux": false,
            }),
        )
        .expect_err("gate must reject while unacknowledged");
    assert_eq!(err.kind(), "conflict");
    let message = err.to_string();
    assert!(message.contains(&format!("root thread {root_thread_id}")));
    assert!(message.contains("thread.child.spawn"));

    // Read-only and handoff methods bypass the gate.
    call(&mut service, "session.context", json!({ "session_id": session_id }));
    let acked = call(
        &mut service,
        "thread.root.handoff_ack",
        json!({
            "session_id": session_id,
            "thread_id": root_thread_id,
        }),
    );
    assert_eq!(acked["session"]["delegation_state"], "acknowledged");
    assert!(acked["session"]["delegation_acked_at"].is_string());
    assert_eq!(acked["session"]["runtime_state"], "root_active");

    let spawned_again = call(
        &mut service,
        "thread.child.spawn",
        json!({
            "session_id": session_id,
            "objective": "unblocked worker",
            "ensure_tmux": false,
        }),
    );
    assert_eq!(spawned_again["thread"]["status"], "planned");
}

#[test]
fn current_ref_flows_from_case_execution() {
    let dir = temp_repo("current_ref_flows_from_case_execution");
    let mut service = service_for(&dir);
    let session_id = open_idle_session(&mut service);

    let task = call(
        &mut service,
        "task.create",
        json!({ "level": "case", "title": "implement the parser" }),
    );
    let case_id = task["id"].as_i64().expect("case id");

    call(
        &mut service,
        "case.begin",
        json!({
            "case_id": case_id,
            "session_id": session_id,
            "input_contract": { "goal": "parse" },
            "fixtures": ["fixture-1"],
        }),
    );
    let step = call(
        &mut service,
        "step.check",
        json!({
            "case_id": case_id,
            "session_id": session_id,
            "step_title": "S1",
            "result": "ok",
        }),
    );
    assert_eq!(step["order_no"], 1);

    let current = call(
        &mut service,
        "work.current_ref",
        json!({ "session_id": session_id }),
    );
    assert_eq!(current["source"], "current_refs");
    assert_eq!(current["current_ref"]["node_id"], case_id);
    let ref_id = current["current_ref"]["id"].as_i64().expect("ref id");
    let version_before = current["current_ref"]["version"].as_i64().expect("version");

    let acked = call(
        &mut service,
        "work.current_ref.ack",
        json!({ "session_id": session_id, "ref_id": ref_id }),
    );
    assert_eq!(
        acked["version"].as_i64().expect("acked version"),
        version_before + 1
    );
    assert!(acked["acked_at"].is_string());

    let done = call(
        &mut service,
        "case.complete",
        json!({
            "case_id": case_id,
            "session_id": session_id,
            "summary": "parser done",
            "next_action": "review",
        }),
    );
    assert_eq!(done["status"], "done");
}

#[test]
fn rollup_submit_promotes_node_and_counts_children() {
    let dir = temp_repo("rollup_submit_promotes_node_and_counts_children");
    let mut service = service_for(&dir);

    let bootstrap = call(
        &mut service,
        "plan.bootstrap",
        json!({
            "initiative_title": "Ship the orchestrator",
            "plan_title": "Phase one",
        }),
    );
    let plan_id = bootstrap["plan"]["id"].as_i64().expect("plan id");
    assert_eq!(bootstrap["edge"]["edge_type"], "contains");

    let slices = call(
        &mut service,
        "plan.slice.generate",
        json!({
            "plan_node_id": plan_id,
            "slice_specs": [
                { "title": "storage slice" },
                { "title": "dispatch slice" },
            ],
        }),
    );
    assert_eq!(slices["slices"].as_array().expect("slices").len(), 2);

    let submitted = call(
        &mut service,
        "plan.rollup.submit",
        json!({ "node_id": plan_id, "summary": "phase one complete" }),
    );
    assert_eq!(submitted["node"]["approval_state"], "pending");
    assert_eq!(submitted["node"]["status"], "in_review");
    assert_eq!(submitted["preview"]["child_count"], 2);
    assert_eq!(submitted["preview"]["status_counts"]["todo"], 2);

    let approved = call(
        &mut service,
        "plan.rollup.approve",
        json!({ "node_id": plan_id }),
    );
    assert_eq!(approved["approval_state"], "approved");
    assert_eq!(approved["status"], "done");
}

#[test]
fn mirror_refresh_is_restricted_and_clears_outdated() {
    let dir = temp_repo("mirror_refresh_is_restricted_and_clears_outdated");
    let mut service = service_for(&dir);

    call(
        &mut service,
        "task.create",
        json!({ "level": "feature", "title": "tracked work" }),
    );
    let status = call(&mut service, "mirror.status", json!({}));
    assert_eq!(status["outdated"], true);

    let err = service
        .handle("mirror.refresh", json!({ "requester_role": "worker" }))
        .expect_err("non doc-mirror-manager role must be rejected");
    assert_eq!(err.kind(), "validation");

    let refreshed = call(
        &mut service,
        "mirror.refresh",
        json!({ "requester_role": "doc-mirror-manager" }),
    );
    assert_eq!(refreshed["mirror_status"]["outdated"], false);
    let path = refreshed["path"].as_str().expect("mirror path");
    let body = std::fs::read_to_string(path).expect("mirror file written");
    assert!(body.contains("Task status counts"));
    assert!(body.contains("todo: 1"));
}
