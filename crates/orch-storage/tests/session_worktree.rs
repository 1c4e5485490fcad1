#![forbid(unsafe_code)]

use orch_storage::{
    CurrentRefUpsertArgs, InboxMessageCreateArgs, MainMergeRequestArgs, SessionOpenArgs,
    SqliteStore, StoreError, WorktreeCreateArgs,
};
use std::path::PathBuf;

fn temp_db(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("orch_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir.join("state.db")
}

fn open_session(store: &mut SqliteStore, repo: &str) -> i64 {
    store
        .open_session(SessionOpenArgs {
            agent_role: "codex".to_string(),
            owner: "tester".to_string(),
            repo_path: repo.to_string(),
            ..SessionOpenArgs::default()
        })
        .expect("open session")
        .id
}

#[test]
fn at_most_one_active_current_ref_per_session() {
    let db_path = temp_db("at_most_one_active_current_ref_per_session");
    let mut store = SqliteStore::open(&db_path).expect("open store");
    let session_id = open_session(&mut store, "/tmp/repo-a");

    let first = store
        .upsert_current_ref(CurrentRefUpsertArgs {
            session_id,
            node_type: "case".to_string(),
            node_id: 11,
            mode: "compact".to_string(),
            status: "active".to_string(),
            summary: "first".to_string(),
            ..CurrentRefUpsertArgs::default()
        })
        .expect("first upsert");
    assert_eq!(first.version, 1);

    let second = store
        .upsert_current_ref(CurrentRefUpsertArgs {
            session_id,
            node_type: "case".to_string(),
            node_id: 12,
            mode: "compact".to_string(),
            status: "active".to_string(),
            summary: "second".to_string(),
            ..CurrentRefUpsertArgs::default()
        })
        .expect("second upsert");
    assert_eq!(second.id, first.id, "active row must be reused");
    assert_eq!(second.version, 2, "version must be monotone");
    assert_eq!(second.node_id, 12);
    assert!(second.acked_at.is_none(), "upsert clears the ack");

    let acked = store
        .ack_current_ref(session_id, second.id)
        .expect("ack ref");
    assert_eq!(acked.version, 3);
    assert!(acked.acked_at.is_some());

    let current = store
        .get_current_ref(session_id, true)
        .expect("get active ref")
        .expect("one active ref");
    assert_eq!(current.id, first.id);
}

#[test]
fn main_merge_enqueue_rejects_unmerged_children() {
    let db_path = temp_db("main_merge_enqueue_rejects_unmerged_children");
    let mut store = SqliteStore::open(&db_path).expect("open store");
    let session_id = open_session(&mut store, "/tmp/repo-b");

    let main = store
        .create_or_get_main_worktree("/tmp/repo-b", "main")
        .expect("main worktree");
    let session_root = store
        .create_worktree_record(WorktreeCreateArgs {
            task_id: 0,
            path: "/tmp/repo-b/.codex-orch/worktrees/root".to_string(),
            branch: "task/1/root".to_string(),
            status: "active".to_string(),
            kind: "session_root".to_string(),
            parent_worktree_id: Some(main.id),
            owner_session_id: Some(session_id),
            merge_state: "active".to_string(),
        })
        .expect("session root");

    let child_a = store
        .create_worktree_record(WorktreeCreateArgs {
            task_id: 0,
            path: "/tmp/repo-b/.codex-orch/worktrees/a".to_string(),
            branch: "task/1/a".to_string(),
            status: "active".to_string(),
            kind: "task_branch".to_string(),
            parent_worktree_id: Some(session_root.id),
            owner_session_id: Some(session_id),
            merge_state: "active".to_string(),
        })
        .expect("child a");
    let child_b = store
        .create_worktree_record(WorktreeCreateArgs {
            task_id: 0,
            path: "/tmp/repo-b/.codex-orch/worktrees/b".to_string(),
            branch: "task/1/b".to_string(),
            status: "active".to_string(),
            kind: "task_branch".to_string(),
            parent_worktree_id: Some(session_root.id),
            owner_session_id: Some(session_id),
            merge_state: "active".to_string(),
        })
        .expect("child b");

    store
        .mark_worktree_merged_to_parent(child_a.id)
        .expect("merge child a");

    let err = store
        .enqueue_main_merge(MainMergeRequestArgs {
            session_id,
            from_worktree_id: session_root.id,
            target_branch: "main".to_string(),
        })
        .expect_err("one child is still unmerged");
    match err {
        StoreError::UnmergedChildren { count } => assert_eq!(count, 1),
        other => panic!("expected UnmergedChildren, got {other:?}"),
    }

    store
        .mark_worktree_merged_to_parent(child_b.id)
        .expect("merge child b");

    let item = store
        .enqueue_main_merge(MainMergeRequestArgs {
            session_id,
            from_worktree_id: session_root.id,
            target_branch: "main".to_string(),
        })
        .expect("enqueue after all children merged");
    assert_eq!(item.state, "queued");

    let head = store
        .next_main_merge_request()
        .expect("queue head")
        .expect("one queued item");
    assert_eq!(head.id, item.id, "queue is FIFO from the head");
}

#[test]
fn main_merge_lock_is_exclusive_and_holder_renewable() {
    let db_path = temp_db("main_merge_lock_is_exclusive_and_holder_renewable");
    let mut store = SqliteStore::open(&db_path).expect("open store");
    let holder = open_session(&mut store, "/tmp/repo-c");
    let intruder = open_session(&mut store, "/tmp/repo-c");

    let lock = store
        .acquire_main_merge_lock(holder, 600)
        .expect("holder acquires");
    assert_eq!(lock.state, "locked");
    assert_eq!(lock.holder_session_id, Some(holder));

    let err = store
        .acquire_main_merge_lock(intruder, 600)
        .expect_err("second session must be rejected while leased");
    match err {
        StoreError::MainMergeLockHeld {
            holder_session_id, ..
        } => assert_eq!(holder_session_id, holder),
        other => panic!("expected MainMergeLockHeld, got {other:?}"),
    }

    let renewed = store
        .acquire_main_merge_lock(holder, 600)
        .expect("holder re-acquires without conflict");
    assert_eq!(renewed.holder_session_id, Some(holder));

    let err = store
        .release_main_merge_lock(intruder)
        .expect_err("non-holder cannot release");
    assert!(matches!(err, StoreError::MainMergeLockNotOwned));

    let released = store
        .release_main_merge_lock(holder)
        .expect("holder releases");
    assert_eq!(released.state, "unlocked");
    assert!(released.holder_session_id.is_none());
}

#[test]
fn inbox_deliver_moves_pending_messages_in_batch() {
    let db_path = temp_db("inbox_deliver_moves_pending_messages_in_batch");
    let mut store = SqliteStore::open(&db_path).expect("open store");

    for text in ["first", "second", "third"] {
        store
            .create_inbox_message(InboxMessageCreateArgs {
                sender_thread_id: 1,
                receiver_thread_id: 2,
                message: text.to_string(),
            })
            .expect("send message");
    }
    store
        .create_inbox_message(InboxMessageCreateArgs {
            sender_thread_id: 1,
            receiver_thread_id: 9,
            message: "other receiver".to_string(),
        })
        .expect("send unrelated message");

    let pending = store
        .list_pending_inbox_messages(2)
        .expect("pending before deliver");
    assert_eq!(pending.len(), 3);

    let delivered = store
        .deliver_pending_inbox_messages(2)
        .expect("batch deliver");
    assert_eq!(delivered.len(), 3);
    assert!(delivered.iter().all(|message| message.status == "delivered"));
    assert_eq!(
        delivered.iter().map(|m| m.message.as_str()).collect::<Vec<_>>(),
        vec!["first", "second", "third"],
        "delivery preserves send order"
    );

    let pending_after = store
        .list_pending_inbox_messages(2)
        .expect("pending after deliver");
    assert!(pending_after.is_empty());

    let unrelated = store
        .list_pending_inbox_messages(9)
        .expect("unrelated receiver untouched");
    assert_eq!(unrelated.len(), 1);

    let redelivered = store
        .deliver_pending_inbox_messages(2)
        .expect("second batch deliver");
    assert!(redelivered.is_empty(), "delivery is idempotent");
}

#[test]
fn resume_candidates_require_an_active_ref_and_stale_heartbeat() {
    let db_path = temp_db("resume_candidates_require_an_active_ref_and_stale_heartbeat");
    let mut store = SqliteStore::open(&db_path).expect("open store");
    let repo = "/tmp/repo-d";

    let suspended = open_session(&mut store, repo);
    let requester = open_session(&mut store, repo);

    // Promote the suspended session into an attachable state with work.
    store.heartbeat_session(suspended).expect("heartbeat");
    store
        .upsert_current_ref(CurrentRefUpsertArgs {
            session_id: suspended,
            node_type: "case".to_string(),
            node_id: 7,
            mode: "compact".to_string(),
            status: "active".to_string(),
            summary: "suspended work".to_string(),
            ..CurrentRefUpsertArgs::default()
        })
        .expect("suspended ref");

    // A heartbeat newer than the cutoff hides the candidate.
    let fresh = store
        .list_resume_candidates(repo, requester, 60)
        .expect("fresh candidates");
    assert!(fresh.is_empty(), "recent heartbeat must hide the session");

    // A sub-second timeout turns the just-written heartbeat stale.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let stale = store
        .list_resume_candidates(repo, requester, 1)
        .expect("stale candidates");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].session.id, suspended);
    assert_eq!(
        stale[0].current_ref.as_ref().expect("ref carried").node_id,
        7
    );
}
