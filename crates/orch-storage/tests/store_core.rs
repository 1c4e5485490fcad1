#![forbid(unsafe_code)]

use orch_storage::{
    CaseBeginArgs, CaseCompleteArgs, LockAcquireArgs, SqliteStore, StepCheckArgs, StoreError,
    TaskCreateArgs, TaskFilter,
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

fn create_case(store: &mut SqliteStore, title: &str, priority: i64) -> i64 {
    store
        .create_task(TaskCreateArgs {
            level: "case".to_string(),
            title: title.to_string(),
            priority,
            ..TaskCreateArgs::default()
        })
        .expect("create case task")
        .id
}

#[test]
fn migration_is_idempotent_across_reopens() {
    let db_path = temp_db("migration_is_idempotent_across_reopens");
    {
        let mut store = SqliteStore::open(&db_path).expect("first open");
        create_case(&mut store, "seed", 0);
    }
    let store = SqliteStore::open(&db_path).expect("second open");
    let tasks = store
        .list_tasks(TaskFilter::default())
        .expect("list after reopen");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "seed");
}

#[test]
fn every_mutation_bumps_the_database_version() {
    let db_path = temp_db("every_mutation_bumps_the_database_version");
    let mut store = SqliteStore::open(&db_path).expect("open store");

    let before = store.mirror_status().expect("status").db_version;
    let case_id = create_case(&mut store, "versioned", 0);
    let after_create = store.mirror_status().expect("status").db_version;
    assert!(after_create > before, "create must bump the version");

    store
        .begin_case(CaseBeginArgs {
            task_id: case_id,
            input_contract: "{}".to_string(),
            fixtures_json: "[]".to_string(),
            snapshot_json: "{\"event\":\"case.begin\"}".to_string(),
        })
        .expect("begin case");
    let after_begin = store.mirror_status().expect("status").db_version;
    assert!(after_begin > after_create);

    let status = store.mirror_status().expect("status");
    assert!(status.outdated, "db ahead of mirror must read as outdated");
    let refreshed = store
        .mark_mirror_refreshed("/tmp/mirror.md")
        .expect("mark refreshed");
    assert!(!refreshed.outdated);
    assert_eq!(refreshed.md_version, refreshed.db_version);
}

#[test]
fn lock_conflicts_follow_the_scope_rule() {
    let db_path = temp_db("lock_conflicts_follow_the_scope_rule");
    let mut store = SqliteStore::open(&db_path).expect("open store");

    let prefix_lock = store
        .acquire_lock(LockAcquireArgs {
            scope_type: "prefix".to_string(),
            scope_path: "src/api".to_string(),
            owner_session: "owner-a".to_string(),
            ttl_seconds: 300,
        })
        .expect("acquire prefix lock");

    let err = store
        .acquire_lock(LockAcquireArgs {
            scope_type: "file".to_string(),
            scope_path: "src/api/users.go".to_string(),
            owner_session: "owner-b".to_string(),
            ttl_seconds: 300,
        })
        .expect_err("contained file must conflict");
    match err {
        StoreError::LockConflict { lock_id, .. } => assert_eq!(lock_id, prefix_lock.id),
        other => panic!("expected LockConflict, got {other:?}"),
    }

    let unrelated = store
        .acquire_lock(LockAcquireArgs {
            scope_type: "file".to_string(),
            scope_path: "src/api2/users.go".to_string(),
            owner_session: "owner-b".to_string(),
            ttl_seconds: 300,
        })
        .expect("sibling path must not conflict");
    store.release_lock(unrelated.id).expect("release sibling");

    store.release_lock(prefix_lock.id).expect("release prefix");
    store
        .acquire_lock(LockAcquireArgs {
            scope_type: "file".to_string(),
            scope_path: "src/api/users.go".to_string(),
            owner_session: "owner-b".to_string(),
            ttl_seconds: 300,
        })
        .expect("retry after release must succeed");
}

#[test]
fn released_locks_drop_out_of_the_active_set() {
    let db_path = temp_db("released_locks_drop_out_of_the_active_set");
    let mut store = SqliteStore::open(&db_path).expect("open store");

    let lock = store
        .acquire_lock(LockAcquireArgs {
            scope_type: "prefix".to_string(),
            scope_path: "src".to_string(),
            owner_session: "owner-a".to_string(),
            ttl_seconds: 600,
        })
        .expect("acquire lock");
    let heartbeat = store.heartbeat_lock(lock.id, 600).expect("heartbeat");
    assert_eq!(heartbeat.state, "active");

    store.release_lock(lock.id).expect("release");
    let active = store.list_active_locks().expect("list active");
    assert!(active.is_empty(), "released lock must not list as active");

    let err = store
        .heartbeat_lock(lock.id, 600)
        .expect_err("heartbeat after release must fail");
    match err {
        StoreError::NotFound { entity, .. } => assert_eq!(entity, "active lock"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn resume_next_ranks_in_progress_before_blocked_before_todo() {
    let db_path = temp_db("resume_next_ranks_in_progress_before_blocked_before_todo");
    let mut store = SqliteStore::open(&db_path).expect("open store");

    let todo_id = create_case(&mut store, "todo case", 5);
    let in_progress_id = create_case(&mut store, "in-progress case", 0);
    store
        .begin_case(CaseBeginArgs {
            task_id: in_progress_id,
            input_contract: "{}".to_string(),
            fixtures_json: "[]".to_string(),
            snapshot_json: "{\"event\":\"case.begin\"}".to_string(),
        })
        .expect("begin case");

    let resume = store.resume_next_case().expect("resume next");
    let task = resume.task.expect("a case must be resumable");
    assert_eq!(
        task.id, in_progress_id,
        "in_progress must outrank a higher-priority todo"
    );
    assert!(
        resume.checkpoint.is_some(),
        "begin must leave a checkpoint behind"
    );

    store
        .complete_case(CaseCompleteArgs {
            task_id: in_progress_id,
            next_action: "review".to_string(),
            snapshot_json: "{\"event\":\"case.complete\"}".to_string(),
        })
        .expect("complete case");

    let resume = store.resume_next_case().expect("resume next after done");
    assert_eq!(resume.task.expect("todo remains").id, todo_id);
}

#[test]
fn step_checks_accumulate_monotone_order_numbers() {
    let db_path = temp_db("step_checks_accumulate_monotone_order_numbers");
    let mut store = SqliteStore::open(&db_path).expect("open store");
    let case_id = create_case(&mut store, "stepped case", 0);

    for (index, title) in ["S1", "S2", "S3"].iter().enumerate() {
        let step = store
            .add_step_check(StepCheckArgs {
                task_id: case_id,
                step_title: title.to_string(),
                evidence_json: "{\"result\":\"ok\"}".to_string(),
                snapshot_json: "{\"event\":\"step.check\"}".to_string(),
            })
            .expect("add step");
        assert_eq!(step.order_no, index as i64 + 1);
        assert_eq!(step.status, "done");
    }

    let steps = store.list_steps(case_id).expect("list steps");
    assert_eq!(steps.len(), 3);
    let checkpoints = store.list_checkpoints(case_id).expect("list checkpoints");
    assert_eq!(checkpoints.len(), 3, "one checkpoint per step check");
}
