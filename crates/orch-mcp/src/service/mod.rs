#![forbid(unsafe_code)]
//! Method routing and cross-component orchestration.

mod delegation;
mod inputs;
mod mirror;
mod planning;
mod runtime;
mod session;

pub use inputs::*;

use crate::error::ServiceError;
use crate::provider::ProviderRegistry;
use crate::tmux::TmuxClient;
use orch_core::decision::{decide_worktree, DecisionInput};
use orch_storage::{
    GraphEdgeCreateArgs, GraphNodeCreateArgs, GraphNodeFilter, InboxMessageCreateArgs,
    LockAcquireArgs, MergeRequestArgs, NodeChecklistUpsertArgs, NodeSnapshotCreateArgs,
    SqliteStore, TaskCreateArgs, TaskFilter,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".codex-orch";

pub struct Service {
    repo_path: PathBuf,
    store: SqliteStore,
    tmux: TmuxClient,
    providers: ProviderRegistry,
}

impl Service {
    pub fn new(repo_path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let repo_path = std::fs::canonicalize(repo_path.as_ref())
            .map_err(|err| ServiceError::Internal(format!("failed to resolve repo path: {err}")))?;
        let db_path = repo_path.join(STATE_DIR).join("state.db");
        let store = SqliteStore::open(&db_path)?;
        Ok(Self {
            repo_path,
            store,
            tmux: TmuxClient::new(),
            providers: ProviderRegistry::new(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub(crate) fn tmux(&self) -> &TmuxClient {
        &self.tmux
    }

    pub(crate) fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Route one decoded call to its owning component.
    pub fn handle(&mut self, method: &str, params: Value) -> Result<Value, ServiceError> {
        match method {
            "workspace.init" => Ok(json!({
                "repo_path": self.repo_path.to_string_lossy(),
                "db_path": self.store.db_path().to_string_lossy(),
            })),
            "session.open" => {
                let input: SessionOpenInput = decode(params)?;
                self.open_session(input)
            }
            "session.heartbeat" => {
                let input: SessionIdInput = decode(params)?;
                to_value(self.store.heartbeat_session(input.session_id)?)
            }
            "session.close" => {
                let input: SessionIdInput = decode(params)?;
                to_value(self.store.close_session(input.session_id)?)
            }
            "session.cleanup" => {
                let input: SessionCleanupInput = decode(params)?;
                self.cleanup_sessions(input)
            }
            "session.list" => to_value(self.store.list_active_sessions()?),
            "session.context" => {
                let input: SessionIdInput = decode(params)?;
                to_value(self.store.build_session_context(input.session_id)?)
            }
            "runtime.tmux.ensure" => {
                let input: RuntimeTmuxEnsureInput = decode(params)?;
                self.ensure_tmux(input)
            }
            "runtime.bundle.info" => self.runtime_bundle_info(),
            "orchestration.delegate" => {
                let input: OrchestrationDelegateInput = decode(params)?;
                self.delegate_orchestration(input)
            }
            "task.create" => {
                let input: TaskCreateInput = decode(params)?;
                to_value(self.store.create_task(TaskCreateArgs {
                    level: input.level,
                    title: input.title,
                    parent_id: input.parent_id,
                    priority: input.priority,
                    assignee_session: input.assignee_session,
                })?)
            }
            "task.list" => {
                let input: TaskListInput = decode(params)?;
                to_value(self.store.list_tasks(TaskFilter {
                    level: input.level,
                    status: input.status,
                    parent_id: input.parent_id,
                })?)
            }
            "task.get" => {
                let input: TaskGetInput = decode(params)?;
                to_value(self.store.get_task(input.task_id)?)
            }
            "graph.node.create" => {
                let input: GraphNodeCreateInput = decode(params)?;
                to_value(self.store.create_graph_node(GraphNodeCreateArgs {
                    node_type: input.node_type,
                    facet: input.facet,
                    title: input.title,
                    status: input.status,
                    priority: input.priority,
                    parent_id: input.parent_id,
                    worktree_id: input.worktree_id,
                    owner_session_id: input.owner_session_id,
                    summary: input.summary,
                    risk_level: input.risk_level,
                    token_estimate: input.token_estimate,
                    affected_files_json: marshal_string_slice(&input.affected_files),
                    approval_state: input.approval_state,
                })?)
            }
            "graph.node.list" => {
                let input: GraphNodeListInput = decode(params)?;
                to_value(self.store.list_graph_nodes(GraphNodeFilter {
                    node_type: input.node_type,
                    facet: input.facet,
                    status: input.status,
                    parent_id: input.parent_id,
                })?)
            }
            "graph.edge.create" => {
                let input: GraphEdgeCreateInput = decode(params)?;
                to_value(self.store.create_graph_edge(GraphEdgeCreateArgs {
                    from_node_id: input.from_node_id,
                    to_node_id: input.to_node_id,
                    edge_type: input.edge_type,
                })?)
            }
            "graph.checklist.upsert" => {
                let input: GraphChecklistUpsertInput = decode(params)?;
                to_value(self.store.upsert_node_checklist_item(NodeChecklistUpsertArgs {
                    node_id: input.node_id,
                    item_text: input.item_text,
                    status: input.status,
                    order_no: input.order_no,
                    facet: input.facet,
                })?)
            }
            "graph.snapshot.create" => {
                let input: GraphSnapshotCreateInput = decode(params)?;
                to_value(self.store.create_node_snapshot(NodeSnapshotCreateArgs {
                    node_id: input.node_id,
                    snapshot_type: input.snapshot_type,
                    summary: input.summary,
                    affected_files_json: marshal_string_slice(&input.affected_files),
                    next_action: input.next_action,
                })?)
            }
            "plan.bootstrap" => {
                let input: PlanBootstrapInput = decode(params)?;
                self.plan_bootstrap(input)
            }
            "plan.slice.generate" => {
                let input: PlanSliceGenerateInput = decode(params)?;
                self.plan_slice_generate(input)
            }
            "plan.slice.replan" => {
                let input: PlanSliceReplanInput = decode(params)?;
                self.plan_slice_replan(input)
            }
            "plan.rollup.preview" => {
                let input: PlanRollupPreviewInput = decode(params)?;
                to_value(self.store.rollup_preview(input.parent_node_id)?)
            }
            "plan.rollup.submit" => {
                let input: PlanRollupSubmitInput = decode(params)?;
                self.plan_rollup_submit(input)
            }
            "plan.rollup.approve" => {
                let input: PlanRollupDecisionInput = decode(params)?;
                to_value(
                    self.store
                        .update_graph_node_approval(input.node_id, "approved", "done")?,
                )
            }
            "plan.rollup.reject" => {
                let input: PlanRollupDecisionInput = decode(params)?;
                to_value(
                    self.store
                        .update_graph_node_approval(input.node_id, "rejected", "blocked")?,
                )
            }
            "scheduler.decide_worktree" => {
                let input: WorktreeDecisionInput = decode(params)?;
                let result = decide_worktree(DecisionInput {
                    changed_files: input.changed_files,
                    estimate_minutes: input.estimate_minutes,
                    risk: input.risk,
                    parallel_workers: input.parallel_workers,
                    conflicting_paths: input.conflicting_paths,
                });
                Ok(json!({
                    "mode": result.mode,
                    "score": result.score,
                    "reasons": result.reasons,
                }))
            }
            "worktree.create" => {
                let input: WorktreeCreateInput = decode(params)?;
                self.create_worktree(input)
            }
            "worktree.list" => to_value(self.store.list_worktrees()?),
            "worktree.spawn" => {
                let input: WorktreeSpawnInput = decode(params)?;
                self.spawn_worktree(input)
            }
            "worktree.merge_to_parent" => {
                let input: WorktreeMergeToParentInput = decode(params)?;
                self.merge_worktree_to_parent(input)
            }
            "thread.root.ensure" => {
                let input: ThreadRootEnsureInput = decode(params)?;
                self.ensure_root_thread(input)
            }
            "thread.root.handoff_ack" => {
                let input: ThreadRootHandoffAckInput = decode(params)?;
                self.ack_root_handoff(input)
            }
            "thread.child.spawn" => {
                let input: ThreadChildSpawnInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "thread.child.spawn")?;
                self.spawn_child_thread(input)
            }
            "thread.child.directive" => {
                let input: ThreadChildDirectiveInput = decode(params)?;
                self.directive_child_thread(input)
            }
            "thread.child.list" => {
                let input: ThreadChildListInput = decode(params)?;
                self.list_child_threads(input)
            }
            "thread.child.interrupt" => {
                let input: ThreadChildSignalInput = decode(params)?;
                self.interrupt_child_thread(input)
            }
            "thread.child.stop" => {
                let input: ThreadChildStopInput = decode(params)?;
                self.stop_child_thread(input)
            }
            "thread.child.status" => {
                let input: ThreadChildStatusInput = decode(params)?;
                self.child_thread_status(input)
            }
            "thread.child.wait_status" => {
                let input: ThreadChildWaitStatusInput = decode(params)?;
                self.wait_child_thread_status(input)
            }
            "thread.attach_info" => {
                let input: ThreadAttachInfoInput = decode(params)?;
                self.thread_attach_info(input)
            }
            "lock.acquire" => {
                let input: LockAcquireInput = decode(params)?;
                to_value(self.store.acquire_lock(LockAcquireArgs {
                    scope_type: input.scope_type,
                    scope_path: input.scope_path,
                    owner_session: input.owner_session,
                    ttl_seconds: input.ttl_seconds,
                })?)
            }
            "lock.heartbeat" => {
                let input: LockHeartbeatInput = decode(params)?;
                to_value(self.store.heartbeat_lock(input.lock_id, input.ttl_seconds)?)
            }
            "lock.release" => {
                let input: LockReleaseInput = decode(params)?;
                to_value(self.store.release_lock(input.lock_id)?)
            }
            "case.begin" => {
                let input: CaseBeginInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "case.begin")?;
                self.begin_case(input)
            }
            "step.check" => {
                let input: StepCheckInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "step.check")?;
                self.check_step(input)
            }
            "case.complete" => {
                let input: CaseCompleteInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "case.complete")?;
                self.complete_case(input)
            }
            "resume.next" => to_value(self.store.resume_next_case()?),
            "resume.candidates.list" => {
                let input: ResumeCandidatesListInput = decode(params)?;
                let repo_path = self.repo_path.to_string_lossy().to_string();
                to_value(self.store.list_resume_candidates(
                    &repo_path,
                    input.requester_session_id,
                    input.heartbeat_timeout_seconds,
                )?)
            }
            "resume.candidates.attach" => {
                let input: ResumeCandidatesAttachInput = decode(params)?;
                to_value(
                    self.store
                        .attach_resume_candidate(input.requester_session_id, input.target_session_id)?,
                )
            }
            "work.current_ref" => {
                let input: WorkCurrentRefInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "work.current_ref")?;
                self.current_ref(input)
            }
            "work.current_ref.ack" => {
                let input: WorkCurrentRefAckInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "work.current_ref.ack")?;
                to_value(self.store.ack_current_ref(input.session_id, input.ref_id)?)
            }
            "merge.request" => {
                let input: MergeRequestInput = decode(params)?;
                to_value(self.store.create_merge_request(MergeRequestArgs {
                    feature_task_id: input.feature_task_id,
                    reviewer_session: input.reviewer_session,
                    notes_json: normalize_raw_json(&input.notes_json),
                })?)
            }
            "merge.review_context" => {
                let input: MergeReviewContextInput = decode(params)?;
                self.merge_review_context(input.merge_request_id)
            }
            "merge.review.request_auto" => {
                let input: MergeReviewRequestAutoInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "merge.review.request_auto")?;
                self.request_auto_merge_review(input)
            }
            "merge.review.thread_status" => {
                let input: MergeReviewThreadStatusInput = decode(params)?;
                self.merge_review_thread_status(input)
            }
            "merge.main.request" => {
                let input: MergeMainRequestInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "merge.main.request")?;
                self.request_main_merge(input)
            }
            "merge.main.next" => to_value(self.store.next_main_merge_request()?),
            "merge.main.status" => {
                let input: MergeMainStatusInput = decode(params)?;
                to_value(self.store.get_main_merge_request(input.request_id)?)
            }
            "merge.main.acquire_lock" => {
                let input: MergeMainAcquireLockInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "merge.main.acquire_lock")?;
                to_value(
                    self.store
                        .acquire_main_merge_lock(input.session_id, input.ttl_seconds)?,
                )
            }
            "merge.main.release_lock" => {
                let input: MergeMainReleaseLockInput = decode(params)?;
                self.require_delegation_ack(input.session_id, "merge.main.release_lock")?;
                to_value(self.store.release_main_merge_lock(input.session_id)?)
            }
            "inbox.send" => {
                let input: InboxSendInput = decode(params)?;
                to_value(self.store.create_inbox_message(InboxMessageCreateArgs {
                    sender_thread_id: input.sender_thread_id,
                    receiver_thread_id: input.receiver_thread_id,
                    message: input.message,
                })?)
            }
            "inbox.pending" => {
                let input: InboxPendingInput = decode(params)?;
                to_value(
                    self.store
                        .list_pending_inbox_messages(input.receiver_thread_id)?,
                )
            }
            "inbox.list" => {
                let input: InboxListInput = decode(params)?;
                to_value(self.store.list_inbox_messages(input.thread_id)?)
            }
            "inbox.deliver" => {
                let input: InboxDeliverInput = decode(params)?;
                match input.message_id {
                    Some(message_id) => {
                        to_value(self.store.mark_inbox_message_delivered(message_id)?)
                    }
                    None => {
                        if input.receiver_thread_id <= 0 {
                            return Err(ServiceError::validation(
                                "receiver_thread_id or message_id is required",
                            ));
                        }
                        let delivered = self
                            .store
                            .deliver_pending_inbox_messages(input.receiver_thread_id)?;
                        let count = delivered.len();
                        Ok(json!({
                            "delivered": delivered,
                            "count": count,
                        }))
                    }
                }
            }
            "mirror.status" => to_value(self.store.mirror_status()?),
            "mirror.refresh" => {
                let input: MirrorRefreshInput = decode(params)?;
                self.refresh_mirror(input)
            }
            other => Err(ServiceError::NotFound(format!(
                "unsupported method: {other}"
            ))),
        }
    }
}

/// Decode params into a typed input record; empty params decode as `{}`.
pub(crate) fn decode<T: DeserializeOwned + Default>(params: Value) -> Result<T, ServiceError> {
    let params = match params {
        Value::Null => json!({}),
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|err| ServiceError::Validation(format!("invalid params: {err}")))
}

pub(crate) fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ServiceError> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn marshal_string_slice(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn marshal_i64_slice(values: &[i64]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Raw JSON passthrough: null and empty values normalise to the empty
/// string, everything else to its compact encoding.
pub(crate) fn normalize_raw_json(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) if text.trim().is_empty() => String::new(),
        other => other.to_string(),
    }
}
