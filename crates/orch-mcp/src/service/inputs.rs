#![forbid(unsafe_code)]
//! Per-method input records. Every field is defaulted so an empty params
//! object decodes cleanly.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionOpenInput {
    pub agent_role: String,
    pub owner: String,
    pub terminal_fingerprint: String,
    pub intent: String,
    pub heartbeat_timeout_seconds: i64,
    pub always_branch: Option<bool>,
    pub worktree_name: String,
    pub user_request: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionIdInput {
    pub session_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionCleanupInput {
    pub timeout_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskCreateInput {
    pub level: String,
    pub title: String,
    pub parent_id: Option<i64>,
    pub priority: i64,
    pub assignee_session: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskListInput {
    pub level: String,
    pub status: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaskGetInput {
    pub task_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorktreeDecisionInput {
    pub changed_files: i64,
    pub estimate_minutes: i64,
    pub risk: i64,
    pub parallel_workers: i64,
    pub conflicting_paths: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorktreeCreateInput {
    pub task_id: i64,
    pub branch: String,
    pub path: String,
    pub base_ref: String,
    pub create_on_disk: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorktreeSpawnInput {
    pub session_id: i64,
    pub parent_worktree_id: i64,
    pub task_id: Option<i64>,
    pub reason: String,
    pub slug: String,
    pub branch: String,
    pub path: String,
    pub base_ref: String,
    pub create_on_disk: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorktreeMergeToParentInput {
    pub session_id: i64,
    pub worktree_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LockAcquireInput {
    pub scope_type: String,
    pub scope_path: String,
    pub owner_session: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LockHeartbeatInput {
    pub lock_id: i64,
    pub ttl_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LockReleaseInput {
    pub lock_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CaseBeginInput {
    pub case_id: i64,
    pub session_id: i64,
    pub input_contract: Value,
    pub fixtures: Vec<String>,
    pub required_files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StepCheckInput {
    pub case_id: i64,
    pub session_id: i64,
    pub step_title: String,
    pub result: String,
    pub artifacts: Vec<String>,
    pub required_files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CaseCompleteInput {
    pub case_id: i64,
    pub session_id: i64,
    pub summary: String,
    pub next_action: String,
    pub required_files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResumeCandidatesListInput {
    pub requester_session_id: i64,
    pub heartbeat_timeout_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResumeCandidatesAttachInput {
    pub requester_session_id: i64,
    pub target_session_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkCurrentRefInput {
    pub session_id: i64,
    pub mode: String,
    pub required_files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkCurrentRefAckInput {
    pub session_id: i64,
    pub ref_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeRequestInput {
    pub feature_task_id: i64,
    pub reviewer_session: String,
    pub notes_json: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeReviewContextInput {
    pub merge_request_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeMainRequestInput {
    pub session_id: i64,
    pub from_worktree_id: i64,
    pub target_branch: String,
    pub merge_request_id: Option<i64>,
    pub auto_review: Option<bool>,
    pub reviewer_role: String,
    pub agent_guide_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeMainStatusInput {
    pub request_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeMainAcquireLockInput {
    pub session_id: i64,
    pub ttl_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeMainReleaseLockInput {
    pub session_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MirrorRefreshInput {
    pub requester_role: String,
    pub target_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeTmuxEnsureInput {
    pub session_id: Option<i64>,
    pub auto_install: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrchestrationDelegateInput {
    pub session_id: i64,
    pub title: String,
    pub objective: String,
    pub user_request: String,
    pub agent_guide_path: String,
    pub initial_prompt: String,
    pub codex_command: String,
    pub ensure_tmux: Option<bool>,
    pub auto_install: Option<bool>,
    pub tmux_session_name: String,
    pub tmux_window_name: String,
    pub max_concurrent_children: Option<i64>,
    pub task_spec: Value,
    pub scope_task_ids: Vec<i64>,
    pub scope_case_ids: Vec<i64>,
    pub scope_node_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadRootEnsureInput {
    pub session_id: i64,
    pub role: String,
    pub title: String,
    pub objective: String,
    pub ensure_tmux: Option<bool>,
    pub auto_install: Option<bool>,
    pub agent_guide_path: String,
    pub tmux_session_name: String,
    pub tmux_window_name: String,
    pub initial_prompt: String,
    pub launch_command: String,
    pub codex_command: String,
    pub launch_agent: Option<bool>,
    pub force_launch: Option<bool>,
    pub provider_type: String,
    pub max_concurrent_children: Option<i64>,
    pub task_spec: Value,
    pub scope_task_ids: Vec<i64>,
    pub scope_case_ids: Vec<i64>,
    pub scope_node_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadRootHandoffAckInput {
    pub session_id: i64,
    pub thread_id: i64,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildSpawnInput {
    pub session_id: i64,
    pub parent_thread_id: Option<i64>,
    pub worktree_id: Option<i64>,
    pub role: String,
    pub title: String,
    pub objective: String,
    pub agent_guide_path: String,
    pub agent_override: Value,
    pub launch_command: String,
    pub split_direction: String,
    pub ensure_tmux: Option<bool>,
    pub auto_install: Option<bool>,
    pub tmux_session_name: String,
    pub tmux_window_name: String,
    pub initial_prompt: String,
    pub codex_command: String,
    pub launch_agent: Option<bool>,
    pub skip_ready_check: Option<bool>,
    pub provider_type: String,
    pub max_concurrent_children: Option<i64>,
    pub task_spec: Value,
    pub scope_task_ids: Vec<i64>,
    pub scope_case_ids: Vec<i64>,
    pub scope_node_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildListInput {
    pub session_id: i64,
    pub parent_thread_id: Option<i64>,
    pub status: String,
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildSignalInput {
    pub thread_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildStopInput {
    pub thread_id: i64,
    pub terminate_pane: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildDirectiveInput {
    pub thread_id: i64,
    pub directive: String,
    pub mode: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildStatusInput {
    pub thread_id: i64,
    pub capture_lines: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadChildWaitStatusInput {
    pub thread_id: i64,
    pub target_statuses: Vec<String>,
    pub timeout_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreadAttachInfoInput {
    pub session_id: i64,
    pub thread_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeReviewRequestAutoInput {
    pub session_id: i64,
    pub merge_request_id: i64,
    pub reviewer_role: String,
    pub agent_guide_path: String,
    pub agent_override: Value,
    pub ensure_tmux: Option<bool>,
    pub auto_install: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeReviewThreadStatusInput {
    pub review_job_id: Option<i64>,
    pub merge_request_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GraphNodeCreateInput {
    pub node_type: String,
    pub facet: String,
    pub title: String,
    pub status: String,
    pub priority: i64,
    pub parent_id: Option<i64>,
    pub worktree_id: Option<i64>,
    pub owner_session_id: Option<i64>,
    pub summary: String,
    pub risk_level: Option<i64>,
    pub token_estimate: Option<i64>,
    pub affected_files: Vec<String>,
    pub approval_state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GraphNodeListInput {
    pub node_type: String,
    pub facet: String,
    pub status: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GraphEdgeCreateInput {
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub edge_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GraphChecklistUpsertInput {
    pub node_id: i64,
    pub item_text: String,
    pub status: String,
    pub order_no: i64,
    pub facet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GraphSnapshotCreateInput {
    pub node_id: i64,
    pub snapshot_type: String,
    pub summary: String,
    pub affected_files: Vec<String>,
    pub next_action: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanBootstrapInput {
    pub initiative_title: String,
    pub plan_title: String,
    pub priority: i64,
    pub owner_session_id: Option<i64>,
    pub summary: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanSliceSpecInput {
    pub title: String,
    pub priority: i64,
    pub token_estimate: i64,
    pub affected_files: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanSliceGenerateInput {
    pub plan_node_id: i64,
    pub owner_session_id: Option<i64>,
    pub slice_specs: Vec<PlanSliceSpecInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanSliceReplanInput {
    pub node_id: i64,
    pub owner_session_id: Option<i64>,
    pub reason: String,
    pub affected_files: Vec<String>,
    pub next_action: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanRollupPreviewInput {
    pub parent_node_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanRollupSubmitInput {
    pub node_id: i64,
    pub summary: String,
    pub affected_files: Vec<String>,
    pub next_action: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanRollupDecisionInput {
    pub node_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboxSendInput {
    pub sender_thread_id: i64,
    pub receiver_thread_id: i64,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboxPendingInput {
    pub receiver_thread_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboxListInput {
    pub thread_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboxDeliverInput {
    pub receiver_thread_id: i64,
    pub message_id: Option<i64>,
}
