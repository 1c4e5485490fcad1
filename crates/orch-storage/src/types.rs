#![forbid(unsafe_code)]
//! Entity rows and per-operation argument records.
//!
//! Nullable columns are `Option<_>` at the edge. JSON columns are opaque
//! strings; the store neither parses nor validates them. Timestamps are
//! RFC 3339 strings to preserve nanosecond precision.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub id: i64,
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub title: String,
    pub status: String,
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Step {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub status: String,
    pub evidence: String,
    pub order_no: i64,
    pub recorded_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Checkpoint {
    pub id: i64,
    pub task_id: i64,
    pub step_title: String,
    pub snapshot: String,
    pub recorded_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Lock {
    pub id: i64,
    pub scope_type: String,
    pub scope_path: String,
    pub owner_session: String,
    pub lease_until: String,
    pub heartbeat_at: String,
    pub state: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Worktree {
    pub id: i64,
    pub task_id: i64,
    pub path: String,
    pub branch: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_worktree_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_state: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MergeRequest {
    pub id: i64,
    pub feature_task_id: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MirrorStatus {
    pub db_version: i64,
    pub md_version: i64,
    pub md_path: String,
    pub outdated: bool,
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ResumeState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub id: i64,
    pub agent_role: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_worktree_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_root_worktree_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_session_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_root_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_issued_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_acked_at: Option<String>,
    pub started_at: String,
    pub last_seen_at: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResumeCandidate {
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ref: Option<CurrentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_root_worktree: Option<Worktree>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionContext {
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_worktree: Option<Worktree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_root_worktree: Option<Worktree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ref: Option<CurrentRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CurrentRef {
    pub id: i64,
    pub session_id: i64,
    pub node_type: String,
    pub node_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<i64>,
    pub mode: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_files_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acked_at: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MainMergeQueueItem {
    pub id: i64,
    pub session_id: i64,
    pub from_worktree_id: i64,
    pub target_branch: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MainMergeLock {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_until: Option<String>,
    pub state: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Thread {
    pub id: i64,
    pub session_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<i64>,
    pub role: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_guide_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_spec_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_task_ids_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_case_ids_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_node_ids_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_session_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_window_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewJob {
    pub id: i64,
    pub merge_request_id: i64,
    pub session_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_thread_id: Option<i64>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RuntimePrereqEvent {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    pub requirement: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub node_type: String,
    pub facet: String,
    pub title: String,
    pub status: String,
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_estimate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_files_json: Option<String>,
    pub approval_state: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GraphEdge {
    pub id: i64,
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub edge_type: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeChecklistItem {
    pub id: i64,
    pub node_id: i64,
    pub item_text: String,
    pub status: String,
    pub order_no: i64,
    pub facet: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeSnapshot {
    pub id: i64,
    pub node_id: i64,
    pub snapshot_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_files_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlanningRule {
    pub max_token_per_slice: i64,
    pub max_files_per_slice: i64,
    pub replan_triggers_json: String,
    pub approval_policy: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct InboxMessage {
    pub id: i64,
    pub sender_thread_id: i64,
    pub receiver_thread_id: i64,
    pub message: String,
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RollupPreview {
    pub parent_node_id: i64,
    pub child_count: usize,
    pub status_counts: std::collections::BTreeMap<String, i64>,
    pub children: Vec<GraphNode>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskCreateArgs {
    pub level: String,
    pub title: String,
    pub parent_id: Option<i64>,
    pub priority: i64,
    pub assignee_session: String,
}

#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub level: String,
    pub status: String,
    pub parent_id: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct CaseBeginArgs {
    pub task_id: i64,
    pub input_contract: String,
    pub fixtures_json: String,
    pub snapshot_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct StepCheckArgs {
    pub task_id: i64,
    pub step_title: String,
    pub evidence_json: String,
    pub snapshot_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct CaseCompleteArgs {
    pub task_id: i64,
    pub next_action: String,
    pub snapshot_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct LockAcquireArgs {
    pub scope_type: String,
    pub scope_path: String,
    pub owner_session: String,
    pub ttl_seconds: i64,
}

#[derive(Clone, Debug, Default)]
pub struct WorktreeCreateArgs {
    pub task_id: i64,
    pub path: String,
    pub branch: String,
    pub status: String,
    pub kind: String,
    pub parent_worktree_id: Option<i64>,
    pub owner_session_id: Option<i64>,
    pub merge_state: String,
}

#[derive(Clone, Debug, Default)]
pub struct MergeRequestArgs {
    pub feature_task_id: i64,
    pub reviewer_session: String,
    pub notes_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct SessionOpenArgs {
    pub agent_role: String,
    pub owner: String,
    pub repo_path: String,
    pub terminal_fingerprint: String,
    pub intent: String,
}

#[derive(Clone, Debug, Default)]
pub struct SessionUpdateArgs {
    pub status: Option<String>,
    pub main_worktree_id: Option<i64>,
    pub session_root_worktree_id: Option<i64>,
    pub root_thread_id: Option<i64>,
    pub tmux_session_name: Option<String>,
    pub runtime_state: Option<String>,
    pub intent: Option<String>,
    pub delegation_state: Option<String>,
    pub delegation_root_thread_id: Option<i64>,
    pub delegation_issued_at: Option<String>,
    pub delegation_acked_at: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CurrentRefUpsertArgs {
    pub session_id: i64,
    pub node_type: String,
    pub node_id: i64,
    pub checkpoint_id: Option<i64>,
    pub mode: String,
    pub status: String,
    pub next_action: String,
    pub summary: String,
    pub required_files_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct MainMergeRequestArgs {
    pub session_id: i64,
    pub from_worktree_id: i64,
    pub target_branch: String,
}

#[derive(Clone, Debug, Default)]
pub struct ThreadCreateArgs {
    pub session_id: i64,
    pub parent_thread_id: Option<i64>,
    pub role: String,
    pub status: String,
    pub title: String,
    pub objective: String,
    pub worktree_id: Option<i64>,
    pub agent_guide_path: String,
    pub agent_override: String,
    pub task_spec_json: String,
    pub scope_task_ids_json: String,
    pub scope_case_ids_json: String,
    pub scope_node_ids_json: String,
    pub provider_type: String,
}

#[derive(Clone, Debug, Default)]
pub struct ThreadFilter {
    pub session_id: i64,
    pub parent_thread_id: Option<i64>,
    pub status: String,
    pub role: String,
}

#[derive(Clone, Debug, Default)]
pub struct ThreadUpdateArgs {
    pub status: Option<String>,
    pub tmux_session_name: Option<String>,
    pub tmux_window_name: Option<String>,
    pub tmux_pane_id: Option<String>,
    pub launch_command: Option<String>,
    pub log_file_path: Option<String>,
    pub provider_type: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ReviewJobCreateArgs {
    pub merge_request_id: i64,
    pub session_id: i64,
    pub reviewer_thread_id: Option<i64>,
    pub state: String,
    pub notes_json: String,
}

#[derive(Clone, Debug, Default)]
pub struct ReviewJobUpdateArgs {
    pub state: Option<String>,
    pub reviewer_thread_id: Option<i64>,
    pub notes_json: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct RuntimePrereqEventArgs {
    pub session_id: Option<i64>,
    pub requirement: String,
    pub status: String,
    pub detail: String,
}

#[derive(Clone, Debug, Default)]
pub struct GraphNodeCreateArgs {
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
    pub affected_files_json: String,
    pub approval_state: String,
}

#[derive(Clone, Debug, Default)]
pub struct GraphNodeFilter {
    pub node_type: String,
    pub facet: String,
    pub status: String,
    pub parent_id: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct GraphEdgeCreateArgs {
    pub from_node_id: i64,
    pub to_node_id: i64,
    pub edge_type: String,
}

#[derive(Clone, Debug, Default)]
pub struct NodeChecklistUpsertArgs {
    pub node_id: i64,
    pub item_text: String,
    pub status: String,
    pub order_no: i64,
    pub facet: String,
}

#[derive(Clone, Debug, Default)]
pub struct NodeSnapshotCreateArgs {
    pub node_id: i64,
    pub snapshot_type: String,
    pub summary: String,
    pub affected_files_json: String,
    pub next_action: String,
}

#[derive(Clone, Debug, Default)]
pub struct InboxMessageCreateArgs {
    pub sender_thread_id: i64,
    pub receiver_thread_id: i64,
    pub message: String,
}
