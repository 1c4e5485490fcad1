#![forbid(unsafe_code)]
//! Thread/pane lifecycle: spawn, directive, interrupt, stop, and the
//! three-tier status detection over pipe-pane logs and pane capture.

use super::{marshal_i64_slice, to_value, Service, STATE_DIR};
use crate::error::ServiceError;
use crate::provider::{Provider, Status};
use crate::service::inputs::*;
use orch_core::shell::shell_quote;
use orch_core::status::is_child_thread_recyclable;
use orch_storage::{
    ReviewJobCreateArgs, ReviewJobUpdateArgs, RuntimePrereqEvent, RuntimePrereqEventArgs, Session,
    SessionUpdateArgs, Thread, ThreadCreateArgs, ThreadFilter, ThreadUpdateArgs,
};
use serde_json::{json, Map, Value};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_ROOT_AGENT_GUIDE: &str =
    ".codex/agents/codex-collab-orchestrator/codex/root-orchestrator.md";
const DEFAULT_WORKER_GUIDE: &str = ".codex/agents/codex-collab-orchestrator/codex/main-worker.md";
const DEFAULT_MERGE_REVIEWER_GUIDE: &str =
    ".codex/agents/codex-collab-orchestrator/codex/merge-reviewer.md";
const DEFAULT_DOC_MIRROR_GUIDE: &str =
    ".codex/agents/codex-collab-orchestrator/codex/doc-mirror-manager.md";
const DEFAULT_PLAN_ARCHITECT_GUIDE: &str =
    ".codex/agents/codex-collab-orchestrator/codex/plan-architect.md";
const DEFAULT_CHILD_WINDOW_NAME: &str = "children";
const DEFAULT_CODEX_COMMAND: &str = "codex --no-alt-screen";
const DEFAULT_RUNNER_SCRIPT: &str = "scripts/agents_codex_runner.py";
const DEFAULT_PYTHON_COMMAND: &str = "python3";
const DEFAULT_MAX_CHILD_THREADS: i64 = 6;
const DEFAULT_CAPTURE_LINES: i64 = 200;
const LOG_TAIL_BYTES: u64 = 4096;
const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const READY_CHECK_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const READY_CHECK_MAX_BACKOFF: Duration = Duration::from_secs(5);
const INSTALL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

struct InstallResult {
    installed: bool,
    message: String,
    tmux_path: String,
    attempts: Vec<Value>,
}

impl Service {
    /// Probe (and optionally install) the terminal multiplexer, recording a
    /// runtime-prereq event. Event recording failure never aborts the probe.
    pub(crate) fn ensure_tmux(
        &mut self,
        input: RuntimeTmuxEnsureInput,
    ) -> Result<Value, ServiceError> {
        let auto_install = input.auto_install.unwrap_or(true);
        let session_id = input.session_id;

        if let Some(tmux_path) = lookup_binary("tmux") {
            self.set_session_runtime_state(session_id, "tmux_ready");
            let event = self.record_prereq_event(session_id, "ready", "tmux already available");
            return Ok(json!({
                "status": "ready",
                "tmux_path": tmux_path.to_string_lossy(),
                "event": event,
            }));
        }

        if !auto_install {
            self.set_session_runtime_state(session_id, "tmux_manual_required");
            let event = self.record_prereq_event(session_id, "manual_required", "auto install disabled");
            return Ok(json!({
                "status": "manual_required",
                "manual_instructions": manual_tmux_install_instructions(),
                "event": event,
            }));
        }

        let install = try_install_tmux();
        if install.installed {
            self.set_session_runtime_state(session_id, "tmux_ready");
            let event = self.record_prereq_event(session_id, "installed", &install.message);
            return Ok(json!({
                "status": "installed",
                "tmux_path": install.tmux_path,
                "attempts": install.attempts,
                "manual_instructions": manual_tmux_install_instructions(),
                "event": event,
            }));
        }

        self.set_session_runtime_state(session_id, "tmux_manual_required");
        let event = self.record_prereq_event(session_id, "manual_required", &install.message);
        Ok(json!({
            "status": "manual_required",
            "message": install.message,
            "attempts": install.attempts,
            "manual_instructions": manual_tmux_install_instructions(),
            "event": event,
        }))
    }

    fn set_session_runtime_state(&mut self, session_id: Option<i64>, state: &str) {
        if let Some(session_id) = session_id {
            let _ = self.store_mut().update_session(
                session_id,
                SessionUpdateArgs {
                    runtime_state: Some(state.to_string()),
                    ..SessionUpdateArgs::default()
                },
            );
        }
    }

    fn record_prereq_event(
        &mut self,
        session_id: Option<i64>,
        status: &str,
        detail: &str,
    ) -> Option<RuntimePrereqEvent> {
        match self.store_mut().record_runtime_prereq_event(RuntimePrereqEventArgs {
            session_id: session_id.filter(|id| *id > 0),
            requirement: "tmux".to_string(),
            status: status.to_string(),
            detail: detail.to_string(),
        }) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::warn!(error = %err, "failed to record runtime prereq event");
                None
            }
        }
    }

    pub(crate) fn list_child_threads(
        &mut self,
        input: ThreadChildListInput,
    ) -> Result<Value, ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }
        let threads = self.store().list_threads(ThreadFilter {
            session_id: input.session_id,
            parent_thread_id: input.parent_thread_id,
            status: input.status,
            role: input.role,
        })?;
        Ok(json!({ "threads": threads }))
    }

    pub(crate) fn spawn_child_thread(
        &mut self,
        input: ThreadChildSpawnInput,
    ) -> Result<Value, ServiceError> {
        let (thread, attach_info, tmux_result) = self.spawn_child_thread_internal(input)?;
        Ok(json!({
            "thread": thread,
            "attach_info": attach_info,
            "tmux": tmux_result,
        }))
    }

    pub(crate) fn directive_child_thread(
        &mut self,
        input: ThreadChildDirectiveInput,
    ) -> Result<Value, ServiceError> {
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }
        let directive = input.directive.trim().to_string();
        if directive.is_empty() {
            return Err(ServiceError::validation("directive is required"));
        }
        let mut mode = input.mode.trim().to_lowercase();
        if mode.is_empty() {
            mode = "interrupt_patch".to_string();
        }

        let thread = self.store().get_thread(input.thread_id)?;
        if thread.parent_thread_id.is_none() {
            return Err(ServiceError::validation(format!(
                "thread is not a child thread: {}",
                thread.id
            )));
        }
        let pane_id = bound_pane_id(&thread)?;

        match mode.as_str() {
            "queue" => {
                self.tmux().send_keys(&pane_id, &directive)?;
            }
            "restart" => {
                let _ = self.stop_child_thread(ThreadChildStopInput {
                    thread_id: thread.id,
                    terminate_pane: Some(true),
                });
                let (respawned, attach_info, tmux_result) =
                    self.spawn_child_thread_internal(ThreadChildSpawnInput {
                        session_id: thread.session_id,
                        parent_thread_id: thread.parent_thread_id,
                        worktree_id: thread.worktree_id,
                        role: thread.role.clone(),
                        title: thread.title.clone().unwrap_or_default(),
                        objective: thread.objective.clone().unwrap_or_default(),
                        agent_guide_path: thread.agent_guide_path.clone().unwrap_or_default(),
                        provider_type: thread.provider_type.clone().unwrap_or_default(),
                        initial_prompt: directive.clone(),
                        launch_agent: Some(true),
                        ..ThreadChildSpawnInput::default()
                    })?;
                return Ok(json!({
                    "result": "respawned_with_directive",
                    "mode": "restart",
                    "thread": respawned,
                    "attach_info": attach_info,
                    "tmux": tmux_result,
                }));
            }
            _ => {
                self.tmux().send_keys_raw(&pane_id, &["C-c"])?;
                self.tmux().send_keys(&pane_id, &directive)?;
                let _ = self.store_mut().update_thread(
                    thread.id,
                    ThreadUpdateArgs {
                        status: Some("running".to_string()),
                        ..ThreadUpdateArgs::default()
                    },
                );
                mode = "interrupt_patch".to_string();
            }
        }

        let updated = self.store().get_thread(thread.id)?;
        Ok(json!({
            "result": "directive_sent",
            "mode": mode,
            "thread": updated,
            "directive": directive,
        }))
    }

    pub(crate) fn interrupt_child_thread(
        &mut self,
        input: ThreadChildSignalInput,
    ) -> Result<Value, ServiceError> {
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }
        let thread = self.store().get_thread(input.thread_id)?;
        if thread.parent_thread_id.is_none() {
            return Err(ServiceError::validation(format!(
                "thread is not a child thread: {}",
                thread.id
            )));
        }
        let pane_id = bound_pane_id(&thread)?;

        self.tmux().send_keys_raw(&pane_id, &["C-c"])?;
        let updated = self.store_mut().update_thread(
            thread.id,
            ThreadUpdateArgs {
                status: Some("interrupted".to_string()),
                ..ThreadUpdateArgs::default()
            },
        )?;

        Ok(json!({
            "thread": updated,
            "result": "interrupt_sent",
        }))
    }

    pub(crate) fn stop_child_thread(
        &mut self,
        input: ThreadChildStopInput,
    ) -> Result<Value, ServiceError> {
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }
        let thread = self.store().get_thread(input.thread_id)?;
        if thread.parent_thread_id.is_none() {
            return Err(ServiceError::validation(format!(
                "thread is not a child thread: {}",
                thread.id
            )));
        }
        let pane_id = bound_pane_id(&thread)?;

        let exit_command = self
            .providers()
            .get(thread.id)
            .map(|provider| provider.exit_command())
            .unwrap_or("exit");
        let _ = self.tmux().stop_pipe_pane(&pane_id);
        let _ = self.tmux().send_keys_raw(&pane_id, &[exit_command, "C-m"]);
        self.providers().remove(thread.id);

        let mut update = ThreadUpdateArgs {
            status: Some("stopped".to_string()),
            ..ThreadUpdateArgs::default()
        };
        if input.terminate_pane.unwrap_or(false) {
            let _ = self.tmux().kill_pane(&pane_id);
            update.tmux_pane_id = Some(String::new());
            update.tmux_window_name = Some(String::new());
        }

        let updated = self.store_mut().update_thread(thread.id, update)?;
        Ok(json!({
            "thread": updated,
            "result": "stopped",
        }))
    }

    /// Three-tier status probe: pipe-pane log tail, then full pane capture,
    /// then pane existence.
    pub(crate) fn child_thread_status(
        &mut self,
        input: ThreadChildStatusInput,
    ) -> Result<Value, ServiceError> {
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }
        let thread = self.store().get_thread(input.thread_id)?;
        if thread.parent_thread_id.is_none() {
            return Err(ServiceError::validation(format!(
                "thread is not a child thread: {}",
                thread.id
            )));
        }

        let mut result = Map::new();
        result.insert("thread_id".to_string(), json!(thread.id));
        result.insert("db_status".to_string(), json!(thread.status));
        result.insert("pane_exists".to_string(), json!(false));

        let pane_id = thread
            .tmux_pane_id
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
        if pane_id.is_empty() {
            return Ok(Value::Object(result));
        }
        result.insert(
            "pane_exists".to_string(),
            json!(self.tmux().pane_exists(&pane_id)),
        );

        let provider = self.provider_for_thread(&thread);

        if let Some(provider) = &provider {
            let log_path = thread.log_file_path.as_deref().unwrap_or("").trim();
            if !log_path.is_empty() {
                if let Ok(tail) = read_file_tail(Path::new(log_path), LOG_TAIL_BYTES) {
                    if !tail.is_empty() {
                        let status = provider.status(&tail);
                        result.insert("provider_status".to_string(), json!(status.as_str()));
                        result.insert("detection_tier".to_string(), json!("fast"));
                        result.insert(
                            "last_response".to_string(),
                            json!(provider.extract_last_response(&tail)),
                        );
                        return Ok(Value::Object(result));
                    }
                }
            }
        }

        let capture_lines = input
            .capture_lines
            .filter(|lines| *lines > 0)
            .unwrap_or(DEFAULT_CAPTURE_LINES);
        let captured = match self.tmux().capture_history(&pane_id, capture_lines) {
            Ok(captured) => captured,
            Err(err) => {
                result.insert("capture_error".to_string(), json!(err.to_string()));
                return Ok(Value::Object(result));
            }
        };
        if let Some(provider) = provider {
            let status = provider.status(&captured);
            result.insert("provider_status".to_string(), json!(status.as_str()));
            result.insert("detection_tier".to_string(), json!("full"));
            result.insert(
                "last_response".to_string(),
                json!(provider.extract_last_response(&captured)),
            );
        }
        Ok(Value::Object(result))
    }

    pub(crate) fn wait_child_thread_status(
        &mut self,
        input: ThreadChildWaitStatusInput,
    ) -> Result<Value, ServiceError> {
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }
        let mut targets: Vec<Status> = input
            .target_statuses
            .iter()
            .filter_map(|value| Status::parse(value))
            .collect();
        if targets.is_empty() {
            targets = vec![Status::Idle, Status::Completed];
        }
        let timeout = if input.timeout_seconds > 0 {
            Duration::from_secs(input.timeout_seconds as u64)
        } else {
            READY_CHECK_TIMEOUT
        };

        match self.wait_until_status(input.thread_id, &targets, timeout) {
            Ok((status, last_response)) => Ok(json!({
                "thread_id": input.thread_id,
                "status": status.as_str(),
                "last_response": last_response,
                "result": "reached",
            })),
            Err(err) if is_wait_timeout(&err) => Ok(json!({
                "thread_id": input.thread_id,
                "result": "timeout",
                "timeout_seconds": timeout.as_secs(),
            })),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn thread_attach_info(
        &mut self,
        input: ThreadAttachInfoInput,
    ) -> Result<Value, ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }
        let session = self.store().get_session(input.session_id)?;

        let thread = match input.thread_id {
            Some(thread_id) => Some(self.store().get_thread(thread_id)?),
            None => match session.root_thread_id {
                Some(root_thread_id) => self.store().get_thread(root_thread_id).ok(),
                None => None,
            },
        };

        Ok(build_attach_info(&session, thread.as_ref()))
    }

    pub(crate) fn request_auto_merge_review(
        &mut self,
        input: MergeReviewRequestAutoInput,
    ) -> Result<Value, ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }
        if input.merge_request_id <= 0 {
            return Err(ServiceError::validation("merge_request_id is required"));
        }
        self.store().get_merge_request(input.merge_request_id)?;
        let main_lock = self
            .store_mut()
            .acquire_main_merge_lock(input.session_id, 0)?;

        let notes = super::normalize_raw_json(&input.agent_override);
        let review_job = self.store_mut().create_review_job(ReviewJobCreateArgs {
            merge_request_id: input.merge_request_id,
            session_id: input.session_id,
            state: "requested".to_string(),
            notes_json: notes,
            ..ReviewJobCreateArgs::default()
        })?;

        let mut role = input.reviewer_role.trim().to_string();
        if role.is_empty() {
            role = "merge-reviewer".to_string();
        }
        let mut agent_guide_path = input.agent_guide_path.trim().to_string();
        if agent_guide_path.is_empty() {
            agent_guide_path = DEFAULT_MERGE_REVIEWER_GUIDE.to_string();
        }

        let spawn_result = self.spawn_child_thread_internal(ThreadChildSpawnInput {
            session_id: input.session_id,
            role,
            title: format!("merge-review:{}", input.merge_request_id),
            objective: format!(
                "review merge request {} and report conflict risk",
                input.merge_request_id
            ),
            agent_guide_path,
            agent_override: input.agent_override.clone(),
            ensure_tmux: input.ensure_tmux,
            auto_install: input.auto_install,
            ..ThreadChildSpawnInput::default()
        });

        let (thread, attach_info, tmux_result) = match spawn_result {
            Ok(spawned) => spawned,
            Err(err) => {
                let _ = self.store_mut().update_review_job(
                    review_job.id,
                    ReviewJobUpdateArgs {
                        state: Some("failed".to_string()),
                        ..ReviewJobUpdateArgs::default()
                    },
                );
                let _ = self.store_mut().release_main_merge_lock(input.session_id);
                return Err(err);
            }
        };

        let review_job = self.store_mut().update_review_job(
            review_job.id,
            ReviewJobUpdateArgs {
                state: Some("running".to_string()),
                reviewer_thread_id: Some(thread.id),
                ..ReviewJobUpdateArgs::default()
            },
        )?;

        Ok(json!({
            "review_job": review_job,
            "thread": thread,
            "attach_info": attach_info,
            "tmux": tmux_result,
            "main_lock": main_lock,
            "merge_review": { "merge_request_id": input.merge_request_id },
        }))
    }

    pub(crate) fn merge_review_thread_status(
        &mut self,
        input: MergeReviewThreadStatusInput,
    ) -> Result<Value, ServiceError> {
        let review_job = match (input.review_job_id, input.merge_request_id) {
            (Some(review_job_id), _) if review_job_id > 0 => {
                Some(self.store().get_review_job(review_job_id)?)
            }
            (_, Some(merge_request_id)) if merge_request_id > 0 => {
                match self.store().latest_review_job_by_merge_request(merge_request_id)? {
                    Some(job) => Some(job),
                    None => {
                        return Ok(json!({
                            "review_job": null,
                            "thread": null,
                        }));
                    }
                }
            }
            _ => {
                return Err(ServiceError::validation(
                    "review_job_id or merge_request_id is required",
                ));
            }
        };

        let review_job = review_job.expect("review job resolved above");
        let mut response = Map::new();
        response.insert("review_job".to_string(), to_value(&review_job)?);
        if let Some(reviewer_thread_id) = review_job.reviewer_thread_id {
            if let Ok(thread) = self.store().get_thread(reviewer_thread_id) {
                response.insert("thread".to_string(), to_value(&thread)?);
                if let Ok(session) = self.store().get_session(thread.session_id) {
                    response.insert(
                        "attach_info".to_string(),
                        build_attach_info(&session, Some(&thread)),
                    );
                }
            }
        }
        Ok(Value::Object(response))
    }

    /// The spawn protocol of one child thread; see the module doc. Partial
    /// failure always ends with the thread in status `failed`.
    pub(crate) fn spawn_child_thread_internal(
        &mut self,
        input: ThreadChildSpawnInput,
    ) -> Result<(Thread, Value, Value), ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }

        let session = self.store().get_session(input.session_id)?;
        let (session, root_thread) = self.ensure_root_thread_record(session)?;

        let mut tmux_result = json!({ "status": "skipped" });
        let ensure_tmux = input.ensure_tmux.unwrap_or(true);
        if ensure_tmux {
            tmux_result = self.ensure_tmux(RuntimeTmuxEnsureInput {
                session_id: Some(session.id),
                auto_install: input.auto_install,
            })?;
        }

        let mut parent_thread_id = root_thread.id;
        if let Some(requested_parent) = input.parent_thread_id.filter(|id| *id > 0) {
            let parent_thread = self.store().get_thread(requested_parent)?;
            if parent_thread.session_id != input.session_id {
                return Err(ServiceError::Conflict(format!(
                    "parent thread belongs to another session: {}",
                    parent_thread.session_id
                )));
            }
            parent_thread_id = parent_thread.id;
        }

        let mut role = input.role.trim().to_string();
        if role.is_empty() {
            role = "worker".to_string();
        }
        let mut provider_type = input.provider_type.trim().to_string();
        if provider_type.is_empty() {
            provider_type = "codex".to_string();
        }

        let resolved_guide_path = self.agent_guide_path_for_role(&role, &input.agent_guide_path);
        let agent_override = super::normalize_raw_json(&input.agent_override);
        let mut task_spec_json = super::normalize_raw_json(&input.task_spec);
        if task_spec_json.is_empty() {
            task_spec_json = default_task_spec_json(
                &role,
                &input.title,
                &input.objective,
                &[("interaction_mode", json!("view_only"))],
            );
        }

        let created_thread = self.store_mut().create_thread(ThreadCreateArgs {
            session_id: input.session_id,
            parent_thread_id: Some(parent_thread_id),
            worktree_id: input.worktree_id,
            role: role.clone(),
            status: "planned".to_string(),
            title: input.title.clone(),
            objective: input.objective.clone(),
            agent_guide_path: resolved_guide_path.clone(),
            agent_override,
            task_spec_json,
            scope_task_ids_json: marshal_i64_slice(&input.scope_task_ids),
            scope_case_ids_json: marshal_i64_slice(&input.scope_case_ids),
            scope_node_ids_json: marshal_i64_slice(&input.scope_node_ids),
            provider_type: provider_type.clone(),
        })?;

        let attach_info = build_attach_info(&session, Some(&created_thread));
        if !is_tmux_ready(&tmux_result) {
            return Ok((created_thread, attach_info, tmux_result));
        }

        let mut workdir = self.resolve_thread_workdir(&session, input.worktree_id)?;
        if input.worktree_id.is_none() {
            if let Ok(parent_thread) = self.store().get_thread(parent_thread_id) {
                if let Some(parent_pane) = parent_thread.tmux_pane_id.as_deref() {
                    let parent_pane = parent_pane.trim();
                    if !parent_pane.is_empty() {
                        if let Ok(parent_workdir) = self.tmux().pane_working_directory(parent_pane)
                        {
                            if !parent_workdir.trim().is_empty() {
                                workdir = parent_workdir.trim().to_string();
                            }
                        }
                    }
                }
            }
        }

        let mut session = session;
        let mut child_session_name = input.tmux_session_name.trim().to_string();
        if child_session_name.is_empty() {
            child_session_name = session
                .tmux_session_name
                .clone()
                .unwrap_or_default()
                .trim()
                .to_string();
        }
        if child_session_name.is_empty() {
            let session_root_path = self.resolve_session_root_path(&session)?;
            child_session_name = if session_root_path.trim().is_empty() {
                self.viewer_session_name(&workdir)
            } else {
                self.viewer_session_name(&session_root_path)
            };
            if let Ok(updated) = self.store_mut().update_session(
                session.id,
                SessionUpdateArgs {
                    tmux_session_name: Some(child_session_name.clone()),
                    ..SessionUpdateArgs::default()
                },
            ) {
                session = updated;
            }
        }

        let child_window_name = normalize_window_name(&input.tmux_window_name);
        let max_concurrent_children = input
            .max_concurrent_children
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_MAX_CHILD_THREADS);

        self.ensure_tmux_session(&child_session_name, &workdir, &child_window_name)?;
        self.ensure_child_pane_capacity(
            input.session_id,
            parent_thread_id,
            &child_session_name,
            max_concurrent_children,
        )?;

        let split_target = format!("{child_session_name}:0");
        let pane_id = self
            .tmux()
            .split_window(&split_target, &workdir, &input.split_direction)?;

        // Register the provider before any keystroke reaches the pane.
        if let Err(err) = self.providers().create(created_thread.id, &provider_type) {
            let _ = self.tmux().kill_pane(&pane_id);
            let _ = self.store_mut().update_thread(
                created_thread.id,
                ThreadUpdateArgs {
                    status: Some("failed".to_string()),
                    ..ThreadUpdateArgs::default()
                },
            );
            return Err(ServiceError::External(format!(
                "failed to create provider {provider_type:?}: {err}"
            )));
        }

        let log_dir = self.repo_path().join(STATE_DIR).join("logs");
        let _ = std::fs::create_dir_all(&log_dir);
        let log_file_path = log_dir
            .join(format!("thread_{}.log", created_thread.id))
            .to_string_lossy()
            .to_string();
        if let Err(err) = self.tmux().start_pipe_pane(&pane_id, &log_file_path) {
            self.providers().remove(created_thread.id);
            let _ = self.tmux().kill_pane(&pane_id);
            let _ = self.store_mut().update_thread(
                created_thread.id,
                ThreadUpdateArgs {
                    status: Some("failed".to_string()),
                    ..ThreadUpdateArgs::default()
                },
            );
            return Err(ServiceError::External(format!(
                "failed to start pipe-pane: {err}"
            )));
        }

        let launch_agent = input.launch_agent.unwrap_or(true);
        let mut launch_command = input.launch_command.trim().to_string();
        if launch_command.is_empty() && launch_agent {
            let mut initial_prompt = input.initial_prompt.trim().to_string();
            if initial_prompt.is_empty() {
                initial_prompt =
                    self.default_child_prompt(input.session_id, root_thread.id, &created_thread);
            }
            launch_command = if !input.codex_command.trim().is_empty() {
                self.default_codex_launch_command(
                    &workdir,
                    &input.codex_command,
                    &resolved_guide_path,
                    &initial_prompt,
                )
            } else {
                self.default_runner_launch_command(
                    &workdir,
                    input.session_id,
                    &created_thread,
                    &role,
                    &initial_prompt,
                )
            };
        }

        // Pane and log bindings must hit the store before any keys are sent;
        // status polling reads them back out of the thread row.
        let updated_thread = match self.store_mut().update_thread(
            created_thread.id,
            ThreadUpdateArgs {
                status: Some("planned".to_string()),
                tmux_session_name: Some(child_session_name.clone()),
                tmux_window_name: Some(child_window_name.clone()),
                tmux_pane_id: Some(pane_id.clone()),
                launch_command: Some(launch_command.clone()),
                log_file_path: Some(log_file_path.clone()),
                provider_type: Some(provider_type.clone()),
            },
        ) {
            Ok(thread) => thread,
            Err(err) => {
                self.cleanup_failed_spawn(created_thread.id, &pane_id);
                return Err(err.into());
            }
        };

        if !launch_command.trim().is_empty() {
            if let Err(err) = self.tmux().send_keys(&pane_id, &launch_command) {
                self.cleanup_failed_spawn(created_thread.id, &pane_id);
                return Err(ServiceError::External(format!(
                    "send launch command: {err}"
                )));
            }
        }

        let mut ready_check_result = "skipped".to_string();
        if !launch_command.trim().is_empty() && !input.skip_ready_check.unwrap_or(false) {
            match self.wait_until_status(
                updated_thread.id,
                &[Status::Idle, Status::Completed],
                READY_CHECK_TIMEOUT,
            ) {
                Ok((achieved, _last_response)) => {
                    ready_check_result = achieved.as_str().to_string();
                }
                Err(err) if is_wait_timeout(&err) => {
                    ready_check_result = "timeout".to_string();
                }
                Err(err) => {
                    ready_check_result = "error".to_string();
                    if let Some(map) = tmux_result.as_object_mut() {
                        map.insert("ready_check_error".to_string(), json!(err.to_string()));
                    }
                }
            }
        }
        if let Some(map) = tmux_result.as_object_mut() {
            map.insert("ready_check".to_string(), json!(ready_check_result));
        }

        let thread_status = if launch_command.trim().is_empty() {
            "planned"
        } else {
            match ready_check_result.as_str() {
                "timeout" | "error" => "initializing",
                _ => "running",
            }
        };
        let updated_thread = match self.store_mut().update_thread(
            updated_thread.id,
            ThreadUpdateArgs {
                status: Some(thread_status.to_string()),
                ..ThreadUpdateArgs::default()
            },
        ) {
            Ok(thread) => thread,
            Err(err) => {
                self.cleanup_failed_spawn(created_thread.id, &pane_id);
                return Err(err.into());
            }
        };

        let attach_info = build_attach_info(&session, Some(&updated_thread));
        Ok((updated_thread, attach_info, tmux_result))
    }

    /// Best-effort teardown after a partial spawn; the thread never remains
    /// in `planned`.
    fn cleanup_failed_spawn(&mut self, thread_id: i64, pane_id: &str) {
        let _ = self.tmux().stop_pipe_pane(pane_id);
        self.providers().remove(thread_id);
        let _ = self.tmux().kill_pane(pane_id);
        if let Err(err) = self.store_mut().update_thread(
            thread_id,
            ThreadUpdateArgs {
                status: Some("failed".to_string()),
                ..ThreadUpdateArgs::default()
            },
        ) {
            tracing::warn!(thread_id, error = %err, "failed to mark thread failed during cleanup");
        }
    }

    pub(crate) fn ensure_root_thread_record(
        &mut self,
        session: Session,
    ) -> Result<(Session, Thread), ServiceError> {
        let mut root_thread: Option<Thread> = None;
        if let Some(root_thread_id) = session.root_thread_id {
            if let Ok(thread) = self.store().get_thread(root_thread_id) {
                root_thread = Some(thread);
            }
        }
        if root_thread.is_none() {
            root_thread = self.store().session_root_thread(session.id)?;
        }

        let root_thread = match root_thread {
            Some(thread) => thread,
            None => {
                let task_spec_json = default_task_spec_json(
                    "session-root",
                    "root-local orchestration",
                    "orchestrate from caller CLI",
                    &[("root_mode", json!("caller_cli"))],
                );
                self.store_mut().create_thread(ThreadCreateArgs {
                    session_id: session.id,
                    role: "session-root".to_string(),
                    status: "running".to_string(),
                    title: "root-local orchestration".to_string(),
                    objective: "manage planning and delegation from caller CLI".to_string(),
                    task_spec_json,
                    agent_guide_path: DEFAULT_ROOT_AGENT_GUIDE.to_string(),
                    ..ThreadCreateArgs::default()
                })?
            }
        };

        let session = self.store_mut().update_session(
            session.id,
            SessionUpdateArgs {
                root_thread_id: Some(root_thread.id),
                runtime_state: Some("root_local_active".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;
        Ok((session, root_thread))
    }

    /// Ensure the root thread exists and, when asked, launch the root agent
    /// into the viewer session's base pane.
    pub(crate) fn ensure_root_thread(
        &mut self,
        input: ThreadRootEnsureInput,
    ) -> Result<Value, ServiceError> {
        let (session, thread, tmux_result) = self.ensure_root_thread_internal(input)?;
        let attach_info = build_attach_info(&session, Some(&thread));
        Ok(json!({
            "session": session,
            "root_thread": thread,
            "tmux": tmux_result,
            "attach_info": attach_info,
        }))
    }

    pub(crate) fn ensure_root_thread_internal(
        &mut self,
        input: ThreadRootEnsureInput,
    ) -> Result<(Session, Thread, Value), ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }
        let session = self.store().get_session(input.session_id)?;
        let (mut session, mut root_thread) = self.ensure_root_thread_record(session)?;

        let mut tmux_result = json!({ "status": "skipped" });
        let launch = input.launch_agent.unwrap_or(false) || input.force_launch.unwrap_or(false);
        let ensure_tmux = input.ensure_tmux.unwrap_or(launch);
        if ensure_tmux {
            tmux_result = self.ensure_tmux(RuntimeTmuxEnsureInput {
                session_id: Some(session.id),
                auto_install: input.auto_install,
            })?;
        }
        if !launch || !is_tmux_ready(&tmux_result) {
            return Ok((session, root_thread, tmux_result));
        }

        let force_launch = input.force_launch.unwrap_or(false);
        let bound_pane = root_thread
            .tmux_pane_id
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
        if !force_launch && !bound_pane.is_empty() && self.tmux().pane_exists(&bound_pane) {
            return Ok((session, root_thread, tmux_result));
        }

        let workdir = self.resolve_session_root_path(&session)?;
        let mut session_name = input.tmux_session_name.trim().to_string();
        if session_name.is_empty() {
            session_name = session
                .tmux_session_name
                .clone()
                .unwrap_or_default()
                .trim()
                .to_string();
        }
        if session_name.is_empty() {
            session_name = self.viewer_session_name(&workdir);
            if let Ok(updated) = self.store_mut().update_session(
                session.id,
                SessionUpdateArgs {
                    tmux_session_name: Some(session_name.clone()),
                    ..SessionUpdateArgs::default()
                },
            ) {
                session = updated;
            }
        }
        let window_name = normalize_window_name(&input.tmux_window_name);
        let (base_pane, _created) =
            self.ensure_tmux_session(&session_name, &workdir, &window_name)?;

        let mut provider_type = input.provider_type.trim().to_string();
        if provider_type.is_empty() {
            provider_type = "codex".to_string();
        }
        if let Err(err) = self.providers().create(root_thread.id, &provider_type) {
            return Err(ServiceError::External(format!(
                "failed to create provider {provider_type:?}: {err}"
            )));
        }

        let log_dir = self.repo_path().join(STATE_DIR).join("logs");
        let _ = std::fs::create_dir_all(&log_dir);
        let log_file_path = log_dir
            .join(format!("thread_{}.log", root_thread.id))
            .to_string_lossy()
            .to_string();
        let _ = self.tmux().start_pipe_pane(&base_pane, &log_file_path);

        let guide_path = self.agent_guide_path_for_role("session-root", &input.agent_guide_path);
        let mut launch_command = input.launch_command.trim().to_string();
        if launch_command.is_empty() {
            let mut initial_prompt = input.initial_prompt.trim().to_string();
            if initial_prompt.is_empty() {
                initial_prompt = input.objective.trim().to_string();
            }
            let codex_command = if input.codex_command.trim().is_empty() {
                DEFAULT_CODEX_COMMAND
            } else {
                input.codex_command.trim()
            };
            launch_command = self.default_codex_launch_command(
                &workdir,
                codex_command,
                &guide_path,
                &initial_prompt,
            );
        }

        root_thread = self.store_mut().update_thread(
            root_thread.id,
            ThreadUpdateArgs {
                status: Some("initializing".to_string()),
                tmux_session_name: Some(session_name.clone()),
                tmux_window_name: Some(window_name.clone()),
                tmux_pane_id: Some(base_pane.clone()),
                launch_command: Some(launch_command.clone()),
                log_file_path: Some(log_file_path),
                provider_type: Some(provider_type),
            },
        )?;

        self.tmux().send_keys(&base_pane, &launch_command)?;

        let ready_check_result = match self.wait_until_status(
            root_thread.id,
            &[Status::Idle, Status::Completed],
            READY_CHECK_TIMEOUT,
        ) {
            Ok((achieved, _)) => achieved.as_str().to_string(),
            Err(err) if is_wait_timeout(&err) => "timeout".to_string(),
            Err(_) => "error".to_string(),
        };
        if let Some(map) = tmux_result.as_object_mut() {
            map.insert("ready_check".to_string(), json!(ready_check_result));
        }
        let status = match ready_check_result.as_str() {
            "timeout" | "error" => "initializing",
            _ => "running",
        };
        root_thread = self.store_mut().update_thread(
            root_thread.id,
            ThreadUpdateArgs {
                status: Some(status.to_string()),
                ..ThreadUpdateArgs::default()
            },
        )?;

        Ok((session, root_thread, tmux_result))
    }

    fn ensure_tmux_session(
        &self,
        session_name: &str,
        workdir: &str,
        window_name: &str,
    ) -> Result<(String, bool), ServiceError> {
        if session_name.trim().is_empty() {
            return Err(ServiceError::validation("tmux session name is required"));
        }
        let workdir = if workdir.trim().is_empty() {
            self.repo_path().to_string_lossy().to_string()
        } else {
            workdir.to_string()
        };

        let mut created = false;
        if !self.tmux().has_session(session_name) {
            self.tmux().new_session(session_name, window_name, &workdir)?;
            created = true;
        }

        let target_window = format!("{session_name}:0");
        if !window_name.trim().is_empty() {
            self.tmux().rename_window(&target_window, window_name)?;
        }

        let panes = self.tmux().list_panes(&target_window)?;
        let Some(first_pane) = panes.first().map(|pane| pane.trim().to_string()) else {
            return Err(ServiceError::External(format!(
                "tmux session has no panes: {session_name}"
            )));
        };
        if first_pane.is_empty() {
            return Err(ServiceError::External(format!(
                "tmux session has no panes: {session_name}"
            )));
        }
        Ok((first_pane, created))
    }

    /// Bounded concurrency: clear stale pane bindings, recycle terminal
    /// children, and fail only when the parent is still at capacity.
    fn ensure_child_pane_capacity(
        &mut self,
        session_id: i64,
        parent_thread_id: i64,
        child_session_name: &str,
        max_concurrent_children: i64,
    ) -> Result<(), ServiceError> {
        let children = self.store().list_threads(ThreadFilter {
            session_id,
            parent_thread_id: Some(parent_thread_id),
            ..ThreadFilter::default()
        })?;

        let mut occupied: i64 = 0;
        let mut recyclable: Vec<Thread> = Vec::new();
        for child in children {
            let pane_id = child
                .tmux_pane_id
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string();
            if pane_id.is_empty() {
                continue;
            }
            let bound_session = child.tmux_session_name.as_deref().unwrap_or("").trim();
            if bound_session != child_session_name {
                continue;
            }
            if !self.tmux().pane_exists(&pane_id) {
                let _ = self.store_mut().update_thread(
                    child.id,
                    ThreadUpdateArgs {
                        tmux_pane_id: Some(String::new()),
                        tmux_window_name: Some(String::new()),
                        ..ThreadUpdateArgs::default()
                    },
                );
                continue;
            }
            occupied += 1;
            if is_child_thread_recyclable(&child.status) {
                recyclable.push(child);
            }
        }

        if occupied < max_concurrent_children {
            return Ok(());
        }

        for candidate in recyclable {
            let pane_id = candidate
                .tmux_pane_id
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string();
            if pane_id.is_empty() {
                continue;
            }
            let _ = self.tmux().kill_pane(&pane_id);
            let _ = self.store_mut().update_thread(
                candidate.id,
                ThreadUpdateArgs {
                    status: Some("stopped".to_string()),
                    tmux_pane_id: Some(String::new()),
                    tmux_window_name: Some(String::new()),
                    ..ThreadUpdateArgs::default()
                },
            );
            occupied -= 1;
            if occupied < max_concurrent_children {
                return Ok(());
            }
        }

        Err(ServiceError::Conflict(format!(
            "child thread limit reached: session_id={session_id} max={max_concurrent_children}"
        )))
    }

    pub(crate) fn resolve_session_root_path(
        &self,
        session: &Session,
    ) -> Result<String, ServiceError> {
        if let Some(session_root_worktree_id) = session.session_root_worktree_id {
            let session_root = self.store().get_worktree(session_root_worktree_id)?;
            return Ok(session_root.path);
        }
        Ok(self.repo_path().to_string_lossy().to_string())
    }

    fn resolve_thread_workdir(
        &self,
        session: &Session,
        worktree_id: Option<i64>,
    ) -> Result<String, ServiceError> {
        if let Some(worktree_id) = worktree_id.filter(|id| *id > 0) {
            let worktree = self.store().get_worktree(worktree_id)?;
            return Ok(worktree.path);
        }
        self.resolve_session_root_path(session)
    }

    fn provider_for_thread(&self, thread: &Thread) -> Option<Arc<dyn Provider>> {
        if let Some(provider) = self.providers().get(thread.id) {
            return Some(provider);
        }
        let provider_type = thread.provider_type.as_deref().unwrap_or("").trim();
        if provider_type.is_empty() {
            return None;
        }
        self.providers().create(thread.id, provider_type).ok()
    }

    /// Poll thread status with exponential back-off until it enters the
    /// target set or the deadline passes.
    pub(crate) fn wait_until_status(
        &mut self,
        thread_id: i64,
        targets: &[Status],
        timeout: Duration,
    ) -> Result<(Status, String), ServiceError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = READY_CHECK_INITIAL_BACKOFF;

        loop {
            if Instant::now() >= deadline {
                return Err(wait_timeout_error(thread_id, timeout));
            }

            let thread = self.store().get_thread(thread_id)?;
            let pane_id = thread
                .tmux_pane_id
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string();
            if pane_id.is_empty() {
                return Err(ServiceError::External(format!(
                    "thread {thread_id} has no tmux pane"
                )));
            }

            if let Some(provider) = self.provider_for_thread(&thread) {
                let log_path = thread.log_file_path.as_deref().unwrap_or("").trim();
                if !log_path.is_empty() {
                    if let Ok(tail) = read_file_tail(Path::new(log_path), LOG_TAIL_BYTES) {
                        if !tail.is_empty() {
                            let fast_status = provider.status(&tail);
                            if targets.contains(&fast_status) {
                                return Ok((fast_status, provider.extract_last_response(&tail)));
                            }
                        }
                    }
                }

                if let Ok(captured) =
                    self.tmux().capture_history(&pane_id, DEFAULT_CAPTURE_LINES)
                {
                    if !captured.is_empty() {
                        let full_status = provider.status(&captured);
                        if targets.contains(&full_status) {
                            return Ok((full_status, provider.extract_last_response(&captured)));
                        }
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(wait_timeout_error(thread_id, timeout));
            }
            std::thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(READY_CHECK_MAX_BACKOFF);
        }
    }

    pub(crate) fn agent_guide_path_for_role(&self, role: &str, override_path: &str) -> String {
        let resolved = override_path.trim();
        if !resolved.is_empty() {
            return resolved.to_string();
        }
        match role.trim().to_lowercase().as_str() {
            "session-root" | "root" | "orchestrator" => DEFAULT_ROOT_AGENT_GUIDE.to_string(),
            "merge-reviewer" => DEFAULT_MERGE_REVIEWER_GUIDE.to_string(),
            "doc-mirror-manager" => DEFAULT_DOC_MIRROR_GUIDE.to_string(),
            "plan-architect" => DEFAULT_PLAN_ARCHITECT_GUIDE.to_string(),
            _ => DEFAULT_WORKER_GUIDE.to_string(),
        }
    }

    fn read_agent_template(&self, path: &str) -> String {
        let normalized = path.trim();
        if normalized.is_empty() {
            return String::new();
        }
        let full_path = if Path::new(normalized).is_absolute() {
            PathBuf::from(normalized)
        } else {
            self.repo_path().join(normalized)
        };
        std::fs::read_to_string(full_path)
            .map(|content| content.trim().to_string())
            .unwrap_or_default()
    }

    fn default_child_prompt(
        &self,
        session_id: i64,
        root_thread_id: i64,
        child_thread: &Thread,
    ) -> String {
        let mut objective = child_thread.objective.clone().unwrap_or_default();
        if objective.trim().is_empty() {
            objective = child_thread.title.clone().unwrap_or_default();
        }
        if objective.trim().is_empty() {
            objective = "execute the assigned case and report progress".to_string();
        }
        let mut role = child_thread.role.trim().to_string();
        if role.is_empty() {
            role = "worker".to_string();
        }
        let task_spec_json = child_thread.task_spec_json.clone().unwrap_or_default();
        let task_spec_json = if task_spec_json.trim().is_empty() {
            default_task_spec_json(
                &role,
                child_thread.title.as_deref().unwrap_or(""),
                &objective,
                &[],
            )
        } else {
            task_spec_json
        };

        let guide_path = self.agent_guide_path_for_role(
            &role,
            child_thread.agent_guide_path.as_deref().unwrap_or(""),
        );
        let mut template_text = self.read_agent_template(&guide_path);
        if template_text.is_empty() {
            template_text =
                "# Child Worker\n- Execute the assigned scope and report back.".to_string();
        }

        let context_payload = json!({
            "thread": {
                "role": role,
                "session_id": session_id,
                "root_thread_id": root_thread_id,
                "thread_id": child_thread.id,
                "title": child_thread.title.as_deref().unwrap_or("").trim(),
                "objective": objective,
            },
            "scope": {
                "task_ids": decode_i64_json(child_thread.scope_task_ids_json.as_deref()),
                "case_ids": decode_i64_json(child_thread.scope_case_ids_json.as_deref()),
                "node_ids": decode_i64_json(child_thread.scope_node_ids_json.as_deref()),
            },
            "task_spec": decode_json_for_prompt(&task_spec_json),
        });
        let pretty_payload = serde_json::to_string_pretty(&context_payload)
            .unwrap_or_else(|_| "{}".to_string());

        format!(
            "{template_text}\n\n# Runtime Assignment\n~~~json\n{pretty_payload}\n~~~\n\nExecution rules:\n1. Work only on this thread assignment and scope.\n2. Read/update orchestrator state only for your scoped IDs and your own progress.\n3. Report blockers and completion status back to the root thread.\n4. Pause for user/root follow-up instead of expanding scope autonomously."
        )
    }

    fn default_codex_launch_command(
        &self,
        workdir: &str,
        codex_command: &str,
        agent_guide_path: &str,
        initial_prompt: &str,
    ) -> String {
        let quoted_dir = shell_quote(workdir);
        let command = if codex_command.trim().is_empty() {
            DEFAULT_CODEX_COMMAND
        } else {
            codex_command.trim()
        };
        let prompt = initial_prompt.trim();
        let guide_path = agent_guide_path.trim();

        let mut base_command = format!("cd {quoted_dir}");
        if !guide_path.is_empty() {
            base_command = format!(
                "{base_command} && echo \"[orchestrator] agent guide: {}\"",
                shell_quote(guide_path)
            );
        }
        if prompt.is_empty() {
            return format!("{base_command} && {command}");
        }
        format!("{base_command} && {command} {}", shell_quote(prompt))
    }

    fn default_runner_launch_command(
        &self,
        workdir: &str,
        session_id: i64,
        child_thread: &Thread,
        role: &str,
        initial_prompt: &str,
    ) -> String {
        let script_path = self.repo_path().join(DEFAULT_RUNNER_SCRIPT);
        let mut base_command = format!(
            "{DEFAULT_PYTHON_COMMAND} {} --mode child --session-id {session_id} --thread-id {} --role {}",
            shell_quote(&script_path.to_string_lossy()),
            child_thread.id,
            shell_quote(role),
        );
        if !initial_prompt.trim().is_empty() {
            base_command = format!("{base_command} --initial-prompt {}", shell_quote(initial_prompt));
        }
        format!("cd {} && {base_command}", shell_quote(workdir))
    }
}

fn bound_pane_id(thread: &Thread) -> Result<String, ServiceError> {
    let pane_id = thread
        .tmux_pane_id
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();
    if pane_id.is_empty() {
        return Err(ServiceError::validation(format!(
            "thread has no tmux pane bound: {}",
            thread.id
        )));
    }
    Ok(pane_id)
}

pub(crate) fn build_attach_info(session: &Session, thread: Option<&Thread>) -> Value {
    let mut session_name = thread
        .and_then(|t| t.tmux_session_name.as_deref())
        .unwrap_or("")
        .trim()
        .to_string();
    if session_name.is_empty() {
        session_name = session
            .tmux_session_name
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
    }

    let pane_id = thread
        .and_then(|t| t.tmux_pane_id.as_deref())
        .unwrap_or("")
        .trim()
        .to_string();
    let read_only = thread.map(|t| t.parent_thread_id.is_some()).unwrap_or(false);

    let mut attach_command = String::new();
    let mut attach_readonly_command = String::new();
    let mut switch_command = String::new();
    if !session_name.is_empty() {
        attach_command = format!("tmux attach-session -t {session_name}");
        if read_only {
            attach_readonly_command = format!("tmux attach -r -t {session_name}");
            attach_command = attach_readonly_command.clone();
        }
        switch_command = format!("tmux switch-client -t {session_name}");
    }

    json!({
        "available": !session_name.is_empty(),
        "tmux_session": session_name,
        "tmux_pane_id": pane_id,
        "read_only": read_only,
        "attach_command": attach_command,
        "attach_readonly_command": attach_readonly_command,
        "switch_command": switch_command,
    })
}

fn normalize_window_name(window_name: &str) -> String {
    let trimmed = window_name.trim();
    if trimmed.is_empty() {
        return DEFAULT_CHILD_WINDOW_NAME.to_string();
    }
    trimmed.to_string()
}

fn is_tmux_ready(status: &Value) -> bool {
    let normalized = status
        .get("status")
        .and_then(|value| value.as_str())
        .unwrap_or("")
        .trim()
        .to_lowercase();
    normalized == "ready" || normalized == "installed"
}

fn wait_timeout_error(thread_id: i64, timeout: Duration) -> ServiceError {
    ServiceError::External(format!(
        "thread {thread_id} did not reach target status within {}s",
        timeout.as_secs()
    ))
}

fn is_wait_timeout(err: &ServiceError) -> bool {
    err.to_string()
        .contains("did not reach target status within")
}

pub(crate) fn default_task_spec_json(
    role: &str,
    title: &str,
    objective: &str,
    extra: &[(&str, Value)],
) -> String {
    let mut spec = Map::new();
    spec.insert("thread_role".to_string(), json!(role.trim()));
    if !title.trim().is_empty() {
        spec.insert("title".to_string(), json!(title.trim()));
    }
    if !objective.trim().is_empty() {
        spec.insert("objective".to_string(), json!(objective.trim()));
    }
    for (key, value) in extra {
        spec.insert((*key).to_string(), value.clone());
    }
    Value::Object(spec).to_string()
}

fn decode_json_for_prompt(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return json!({});
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn decode_i64_json(raw: Option<&str>) -> Vec<i64> {
    let trimmed = raw.unwrap_or("").trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    serde_json::from_str(trimmed).unwrap_or_default()
}

pub(crate) fn read_file_tail(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    if size > max_bytes {
        file.seek(SeekFrom::Start(size - max_bytes))?;
    }
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

fn lookup_binary(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn try_install_tmux() -> InstallResult {
    let mut result = InstallResult {
        installed: false,
        message: "no installer succeeded".to_string(),
        tmux_path: String::new(),
        attempts: Vec::new(),
    };

    let mut installers: Vec<Vec<String>> = vec![vec![
        "brew".to_string(),
        "install".to_string(),
        "tmux".to_string(),
    ]];
    let sudo_prefix = sudo_prefix();
    let with_sudo = |command: &[&str]| -> Vec<String> {
        let mut full: Vec<String> = sudo_prefix.clone();
        full.extend(command.iter().map(|part| part.to_string()));
        full
    };
    if lookup_binary("apt-get").is_some() {
        installers.push(with_sudo(&["apt-get", "update"]));
        installers.push(with_sudo(&["apt-get", "install", "-y", "tmux"]));
    }
    if lookup_binary("dnf").is_some() {
        installers.push(with_sudo(&["dnf", "install", "-y", "tmux"]));
    }
    if lookup_binary("yum").is_some() {
        installers.push(with_sudo(&["yum", "install", "-y", "tmux"]));
    }
    if lookup_binary("pacman").is_some() {
        installers.push(with_sudo(&["pacman", "-Sy", "--noconfirm", "tmux"]));
    }

    for install_command in installers {
        let Some(binary) = install_command.first() else {
            continue;
        };
        if lookup_binary(binary).is_none() {
            continue;
        }

        let outcome = run_with_timeout(&install_command, INSTALL_ATTEMPT_TIMEOUT);
        let mut attempt = Map::new();
        attempt.insert("command".to_string(), json!(install_command.join(" ")));
        attempt.insert("output".to_string(), json!(outcome.output.trim()));
        if let Some(error) = &outcome.error {
            attempt.insert("error".to_string(), json!(error));
        }
        result.attempts.push(Value::Object(attempt));

        if outcome.error.is_some() || !outcome.success {
            continue;
        }
        if let Some(tmux_path) = lookup_binary("tmux") {
            result.installed = true;
            result.tmux_path = tmux_path.to_string_lossy().to_string();
            result.message = "tmux installed successfully".to_string();
            return result;
        }
    }

    result.message = "automatic installation failed; manual installation required".to_string();
    result
}

struct CommandOutcome {
    success: bool,
    output: String,
    error: Option<String>,
}

fn run_with_timeout(command: &[String], timeout: Duration) -> CommandOutcome {
    let Some((program, args)) = command.split_first() else {
        return CommandOutcome {
            success: false,
            output: String::new(),
            error: Some("empty command".to_string()),
        };
    };

    let spawned = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            return CommandOutcome {
                success: false,
                output: String::new(),
                error: Some(err.to_string()),
            };
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return CommandOutcome {
                        success: false,
                        output: String::new(),
                        error: Some(format!("timed out after {}s", timeout.as_secs())),
                    };
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(err) => {
                return CommandOutcome {
                    success: false,
                    output: String::new(),
                    error: Some(err.to_string()),
                };
            }
        }
    }

    match child.wait_with_output() {
        Ok(output) => {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            CommandOutcome {
                success: output.status.success(),
                output: combined,
                error: None,
            }
        }
        Err(err) => CommandOutcome {
            success: false,
            output: String::new(),
            error: Some(err.to_string()),
        },
    }
}

fn sudo_prefix() -> Vec<String> {
    if !cfg!(target_os = "linux") {
        return Vec::new();
    }
    if lookup_binary("sudo").is_some() {
        return vec!["sudo".to_string(), "-n".to_string()];
    }
    Vec::new()
}

fn manual_tmux_install_instructions() -> Vec<&'static str> {
    if cfg!(target_os = "macos") {
        return vec!["brew install tmux"];
    }
    if cfg!(target_os = "linux") {
        return vec![
            "sudo apt-get update && sudo apt-get install -y tmux",
            "sudo dnf install -y tmux",
            "sudo yum install -y tmux",
            "sudo pacman -Sy --noconfirm tmux",
        ];
    }
    vec!["install tmux from your OS package manager"]
}
