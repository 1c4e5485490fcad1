#![forbid(unsafe_code)]
//! Session bootstrap, worktree scheduling effects, and case execution flows.

use super::{marshal_string_slice, to_value, Service, STATE_DIR};
use crate::error::ServiceError;
use crate::service::inputs::*;
use orch_core::naming::{build_viewer_session_name, derive_worktree_slug, slug_with_suffix};
use orch_storage::{
    CaseBeginArgs, CaseCompleteArgs, CurrentRefUpsertArgs, SessionOpenArgs, SessionUpdateArgs,
    StepCheckArgs, Worktree, WorktreeCreateArgs,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;

const DEFAULT_MAIN_BRANCH: &str = "main";
const WORKTREE_ALLOC_ATTEMPTS: usize = 64;

impl Service {
    pub(crate) fn open_session(
        &mut self,
        input: SessionOpenInput,
    ) -> Result<Value, ServiceError> {
        let repo_path = self.repo_path().to_string_lossy().to_string();
        let session = self.store_mut().open_session(SessionOpenArgs {
            agent_role: input.agent_role,
            owner: input.owner,
            repo_path: repo_path.clone(),
            terminal_fingerprint: input.terminal_fingerprint,
            intent: input.intent.clone(),
        })?;

        let main_branch = self
            .current_git_branch()
            .unwrap_or_else(|_| DEFAULT_MAIN_BRANCH.to_string());
        let main_worktree = self
            .store_mut()
            .create_or_get_main_worktree(&repo_path, &main_branch)?;

        let mut intent = input.intent.trim().to_lowercase();
        if intent.is_empty() || intent == "auto" {
            intent = "new_work".to_string();
        }

        let session = self.store_mut().update_session(
            session.id,
            SessionUpdateArgs {
                main_worktree_id: Some(main_worktree.id),
                intent: Some(intent.clone()),
                status: Some("opened".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        if intent == "resume_work" {
            let session = self.store_mut().update_session(
                session.id,
                SessionUpdateArgs {
                    status: Some("awaiting_resume".to_string()),
                    ..SessionUpdateArgs::default()
                },
            )?;
            let candidates = self.store().list_resume_candidates(
                &repo_path,
                session.id,
                input.heartbeat_timeout_seconds,
            )?;
            return Ok(json!({
                "session": session,
                "main_worktree": main_worktree,
                "action_required": "select_resume_candidate",
                "resume_candidates": candidates,
            }));
        }

        let always_branch = input.always_branch.unwrap_or(true);
        if !always_branch {
            return Err(ServiceError::validation(
                "always_branch=false is not supported in root-local mode",
            ));
        }

        let preferred_slug = derive_worktree_slug(&input.worktree_name, &input.user_request);
        let (session_root, resolved_slug) =
            self.create_session_root_worktree(session.id, &main_worktree, &preferred_slug)?;
        let viewer_session_name = self.viewer_session_name(&session_root.path);

        let session = self.store_mut().update_session(
            session.id,
            SessionUpdateArgs {
                session_root_worktree_id: Some(session_root.id),
                status: Some("active_new".to_string()),
                tmux_session_name: Some(viewer_session_name.clone()),
                runtime_state: Some("root_local_ready".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        let context = self.store().build_session_context(session.id)?;
        Ok(json!({
            "session_context": context,
            "root_mode": "caller_cli",
            "worktree_slug": resolved_slug,
            "viewer_tmux_session": viewer_session_name,
            "child_attach_hint": format!("tmux attach -r -t {viewer_session_name}"),
        }))
    }

    /// Close sessions whose heartbeat went stale and reap owned multiplexer
    /// sessions that no live session references. Reaping is best-effort.
    pub(crate) fn cleanup_sessions(
        &mut self,
        input: SessionCleanupInput,
    ) -> Result<Value, ServiceError> {
        let timeout = if input.timeout_seconds <= 0 {
            orch_storage::DEFAULT_SESSION_CLEANUP_TIMEOUT_SECONDS
        } else {
            input.timeout_seconds
        };
        let repo_path = self.repo_path().to_string_lossy().to_string();
        let closed = self.store_mut().cleanup_stale_sessions(&repo_path, timeout)?;

        let mut killed_tmux_sessions: Vec<String> = Vec::new();
        if let Ok(owned) = self.tmux().list_owned_sessions() {
            let live: Vec<String> = self
                .store()
                .list_active_sessions()?
                .into_iter()
                .filter_map(|session| session.tmux_session_name)
                .collect();
            for session_name in owned {
                if live.iter().any(|name| name == &session_name) {
                    continue;
                }
                if self.tmux().kill_session(&session_name).is_ok() {
                    killed_tmux_sessions.push(session_name);
                }
            }
        }

        Ok(json!({
            "closed_sessions": closed,
            "timeout_seconds": timeout,
            "killed_tmux_sessions": killed_tmux_sessions,
        }))
    }

    pub(crate) fn create_worktree(
        &mut self,
        input: WorktreeCreateInput,
    ) -> Result<Value, ServiceError> {
        let mut worktree_path = input.path.trim().to_string();
        if worktree_path.is_empty() {
            let branch_slug = sanitize_for_path(&input.branch);
            worktree_path = self
                .worktrees_dir()
                .join(branch_slug)
                .to_string_lossy()
                .to_string();
        }

        if input.create_on_disk {
            if input.branch.trim().is_empty() {
                return Err(ServiceError::validation(
                    "branch is required when create_on_disk=true",
                ));
            }
            self.run_git_worktree_add(&worktree_path, input.branch.trim(), input.base_ref.trim())?;
        }

        let status = if input.create_on_disk { "active" } else { "planned" };
        to_value(self.store_mut().create_worktree_record(WorktreeCreateArgs {
            task_id: input.task_id,
            path: worktree_path,
            branch: input.branch,
            status: status.to_string(),
            ..WorktreeCreateArgs::default()
        })?)
    }

    /// Allocate a task-branch worktree under a session-owned parent, bumping
    /// the slug on collisions until a candidate materialises.
    pub(crate) fn spawn_worktree(
        &mut self,
        input: WorktreeSpawnInput,
    ) -> Result<Value, ServiceError> {
        let parent = self.store().get_worktree(input.parent_worktree_id)?;
        if let Some(owner_session_id) = parent.owner_session_id {
            if owner_session_id != input.session_id {
                return Err(ServiceError::Conflict(format!(
                    "parent worktree belongs to another session: {owner_session_id}"
                )));
            }
        }

        let mut base_ref = input.base_ref.trim().to_string();
        if base_ref.is_empty() {
            base_ref = parent.branch.clone();
        }
        let create_on_disk = input.create_on_disk.unwrap_or(true);

        let slug = derive_worktree_slug(&input.slug, &input.reason);
        let mut branch = input.branch.trim().to_string();
        let mut worktree_path = input.path.trim().to_string();
        if branch.is_empty() {
            branch = format!("task/{}/{}", input.session_id, slug);
        }
        if worktree_path.is_empty() {
            worktree_path = self
                .worktrees_dir()
                .join(&slug)
                .to_string_lossy()
                .to_string();
        }

        if create_on_disk {
            let branch_given = !input.branch.trim().is_empty();
            let path_given = !input.path.trim().is_empty();
            let mut resolved = false;
            for attempt in 0..WORKTREE_ALLOC_ATTEMPTS {
                let candidate_slug = slug_with_suffix(&slug, attempt);
                let candidate_branch = if branch_given {
                    branch.clone()
                } else {
                    format!("task/{}/{}", input.session_id, candidate_slug)
                };
                let candidate_path = if path_given {
                    worktree_path.clone()
                } else {
                    self.worktrees_dir()
                        .join(&candidate_slug)
                        .to_string_lossy()
                        .to_string()
                };
                if self.worktree_candidate_taken(&candidate_path, &candidate_branch) {
                    continue;
                }
                match self.run_git_worktree_add(&candidate_path, &candidate_branch, &base_ref) {
                    Ok(()) => {
                        branch = candidate_branch;
                        worktree_path = candidate_path;
                        resolved = true;
                    }
                    Err(err) => {
                        if is_likely_worktree_conflict(&err) && !branch_given && !path_given {
                            continue;
                        }
                        return Err(err);
                    }
                }
                break;
            }
            if !resolved {
                return Err(ServiceError::Conflict(format!(
                    "unable to allocate unique worktree for slug={slug}"
                )));
            }
        }

        let status = if create_on_disk { "active" } else { "planned" };
        to_value(self.store_mut().create_worktree_record(WorktreeCreateArgs {
            task_id: input.task_id.unwrap_or(0),
            path: worktree_path,
            branch,
            status: status.to_string(),
            kind: "task_branch".to_string(),
            parent_worktree_id: Some(input.parent_worktree_id),
            owner_session_id: Some(input.session_id),
            merge_state: "active".to_string(),
        })?)
    }

    pub(crate) fn create_session_root_worktree(
        &mut self,
        session_id: i64,
        main_worktree: &Worktree,
        preferred_slug: &str,
    ) -> Result<(Worktree, String), ServiceError> {
        let slug = derive_worktree_slug(preferred_slug, &format!("task-{session_id}"));
        for attempt in 0..WORKTREE_ALLOC_ATTEMPTS {
            let candidate_slug = slug_with_suffix(&slug, attempt);
            let candidate_branch = format!("task/{session_id}/{candidate_slug}");
            let candidate_path = self
                .worktrees_dir()
                .join(&candidate_slug)
                .to_string_lossy()
                .to_string();
            if self.worktree_candidate_taken(&candidate_path, &candidate_branch) {
                continue;
            }
            if let Err(err) =
                self.run_git_worktree_add(&candidate_path, &candidate_branch, &main_worktree.branch)
            {
                if is_likely_worktree_conflict(&err) {
                    continue;
                }
                return Err(err);
            }

            let record = self.store_mut().create_worktree_record(WorktreeCreateArgs {
                task_id: 0,
                path: candidate_path,
                branch: candidate_branch,
                status: "active".to_string(),
                kind: "session_root".to_string(),
                parent_worktree_id: Some(main_worktree.id),
                owner_session_id: Some(session_id),
                merge_state: "active".to_string(),
            })?;
            return Ok((record, candidate_slug));
        }

        Err(ServiceError::Conflict(format!(
            "unable to allocate unique session worktree for session={session_id}"
        )))
    }

    pub(crate) fn merge_worktree_to_parent(
        &mut self,
        input: WorktreeMergeToParentInput,
    ) -> Result<Value, ServiceError> {
        let child = self.store().get_worktree(input.worktree_id)?;
        let Some(parent_worktree_id) = child.parent_worktree_id else {
            return Err(ServiceError::validation(format!(
                "worktree has no parent: {}",
                child.id
            )));
        };
        if let Some(owner_session_id) = child.owner_session_id {
            if owner_session_id != input.session_id {
                return Err(ServiceError::Conflict(format!(
                    "worktree belongs to another session: {owner_session_id}"
                )));
            }
        }

        let parent = self.store().get_worktree(parent_worktree_id)?;
        self.run_git_merge(&parent.path, &child.branch)?;
        let updated_child = self.store_mut().mark_worktree_merged_to_parent(child.id)?;

        Ok(json!({
            "child_worktree": updated_child,
            "parent_worktree": parent,
            "result": "merged_to_parent",
        }))
    }

    pub(crate) fn request_main_merge(
        &mut self,
        input: MergeMainRequestInput,
    ) -> Result<Value, ServiceError> {
        let item = self
            .store_mut()
            .enqueue_main_merge(orch_storage::MainMergeRequestArgs {
                session_id: input.session_id,
                from_worktree_id: input.from_worktree_id,
                target_branch: input.target_branch.clone(),
            })?;

        let mut response = json!({ "main_merge_request": item });

        let mut auto_review = input.merge_request_id.is_some();
        if let Some(flag) = input.auto_review {
            auto_review = flag;
        }
        if auto_review {
            let Some(merge_request_id) = input.merge_request_id.filter(|id| *id > 0) else {
                return Err(ServiceError::validation(
                    "merge_request_id is required when auto_review=true",
                ));
            };
            let dispatch = self.request_auto_merge_review(MergeReviewRequestAutoInput {
                session_id: input.session_id,
                merge_request_id,
                reviewer_role: input.reviewer_role.clone(),
                agent_guide_path: input.agent_guide_path.clone(),
                ensure_tmux: Some(true),
                auto_install: Some(true),
                ..MergeReviewRequestAutoInput::default()
            });
            if let Some(map) = response.as_object_mut() {
                match dispatch {
                    Ok(review) => {
                        map.insert("review_dispatch".to_string(), review);
                    }
                    Err(err) => {
                        map.insert(
                            "review_dispatch_error".to_string(),
                            Value::String(err.to_string()),
                        );
                    }
                }
            }
        }
        Ok(response)
    }

    pub(crate) fn begin_case(&mut self, input: CaseBeginInput) -> Result<Value, ServiceError> {
        let input_contract = match &input.input_contract {
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        let snapshot = json!({
            "input_contract": input.input_contract,
            "fixtures": input.fixtures,
            "event": "case.begin",
        })
        .to_string();

        let task = self.store_mut().begin_case(CaseBeginArgs {
            task_id: input.case_id,
            input_contract,
            fixtures_json: marshal_string_slice(&input.fixtures),
            snapshot_json: snapshot,
        })?;

        if input.session_id > 0 {
            let _ = self.store_mut().upsert_current_ref(CurrentRefUpsertArgs {
                session_id: input.session_id,
                node_type: "case".to_string(),
                node_id: input.case_id,
                mode: "compact".to_string(),
                status: "active".to_string(),
                next_action: "run first pending step".to_string(),
                summary: "case.begin recorded".to_string(),
                required_files_json: marshal_string_slice(&input.required_files),
                ..CurrentRefUpsertArgs::default()
            });
        }
        to_value(task)
    }

    pub(crate) fn check_step(&mut self, input: StepCheckInput) -> Result<Value, ServiceError> {
        if input.result.trim().is_empty() {
            return Err(ServiceError::validation("result is required"));
        }
        let evidence = json!({
            "result": input.result,
            "artifacts": input.artifacts,
        })
        .to_string();
        let snapshot = json!({
            "step_title": input.step_title,
            "result": input.result,
            "artifacts": input.artifacts,
            "event": "step.check",
        })
        .to_string();

        let step = self.store_mut().add_step_check(StepCheckArgs {
            task_id: input.case_id,
            step_title: input.step_title.clone(),
            evidence_json: evidence,
            snapshot_json: snapshot,
        })?;

        if input.session_id > 0 {
            let _ = self.store_mut().upsert_current_ref(CurrentRefUpsertArgs {
                session_id: input.session_id,
                node_type: "case".to_string(),
                node_id: input.case_id,
                mode: "compact".to_string(),
                status: "active".to_string(),
                next_action: "continue next step".to_string(),
                summary: format!("last step checked: {}", input.step_title),
                required_files_json: marshal_string_slice(&input.required_files),
                ..CurrentRefUpsertArgs::default()
            });
        }
        to_value(step)
    }

    pub(crate) fn complete_case(
        &mut self,
        input: CaseCompleteInput,
    ) -> Result<Value, ServiceError> {
        let snapshot = json!({
            "summary": input.summary,
            "next_action": input.next_action,
            "event": "case.complete",
        })
        .to_string();

        let task = self.store_mut().complete_case(CaseCompleteArgs {
            task_id: input.case_id,
            next_action: input.next_action.clone(),
            snapshot_json: snapshot,
        })?;

        if input.session_id > 0 {
            let _ = self.store_mut().upsert_current_ref(CurrentRefUpsertArgs {
                session_id: input.session_id,
                node_type: "case".to_string(),
                node_id: input.case_id,
                mode: "compact".to_string(),
                status: "completed".to_string(),
                next_action: input.next_action,
                summary: input.summary,
                required_files_json: marshal_string_slice(&input.required_files),
                ..CurrentRefUpsertArgs::default()
            });
        }
        to_value(task)
    }

    /// Current-ref ledger: prefer the active row, else derive a fresh ref
    /// from the next resume case.
    pub(crate) fn current_ref(&mut self, input: WorkCurrentRefInput) -> Result<Value, ServiceError> {
        if let Some(current_ref) = self.store().get_current_ref(input.session_id, true)? {
            return Ok(json!({
                "source": "current_refs",
                "current_ref": current_ref,
            }));
        }

        let resume_state = self.store().resume_next_case()?;
        let Some(task) = resume_state.task else {
            return Ok(json!({
                "source": "none",
                "current_ref": null,
            }));
        };

        let checkpoint_id = resume_state.checkpoint.as_ref().map(|c| c.id);
        let created_ref = self.store_mut().upsert_current_ref(CurrentRefUpsertArgs {
            session_id: input.session_id,
            node_type: "case".to_string(),
            node_id: task.id,
            checkpoint_id,
            mode: input.mode,
            status: "active".to_string(),
            next_action: "resume from latest checkpoint".to_string(),
            summary: task.title.clone(),
            required_files_json: marshal_string_slice(&input.required_files),
        })?;

        Ok(json!({
            "source": "resume.next",
            "current_ref": created_ref,
            "task": task,
            "checkpoint": resume_state.checkpoint,
        }))
    }

    pub(crate) fn merge_review_context(
        &mut self,
        merge_request_id: i64,
    ) -> Result<Value, ServiceError> {
        let merge_request = self.store().get_merge_request(merge_request_id)?;
        let feature = self.store().get_task(merge_request.feature_task_id)?;
        let children = self.store().list_tasks(orch_storage::TaskFilter {
            parent_id: Some(feature.id),
            ..orch_storage::TaskFilter::default()
        })?;

        let mut checkpoints = serde_json::Map::new();
        for child in &children {
            if child.level.eq_ignore_ascii_case("case") {
                let latest = self.store().latest_checkpoint(child.id)?;
                checkpoints.insert(child.id.to_string(), serde_json::to_value(latest)?);
            }
        }

        Ok(json!({
            "merge_request": merge_request,
            "feature": feature,
            "children": children,
            "checkpoints": checkpoints,
        }))
    }

    pub(crate) fn worktrees_dir(&self) -> PathBuf {
        self.repo_path().join(STATE_DIR).join("worktrees")
    }

    pub(crate) fn viewer_session_name(&self, worktree_path: &str) -> String {
        let repo_basename = self
            .repo_path()
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let worktree_basename = Path::new(worktree_path.trim())
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        build_viewer_session_name(&repo_basename, &worktree_basename)
    }

    pub(crate) fn current_git_branch(&self) -> Result<String, ServiceError> {
        let output = self.run_git(self.repo_path(), &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch.is_empty() {
            return Err(ServiceError::External(
                "empty branch returned from git".to_string(),
            ));
        }
        Ok(branch)
    }

    pub(crate) fn run_git_worktree_add(
        &self,
        worktree_path: &str,
        branch: &str,
        base_ref: &str,
    ) -> Result<(), ServiceError> {
        if let Some(parent) = Path::new(worktree_path).parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                ServiceError::Internal(format!(
                    "failed to create worktree parent directory: {err}"
                ))
            })?;
        }

        let base = if base_ref.trim().is_empty() {
            "HEAD"
        } else {
            base_ref.trim()
        };
        self.run_git(
            self.repo_path(),
            &["worktree", "add", "-b", branch, worktree_path, base],
        )?;
        Ok(())
    }

    pub(crate) fn run_git_merge(
        &self,
        worktree_path: &str,
        branch: &str,
    ) -> Result<(), ServiceError> {
        self.run_git(
            Path::new(worktree_path),
            &["merge", "--no-ff", "--no-edit", branch],
        )?;
        Ok(())
    }

    pub(crate) fn worktree_candidate_taken(&self, worktree_path: &str, branch: &str) -> bool {
        if !worktree_path.trim().is_empty() && Path::new(worktree_path).exists() {
            return true;
        }
        if branch.trim().is_empty() {
            return false;
        }
        let reference = format!("refs/heads/{branch}");
        Command::new("git")
            .arg("-C")
            .arg(self.repo_path())
            .args(["show-ref", "--verify", "--quiet", &reference])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn run_git(&self, cwd: &Path, args: &[&str]) -> Result<String, ServiceError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(cwd)
            .args(args)
            .output()
            .map_err(|err| ServiceError::External(format!("git {}: {err}", args.join(" "))))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}{}", stdout, stderr);
            return Err(ServiceError::External(format!(
                "git {} failed: {}",
                args.join(" "),
                combined.trim()
            )));
        }
        Ok(stdout.to_string())
    }
}

fn sanitize_for_path(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "worktree".to_string();
    }
    trimmed.replace(['/', ' '], "-")
}

fn is_likely_worktree_conflict(err: &ServiceError) -> bool {
    let normalized = err.to_string().to_lowercase();
    normalized.contains("already exists")
        || normalized.contains("already checked out")
        || normalized.contains("already used by worktree")
}
