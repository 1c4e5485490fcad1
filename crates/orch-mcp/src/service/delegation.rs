#![forbid(unsafe_code)]
//! Caller-to-root handoff and the mutation gate it implies.

use super::runtime::{build_attach_info, default_task_spec_json};
use super::Service;
use crate::error::ServiceError;
use crate::service::inputs::*;
use orch_storage::SessionUpdateArgs;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

impl Service {
    /// Hand orchestration to the session's root thread. All gated mutating
    /// methods are blocked until the root acknowledges the handoff.
    pub(crate) fn delegate_orchestration(
        &mut self,
        input: OrchestrationDelegateInput,
    ) -> Result<Value, ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }

        let session = self.store().get_session(input.session_id)?;

        let mut title = input.title.trim().to_string();
        if title.is_empty() {
            title = input.user_request.trim().to_string();
        }
        if title.is_empty() {
            title = "root orchestration".to_string();
        }

        let mut objective = input.objective.trim().to_string();
        if objective.is_empty() {
            objective = input.user_request.trim().to_string();
        }
        if objective.is_empty() {
            objective = title.clone();
        }

        let mut task_spec = super::normalize_raw_json(&input.task_spec);
        if task_spec.is_empty() {
            let mut extra: Vec<(&str, Value)> = Vec::new();
            if !input.user_request.trim().is_empty() {
                extra.push(("user_request", json!(input.user_request.trim())));
            }
            extra.push(("delegated_from", json!("caller_cli")));
            task_spec = default_task_spec_json("session-root", &title, &objective, &extra);
        }

        let root_ensure = ThreadRootEnsureInput {
            session_id: input.session_id,
            role: "session-root".to_string(),
            title,
            objective,
            ensure_tmux: input.ensure_tmux,
            auto_install: input.auto_install,
            agent_guide_path: input.agent_guide_path.clone(),
            tmux_session_name: input.tmux_session_name.clone(),
            tmux_window_name: input.tmux_window_name.clone(),
            initial_prompt: input.initial_prompt.clone(),
            codex_command: input.codex_command.clone(),
            launch_agent: Some(true),
            force_launch: Some(true),
            max_concurrent_children: input.max_concurrent_children,
            task_spec: serde_json::from_str(&task_spec).unwrap_or(Value::Null),
            scope_task_ids: input.scope_task_ids.clone(),
            scope_case_ids: input.scope_case_ids.clone(),
            scope_node_ids: input.scope_node_ids.clone(),
            ..ThreadRootEnsureInput::default()
        };

        let (updated_session, root_thread, tmux_result) =
            self.ensure_root_thread_internal(root_ensure)?;

        let now = now_rfc3339();
        let updated_session = self.store_mut().update_session(
            updated_session.id,
            SessionUpdateArgs {
                delegation_state: Some("delegated".to_string()),
                delegation_root_thread_id: Some(root_thread.id),
                delegation_issued_at: Some(now),
                delegation_acked_at: Some(String::new()),
                runtime_state: Some("delegated_to_root".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        let attach_info = build_attach_info(&updated_session, Some(&root_thread));
        let child_session_name = updated_session
            .tmux_session_name
            .clone()
            .unwrap_or_else(|| format!("orch-root-{}", root_thread.id));

        Ok(json!({
            "session": updated_session,
            "root_thread": root_thread,
            "tmux": tmux_result,
            "attach_info": attach_info,
            "child_tmux_session": child_session_name,
            "child_attach_hint": format!("tmux attach-session -t {child_session_name}"),
            "caller_action": "return_to_idle",
            "handoff_ack_method": "thread.root.handoff_ack",
            "delegation_contract": "caller_cli_bootstrap_only",
            "session_origin": {
                "session_id": session.id,
                "status": session.status,
            },
        }))
    }

    pub(crate) fn ack_root_handoff(
        &mut self,
        input: ThreadRootHandoffAckInput,
    ) -> Result<Value, ServiceError> {
        if input.session_id <= 0 {
            return Err(ServiceError::validation("session_id is required"));
        }
        if input.thread_id <= 0 {
            return Err(ServiceError::validation("thread_id is required"));
        }

        let session = self.store().get_session(input.session_id)?;
        let thread = self.store().get_thread(input.thread_id)?;
        if thread.session_id != input.session_id {
            return Err(ServiceError::validation(format!(
                "thread belongs to another session: {}",
                thread.session_id
            )));
        }
        if let Some(root_thread_id) = session.root_thread_id {
            if root_thread_id != thread.id {
                return Err(ServiceError::validation(format!(
                    "thread_id={} is not the session root thread",
                    thread.id
                )));
            }
        }

        let mut ack_state = input.state.trim().to_string();
        if ack_state.is_empty() {
            ack_state = "acknowledged".to_string();
        }
        let ack_time = now_rfc3339();

        let updated_session = self.store_mut().update_session(
            input.session_id,
            SessionUpdateArgs {
                delegation_state: Some(ack_state.clone()),
                delegation_root_thread_id: Some(thread.id),
                delegation_acked_at: Some(ack_time.clone()),
                runtime_state: Some("root_active".to_string()),
                ..SessionUpdateArgs::default()
            },
        )?;

        let attach_info = build_attach_info(&updated_session, Some(&thread));
        Ok(json!({
            "session": updated_session,
            "root_thread": thread,
            "attach_info": attach_info,
            "result": "handoff_acknowledged",
            "ack_state": ack_state,
            "acked_at": ack_time,
        }))
    }

    /// The delegation gate: while a session is delegated and unacknowledged,
    /// every gated mutating method fails with an error naming the blocking
    /// root thread and the method.
    pub(crate) fn require_delegation_ack(
        &mut self,
        session_id: i64,
        method: &str,
    ) -> Result<(), ServiceError> {
        if session_id <= 0 {
            return Ok(());
        }
        let session = self.store().get_session(session_id)?;
        let state = session
            .delegation_state
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if state != "delegated" {
            return Ok(());
        }
        if !session
            .delegation_acked_at
            .as_deref()
            .unwrap_or("")
            .trim()
            .is_empty()
        {
            return Ok(());
        }
        Err(ServiceError::Conflict(format!(
            "session {session_id} is delegated to root thread {}; {method} is blocked until thread.root.handoff_ack",
            session.delegation_root_thread_id.unwrap_or(0)
        )))
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
