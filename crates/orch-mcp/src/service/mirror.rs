#![forbid(unsafe_code)]
//! Human-readable state mirror, regenerated on demand by the
//! doc-mirror-manager role.

use super::{Service, STATE_DIR};
use crate::error::ServiceError;
use crate::service::inputs::MirrorRefreshInput;
use orch_storage::Lock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const DOC_MIRROR_MANAGER_ROLE: &str = "doc-mirror-manager";
const DEFAULT_MIRROR_RELATIVE_PATH: &str = "mirror/status.md";

impl Service {
    pub(crate) fn runtime_bundle_info(&self) -> Result<Value, ServiceError> {
        let agents_root = self
            .repo_path()
            .join(".codex/agents/codex-collab-orchestrator/codex");
        let role_templates: BTreeMap<&str, PathBuf> = [
            ("session-root", agents_root.join("root-orchestrator.md")),
            ("worker", agents_root.join("main-worker.md")),
            ("merge-reviewer", agents_root.join("merge-reviewer.md")),
            ("doc-mirror-manager", agents_root.join("doc-mirror-manager.md")),
            ("plan-architect", agents_root.join("plan-architect.md")),
        ]
        .into_iter()
        .collect();

        let templates_json: BTreeMap<&str, String> = role_templates
            .iter()
            .map(|(role, path)| (*role, path.to_string_lossy().to_string()))
            .collect();

        Ok(json!({
            "repo_path": self.repo_path().to_string_lossy(),
            "agents_root": agents_root.to_string_lossy(),
            "agents_root_exists": agents_root.exists(),
            "role_templates": templates_json,
        }))
    }

    pub(crate) fn refresh_mirror(
        &mut self,
        input: MirrorRefreshInput,
    ) -> Result<Value, ServiceError> {
        if input.requester_role.trim() != DOC_MIRROR_MANAGER_ROLE {
            return Err(ServiceError::validation(format!(
                "mirror.refresh is restricted to role={DOC_MIRROR_MANAGER_ROLE}"
            )));
        }

        let status = self.store().mirror_status()?;

        let mut target_path = input.target_path.trim().to_string();
        if target_path.is_empty() {
            target_path = if status.md_path.trim().is_empty() {
                self.repo_path()
                    .join(STATE_DIR)
                    .join(DEFAULT_MIRROR_RELATIVE_PATH)
                    .to_string_lossy()
                    .to_string()
            } else {
                status.md_path.clone()
            };
        }

        let task_status_counts = self.store().task_status_counts()?;
        let active_locks = self.store_mut().list_active_locks()?;

        write_mirror_markdown(
            Path::new(&target_path),
            status.db_version,
            &task_status_counts,
            &active_locks,
        )?;

        let updated_status = self.store_mut().mark_mirror_refreshed(&target_path)?;

        Ok(json!({
            "outdated_before_refresh": status.outdated,
            "mirror_status": updated_status,
            "path": target_path,
        }))
    }
}

fn write_mirror_markdown(
    target_path: &Path,
    db_version: i64,
    task_status_counts: &BTreeMap<String, i64>,
    active_locks: &[Lock],
) -> Result<(), ServiceError> {
    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ServiceError::Internal(format!("failed to create mirror directory: {err}"))
        })?;
    }

    let mut body = String::new();
    body.push_str("# Orchestrator State Mirror\n\n");
    let _ = writeln!(body, "- DB version: `{db_version}`");
    let _ = writeln!(body, "- Active locks: `{}`\n", active_locks.len());

    body.push_str("## Task status counts\n\n");
    if task_status_counts.is_empty() {
        body.push_str("- (none)\n");
    } else {
        for (status, count) in task_status_counts {
            let _ = writeln!(body, "- {status}: {count}");
        }
    }

    body.push_str("\n## Active locks\n\n");
    if active_locks.is_empty() {
        body.push_str("- (none)\n");
    } else {
        for lock in active_locks {
            let _ = writeln!(
                body,
                "- #{} `{}:{}` owner={} lease_until={}",
                lock.id, lock.scope_type, lock.scope_path, lock.owner_session, lock.lease_until
            );
        }
    }

    std::fs::write(target_path, body)
        .map_err(|err| ServiceError::Internal(format!("failed to write mirror file: {err}")))
}
