#![forbid(unsafe_code)]
//! Thin capability layer over the external terminal multiplexer.

use crate::error::ServiceError;
use std::process::{Command, Stdio};
use uuid::Uuid;

pub const SESSION_PREFIX: &str = "orch-";

#[derive(Debug, Default)]
pub struct TmuxClient {}

impl TmuxClient {
    pub fn new() -> Self {
        Self {}
    }

    pub fn has_session(&self, session_name: &str) -> bool {
        self.run(&["has-session", "-t", session_name]).is_ok()
    }

    pub fn new_session(
        &self,
        session_name: &str,
        window_name: &str,
        workdir: &str,
    ) -> Result<(), ServiceError> {
        let mut args = vec!["new-session", "-d", "-s", session_name];
        if !window_name.is_empty() {
            args.push("-n");
            args.push(window_name);
        }
        if !workdir.is_empty() {
            args.push("-c");
            args.push(workdir);
        }
        self.run(&args)?;
        Ok(())
    }

    pub fn kill_session(&self, session_name: &str) -> Result<(), ServiceError> {
        self.run(&["kill-session", "-t", session_name])?;
        Ok(())
    }

    pub fn list_sessions(&self) -> Result<Vec<String>, ServiceError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"])?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(output.trim().lines().map(str::to_string).collect())
    }

    /// Sessions created by this orchestrator, identified by name prefix.
    pub fn list_owned_sessions(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .filter(|name| name.starts_with(SESSION_PREFIX))
            .collect())
    }

    pub fn rename_window(&self, target: &str, name: &str) -> Result<(), ServiceError> {
        self.run(&["rename-window", "-t", target, name])?;
        Ok(())
    }

    pub fn split_window(
        &self,
        target: &str,
        workdir: &str,
        direction: &str,
    ) -> Result<String, ServiceError> {
        let dir_flag = if direction.trim().eq_ignore_ascii_case("horizontal") {
            "-h"
        } else {
            "-v"
        };
        let output = self.run(&[
            "split-window",
            dir_flag,
            "-t",
            target,
            "-c",
            workdir,
            "-P",
            "-F",
            "#{pane_id}",
        ])?;
        let pane_id = output.trim().to_string();
        if pane_id.is_empty() {
            return Err(ServiceError::External(
                "tmux split-window returned empty pane id".to_string(),
            ));
        }
        Ok(pane_id)
    }

    pub fn kill_pane(&self, pane_id: &str) -> Result<(), ServiceError> {
        self.run(&["kill-pane", "-t", pane_id])?;
        Ok(())
    }

    pub fn list_panes(&self, target: &str) -> Result<Vec<String>, ServiceError> {
        let output = self.run(&["list-panes", "-t", target, "-F", "#{pane_id}"])?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(output.trim().lines().map(str::to_string).collect())
    }

    pub fn pane_exists(&self, pane_id: &str) -> bool {
        if pane_id.trim().is_empty() {
            return false;
        }
        self.run(&["display-message", "-p", "-t", pane_id, "#{pane_id}"])
            .is_ok()
    }

    /// Deliver literal text (newlines included) as one atomic paste, then
    /// submit with Enter. The named buffer is deleted on every path.
    pub fn send_keys(&self, target: &str, text: &str) -> Result<(), ServiceError> {
        let buffer_name = format!("orch_{}", &Uuid::new_v4().simple().to_string()[..8]);

        let mut load = Command::new("tmux");
        load.args(["load-buffer", "-b", &buffer_name, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = load
            .spawn()
            .map_err(|err| ServiceError::External(format!("tmux load-buffer failed: {err}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            use std::io::Write;
            stdin.write_all(text.as_bytes()).map_err(|err| {
                ServiceError::External(format!("tmux load-buffer stdin failed: {err}"))
            })?;
        }
        let load_output = child
            .wait_with_output()
            .map_err(|err| ServiceError::External(format!("tmux load-buffer failed: {err}")))?;
        if !load_output.status.success() {
            let detail = String::from_utf8_lossy(&load_output.stderr);
            return Err(ServiceError::External(format!(
                "tmux load-buffer failed: {}",
                detail.trim()
            )));
        }

        if let Err(err) = self.run(&["paste-buffer", "-p", "-b", &buffer_name, "-t", target]) {
            let _ = self.delete_buffer(&buffer_name);
            return Err(err);
        }
        if let Err(err) = self.run(&["send-keys", "-t", target, "Enter"]) {
            let _ = self.delete_buffer(&buffer_name);
            return Err(err);
        }
        let _ = self.delete_buffer(&buffer_name);
        Ok(())
    }

    /// Raw key sequences (e.g. `C-c`, `exit`, `C-m`); control sequences only.
    pub fn send_keys_raw(&self, target: &str, keys: &[&str]) -> Result<(), ServiceError> {
        let mut args = vec!["send-keys", "-t", target];
        args.extend_from_slice(keys);
        self.run(&args)?;
        Ok(())
    }

    pub fn start_pipe_pane(&self, target: &str, log_file_path: &str) -> Result<(), ServiceError> {
        let sink = format!("cat >> {log_file_path}");
        self.run(&["pipe-pane", "-t", target, "-o", &sink])?;
        Ok(())
    }

    pub fn stop_pipe_pane(&self, target: &str) -> Result<(), ServiceError> {
        self.run(&["pipe-pane", "-t", target])?;
        Ok(())
    }

    pub fn capture_history(&self, pane_id: &str, lines: i64) -> Result<String, ServiceError> {
        let start_line = format!("-{lines}");
        self.run(&["capture-pane", "-e", "-p", "-S", &start_line, "-t", pane_id])
    }

    pub fn pane_working_directory(&self, pane_id: &str) -> Result<String, ServiceError> {
        let output = self.run(&[
            "display-message",
            "-p",
            "-t",
            pane_id,
            "#{pane_current_path}",
        ])?;
        Ok(output.trim().to_string())
    }

    fn delete_buffer(&self, buffer_name: &str) -> Result<(), ServiceError> {
        self.run(&["delete-buffer", "-b", buffer_name])?;
        Ok(())
    }

    fn run(&self, args: &[&str]) -> Result<String, ServiceError> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .map_err(|err| ServiceError::External(format!("tmux {}: {err}", args.join(" "))))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}{}", stdout, stderr);
            return Err(ServiceError::External(format!(
                "tmux {} failed: {}",
                args.join(" "),
                combined.trim()
            )));
        }
        Ok(stdout.trim().to_string())
    }
}
