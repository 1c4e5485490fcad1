#![forbid(unsafe_code)]
//! Labelled tool groups exposed to clients via `tools/list`. Every backend
//! method is listed in exactly one group.

use serde_json::{json, Value};

pub struct ToolGroup {
    pub name: &'static str,
    pub description: &'static str,
    pub methods: &'static [&'static str],
}

pub const TOOL_GROUPS: &[ToolGroup] = &[
    ToolGroup {
        name: "orch_session",
        description: "Session and workspace initialization management",
        methods: &[
            "workspace.init",
            "session.open",
            "session.heartbeat",
            "session.close",
            "session.cleanup",
            "session.list",
            "session.context",
        ],
    },
    ToolGroup {
        name: "orch_task",
        description: "Task lifecycle, case execution, and resume management",
        methods: &[
            "task.create",
            "task.list",
            "task.get",
            "case.begin",
            "step.check",
            "case.complete",
            "resume.next",
            "resume.candidates.list",
            "resume.candidates.attach",
        ],
    },
    ToolGroup {
        name: "orch_graph",
        description: "Dependency graph, checklists, and snapshots",
        methods: &[
            "graph.node.create",
            "graph.node.list",
            "graph.edge.create",
            "graph.checklist.upsert",
            "graph.snapshot.create",
        ],
    },
    ToolGroup {
        name: "orch_workspace",
        description: "Worktree scheduling, creation, merging, and lock management",
        methods: &[
            "scheduler.decide_worktree",
            "worktree.create",
            "worktree.list",
            "worktree.spawn",
            "worktree.merge_to_parent",
            "lock.acquire",
            "lock.heartbeat",
            "lock.release",
        ],
    },
    ToolGroup {
        name: "orch_thread",
        description: "Root delegation plus child thread spawning, directives, and lifecycle control",
        methods: &[
            "thread.root.ensure",
            "thread.root.handoff_ack",
            "orchestration.delegate",
            "thread.child.spawn",
            "thread.child.directive",
            "thread.child.list",
            "thread.child.interrupt",
            "thread.child.stop",
            "thread.child.status",
            "thread.child.wait_status",
            "thread.attach_info",
        ],
    },
    ToolGroup {
        name: "orch_lifecycle",
        description: "Current work reference tracking and acknowledgement",
        methods: &["work.current_ref", "work.current_ref.ack"],
    },
    ToolGroup {
        name: "orch_merge",
        description: "Branch merge requests, reviews, and main-line merge operations",
        methods: &[
            "merge.request",
            "merge.review_context",
            "merge.review.request_auto",
            "merge.review.thread_status",
            "merge.main.request",
            "merge.main.next",
            "merge.main.status",
            "merge.main.acquire_lock",
            "merge.main.release_lock",
        ],
    },
    ToolGroup {
        name: "orch_inbox",
        description: "Thread-to-thread messaging: send, receive, and deliver messages",
        methods: &["inbox.send", "inbox.pending", "inbox.list", "inbox.deliver"],
    },
    ToolGroup {
        name: "orch_system",
        description: "Runtime, mirror, and plan management utilities",
        methods: &[
            "runtime.tmux.ensure",
            "runtime.bundle.info",
            "mirror.status",
            "mirror.refresh",
            "plan.bootstrap",
            "plan.slice.generate",
            "plan.slice.replan",
            "plan.rollup.preview",
            "plan.rollup.submit",
            "plan.rollup.approve",
            "plan.rollup.reject",
        ],
    },
];

pub fn find_group(name: &str) -> Option<&'static ToolGroup> {
    TOOL_GROUPS.iter().find(|group| group.name == name)
}

pub fn group_allows_method(group: &ToolGroup, method: &str) -> bool {
    group.methods.contains(&method)
}

pub fn build_tools_list() -> Vec<Value> {
    TOOL_GROUPS
        .iter()
        .map(|group| {
            json!({
                "name": group.name,
                "description": group.description,
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "method": {
                            "type": "string",
                            "description": "Backend method name.",
                            "enum": group.methods,
                        },
                        "params": {
                            "type": "object",
                            "description": "Method params object.",
                            "default": {},
                        },
                    },
                    "required": ["method"],
                    "additionalProperties": false,
                },
            })
        })
        .collect()
}
