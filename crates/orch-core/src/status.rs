#![forbid(unsafe_code)]
//! Thread status vocabulary shared by the store and the lifecycle controller.

/// Terminal states set `completed_at` and never transition further on their
/// own.
pub fn is_thread_terminal_status(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "completed" | "failed" | "stopped" | "cancelled"
    )
}

/// A child thread in a terminal state may have its pane recycled when the
/// parent is at capacity.
pub fn is_child_thread_recyclable(status: &str) -> bool {
    is_thread_terminal_status(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for status in ["completed", "failed", "stopped", "cancelled", " Stopped "] {
            assert!(is_thread_terminal_status(status), "{status}");
        }
        for status in ["planned", "initializing", "running", "interrupted", ""] {
            assert!(!is_thread_terminal_status(status), "{status}");
        }
    }
}
