#![forbid(unsafe_code)]
//! Slug and multiplexer session-name derivation for worktree allocation.

const SLUG_STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "and", "or", "in", "on", "with", "by", "from", "at",
    "is", "are",
];

const MAX_SESSION_NAME_LEN: usize = 80;

/// Derive a worktree slug from a preferred string, falling back to a second
/// candidate, then to `"work"`.
pub fn derive_worktree_slug(preferred: &str, fallback: &str) -> String {
    let mut candidate = preferred.trim();
    if candidate.is_empty() {
        candidate = fallback.trim();
    }
    if candidate.is_empty() {
        return "work".to_string();
    }
    let normalized = normalize_slug_candidate(candidate);
    if normalized.is_empty() {
        return "work".to_string();
    }
    normalized
}

/// Lowercase, extract maximal `[a-z0-9]+` runs, drop stop-words unless that
/// would empty the result, keep the first two tokens joined by `-`.
pub fn normalize_slug_candidate(value: &str) -> String {
    let tokens = tokenize(value);
    if tokens.is_empty() {
        return String::new();
    }

    let mut filtered: Vec<&str> = Vec::with_capacity(2);
    for token in &tokens {
        if SLUG_STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        filtered.push(token);
        if filtered.len() == 2 {
            break;
        }
    }
    if filtered.is_empty() {
        filtered.push(&tokens[0]);
        if tokens.len() > 1 {
            filtered.push(&tokens[1]);
        }
    }
    filtered.join("-")
}

/// Collision-resolution suffix: attempt 0 is the slug itself, attempt k > 0
/// appends `-{k+1}`.
pub fn slug_with_suffix(base: &str, attempt: usize) -> String {
    let mut normalized = normalize_slug_candidate(base);
    if normalized.is_empty() {
        normalized = "work".to_string();
    }
    if attempt == 0 {
        return normalized;
    }
    format!("{}-{}", normalized, attempt + 1)
}

/// Multiplexer-safe name: lowercase token runs joined by `-`, capped at 80.
pub fn sanitize_session_name(value: &str) -> String {
    let tokens = tokenize(value);
    if tokens.is_empty() {
        return String::new();
    }
    let mut joined = tokens.join("-");
    if joined.len() > MAX_SESSION_NAME_LEN {
        joined.truncate(MAX_SESSION_NAME_LEN);
        joined = joined.trim_matches('-').to_string();
    }
    joined
}

/// Viewer session name derived from repository basename + worktree basename.
pub fn build_viewer_session_name(repo_basename: &str, worktree_basename: &str) -> String {
    let mut repository = sanitize_session_name(repo_basename);
    if repository.is_empty() {
        repository = "repo".to_string();
    }
    let mut worktree = sanitize_session_name(worktree_basename);
    if worktree.is_empty() {
        worktree = "worktree".to_string();
    }
    let mut name = format!("{repository}-{worktree}");
    if name.len() > MAX_SESSION_NAME_LEN {
        name.truncate(MAX_SESSION_NAME_LEN);
        name = name.trim_matches('-').to_string();
    }
    if name.is_empty() {
        return "repo-worktree".to_string();
    }
    name
}

fn tokenize(value: &str) -> Vec<String> {
    let lowered = value.trim().to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_takes_first_two_non_stopword_tokens() {
        assert_eq!(
            derive_worktree_slug("Fix the login flow for admins", ""),
            "fix-login"
        );
        assert_eq!(derive_worktree_slug("", "refactor parser module"), "refactor-parser");
    }

    #[test]
    fn slug_keeps_stopwords_only_when_nothing_else_remains() {
        assert_eq!(derive_worktree_slug("the and", ""), "the-and");
    }

    #[test]
    fn slug_is_idempotent() {
        let once = derive_worktree_slug("Improve the worktree scheduler", "");
        let twice = derive_worktree_slug(&once, "");
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_falls_back_to_work() {
        assert_eq!(derive_worktree_slug("", ""), "work");
        assert_eq!(derive_worktree_slug("!!!", "???"), "work");
    }

    #[test]
    fn suffix_starts_at_second_attempt() {
        assert_eq!(slug_with_suffix("fix-login", 0), "fix-login");
        assert_eq!(slug_with_suffix("fix-login", 1), "fix-login-2");
        assert_eq!(slug_with_suffix("fix-login", 63), "fix-login-64");
    }

    #[test]
    fn viewer_name_is_length_capped() {
        let long = "x".repeat(120);
        let name = build_viewer_session_name(&long, "branch");
        assert!(name.len() <= 80);
        assert_eq!(build_viewer_session_name("", ""), "repo-worktree");
    }
}
