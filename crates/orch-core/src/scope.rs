#![forbid(unsafe_code)]
//! Scope reservation rules for the lock manager.
//!
//! A scope is `(type, path)` where the path is slash-normalised, cleaned and
//! stripped of any trailing slash. The empty prefix (or `"."`) denotes the
//! repository root and conflicts with every other scope.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeType {
    File,
    Prefix,
}

impl ScopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Prefix => "prefix",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "prefix" => Some(Self::Prefix),
            _ => None,
        }
    }
}

/// Normalise a scope path: trim, convert backslashes, collapse `.` and
/// redundant separators, strip the trailing slash.
pub fn normalize_scope_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let slashed = trimmed.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in slashed.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let rooted = slashed.starts_with('/');
    let joined = parts.join("/");
    if joined.is_empty() {
        if rooted {
            return "/".to_string();
        }
        return ".".to_string();
    }
    if rooted {
        return format!("/{joined}");
    }
    joined
}

/// Symmetric conflict rule between a candidate scope and an existing one.
pub fn scopes_conflict(
    new_type: ScopeType,
    new_path: &str,
    existing_type: ScopeType,
    existing_path: &str,
) -> bool {
    match (new_type, existing_type) {
        (ScopeType::File, ScopeType::File) => same_path(new_path, existing_path),
        (ScopeType::File, ScopeType::Prefix) => has_path_prefix(new_path, existing_path),
        (ScopeType::Prefix, ScopeType::File) => has_path_prefix(existing_path, new_path),
        (ScopeType::Prefix, ScopeType::Prefix) => {
            has_path_prefix(new_path, existing_path) || has_path_prefix(existing_path, new_path)
        }
    }
}

fn same_path(left: &str, right: &str) -> bool {
    normalize_scope_path(left) == normalize_scope_path(right)
}

fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let path = normalize_scope_path(path);
    let prefix = normalize_scope_path(prefix);
    if prefix == "." || prefix.is_empty() {
        return true;
    }
    if path == prefix {
        return true;
    }
    path.starts_with(&format!("{prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_slash_and_dots() {
        assert_eq!(normalize_scope_path("src/api/"), "src/api");
        assert_eq!(normalize_scope_path("./src//api"), "src/api");
        assert_eq!(normalize_scope_path("  src/api  "), "src/api");
        assert_eq!(normalize_scope_path("."), ".");
        assert_eq!(normalize_scope_path(""), "");
    }

    #[test]
    fn prefix_conflicts_with_contained_file_and_nested_prefix() {
        assert!(scopes_conflict(
            ScopeType::File,
            "src/api/users.go",
            ScopeType::Prefix,
            "src/api",
        ));
        assert!(scopes_conflict(
            ScopeType::Prefix,
            "src/api/v1",
            ScopeType::Prefix,
            "src/api",
        ));
        assert!(!scopes_conflict(
            ScopeType::File,
            "src/api2/users.go",
            ScopeType::Prefix,
            "src/api",
        ));
    }

    #[test]
    fn file_conflicts_only_on_equal_path() {
        assert!(scopes_conflict(
            ScopeType::File,
            "src/main.rs",
            ScopeType::File,
            "./src/main.rs",
        ));
        assert!(!scopes_conflict(
            ScopeType::File,
            "src/main.rs",
            ScopeType::File,
            "src/lib.rs",
        ));
    }

    #[test]
    fn root_prefix_conflicts_with_everything() {
        assert!(scopes_conflict(
            ScopeType::Prefix,
            ".",
            ScopeType::File,
            "deep/nested/file.txt",
        ));
        assert!(scopes_conflict(
            ScopeType::File,
            "deep/nested/file.txt",
            ScopeType::Prefix,
            "",
        ));
    }
}
